//! # Arcana Resilience
//!
//! The circuit breaker that guards every outbound Redis operation made by
//! the job queue.

pub mod circuit_breaker;

pub use circuit_breaker::*;
