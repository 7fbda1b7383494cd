//! # Arcana Core
//!
//! Core error and result types shared by the queue and signing crates.

pub mod error;
pub mod result;

pub use error::*;
pub use result::*;
