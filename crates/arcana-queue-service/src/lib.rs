//! # Arcana Queue Service
//!
//! Boots a Redis-backed reliable job queue: wires configuration, the
//! signing core, and one [`arcana_jobs::WorkerLoop`] per configured
//! worker onto a single named queue.

pub mod handler;
pub mod startup;
