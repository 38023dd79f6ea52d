//! Score use-case services.
//!
//! # Responsibility
//! - Aggregate subject scores into derived totals.
//! - Orchestrate directory, store and notifier calls into the score use-cases.
//!
//! # Invariants
//! - Services hold no state between calls; everything lives in the stores.
//! - Services never bypass repository validation or atomicity contracts.

pub mod aggregator;
pub mod score_service;
