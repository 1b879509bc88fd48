//! Repository layer: generic data-access operations over mapped entities.
//!
//! # Responsibility
//! - Give every entity type the same nine data-access operations.
//! - Open one session per call and wrap every failure in `PersistenceError`.
//!
//! # Invariants
//! - Writes run in one transaction each; reads run without one.
//! - A call never leaves its session open, whatever the outcome.

pub mod car_repo;
pub mod error;
pub mod generic_repo;
