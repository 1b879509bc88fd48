//! Session lifecycle: factory per persistence unit, scoped session per call.
//!
//! # Responsibility
//! - Own the long-lived connection pool (`SessionFactory`).
//! - Bracket units of work in one connection and one transaction
//!   (`SessionManager`).
//!
//! # Invariants
//! - A session is released on every exit path, including panics unwinding
//!   through its owner.
//! - A session never outlives the pooled connection it wraps.

mod error;
mod factory;
mod manager;

pub use error::{SessionError, TransactionError};
pub use factory::{SessionFactory, SessionFactoryBuilder};
pub use manager::SessionManager;
