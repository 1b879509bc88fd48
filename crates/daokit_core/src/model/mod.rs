//! Entity types shipped with the crate.
//!
//! # Responsibility
//! - Provide a worked example of implementing `Entity` for a record type.

pub mod car;
