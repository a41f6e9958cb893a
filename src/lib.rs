//! # capital-call-rs
//!
//! Capital call workflow and allocation engine.
//!
//! A capital call moves DRAFT → SUBMITTED → APPROVED (or REJECTED) under an
//! advisory edit lock, and splits its total across categories by
//! percentage. Edits are protected twice: the lock says who may edit, and
//! a version token catches writes based on a stale read. Storage is
//! Postgres via sqlx, or an in-process map for tests.

pub mod allocation;
pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod validation;
pub mod workflow;

pub use error::{Error, Result};
pub use service::CapitalCallService;
