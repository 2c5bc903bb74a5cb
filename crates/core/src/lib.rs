//! Core of the SCM/DTS replication engine: plugin adapters, the mapping data
//! model, the configuration store, field conversion, fix-detail rendering,
//! record reconciliation and the replication loop itself.
//!
//! Binaries (`dtg-replicate`, `dtg-svc`) are thin CLI wrappers over this
//! crate; all engine behavior lives here so it can be unit- and
//! scenario-tested without a process boundary.

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod fixrender;
pub mod logger;
pub mod model;
pub mod plugin;
pub mod reconcile;

pub use error::{ReplError, ReplResult};
