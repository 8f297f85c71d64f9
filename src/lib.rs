//! Caching HTTP gateway in front of a text-generation backend.
//!
//! A request first consults the [`cache`]; misses go through the
//! [`worker`] pool to the [`backend`], and every served request lands in the
//! [`metrics`] history. [`coordinator::Coordinator`] owns all of it and the
//! [`handlers`] expose it over HTTP.

pub mod backend;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod state;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{BackendError, GatewayError};
