//! HTTP surface of the sluice coordinator.
//!
//! - [`http_api`]: axum router exposing the worker protocol, status,
//!   review dispositions and task ingest
//! - [`auth`]: API key middleware
//! - [`api_error`]: mapping of coordinator errors onto status codes

pub mod api_error;
pub mod auth;
pub mod http_api;
