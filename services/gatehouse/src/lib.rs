//! Gatehouse service library crate.
//!
//! # Purpose
//! Exposes the HTTP API, identity resolution, bootstrap routine, configuration,
//! and storage backends for use by the binary and tests.
//!
//! # Notes
//! Access decisions live in `gatehouse-authz`; this crate only gathers the facts
//! (principal, target record, ownership) and acts on the decision.
pub mod api;
pub mod app;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
