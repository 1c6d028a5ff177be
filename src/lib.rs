//! Marketplace backend
//!
//! A multi-vendor shop: suppliers publish price lists, customers fill a
//! basket with offers from several shops and confirm it as one order, and
//! every supplier involved is notified by email.
//!
//! ## Layout
//! - [`domain`]: aggregates and the order state machine
//! - [`services`]: use cases over PostgreSQL, one trait per area
//! - [`http`]: the JSON API
//! - [`tasks`]: background work through NATS JetStream or in-process
//! - [`mail`]: outgoing email

pub mod auth;
pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod http;
pub mod mail;
pub(crate) mod repositories;
pub mod services;
pub mod tasks;
