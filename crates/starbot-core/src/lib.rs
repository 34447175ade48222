//! Core domain + application logic for the stars order bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind
//! the `MessagingPort` trait implemented in the adapter crate.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod scheduler;
pub mod store;

pub use errors::{Error, Result};
