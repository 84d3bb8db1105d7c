//! Courier: unified SMS, MMS and email conversations.
//!
//! Sends messages through pluggable providers with bounded retries, records
//! inbound provider webhooks exactly once, and groups everything exchanged
//! between two parties into a single conversation.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod types;

pub mod messaging;
pub mod providers;
pub mod store;
