//! # wis2bridge
//!
//! `wis2bridge` relays WIS2 notifications published on a public federated
//! MQTT broker into a private cloud broker. Topics are rewritten on the way
//! and every payload gets a `_meta` provenance envelope; payload content is
//! otherwise passed through untouched.
//!
//! ## Core Modules
//!
//! - `relay`: topic rewriting, the metadata envelope and the per-message dispatcher.
//! - `connection`: the subscribing source session and the publishing destination session.
//! - `credentials`: mutual-TLS material for the destination, fetched at startup.
//! - `bridge`: the lifecycle controller and the shutdown channel.
//! - `config`: loading settings from file and environment.
//! - `utils`: shared error types and logging setup.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod relay;
pub mod utils;
