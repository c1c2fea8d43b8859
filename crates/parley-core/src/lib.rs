//! Streaming conversation engine and port trait definitions for Parley.
//!
//! This crate defines the "ports" (transport, title, and storage traits)
//! that the infrastructure layer implements. It depends only on
//! `parley-types` -- never on `parley-infra` or any HTTP/filesystem crate.

pub mod chat;
pub mod session;
pub mod stream;
pub mod transport;
