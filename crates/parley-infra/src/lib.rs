//! Infrastructure layer for Parley.
//!
//! Contains implementations of the port traits defined in `parley-core`:
//! the reqwest chat transport and title generator, JSON-file session
//! storage, and the `config.toml` loader.

pub mod config;
pub mod filesystem;
pub mod http;
