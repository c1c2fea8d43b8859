//! Multi-session conversation persistence.
//!
//! - `SessionStorage`: key/value port the store writes through to
//! - `SessionStore`: bounded collection of sessions with an active pointer

pub mod storage;
pub mod store;
