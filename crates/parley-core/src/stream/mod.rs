//! Decoding of the chat backend's streaming wire protocol.

pub mod decoder;
