//! Message parsing: attachment import from raw RFC 5322 messages.

pub mod eml;
