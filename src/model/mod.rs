//! Core data model types for attachments and their content.

pub mod attachment;
pub mod payload;
