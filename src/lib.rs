//! `mailattach`: attachment lifecycle for an end-to-end encrypted mail client.
//!
//! This crate tracks attachments through upload, fetch, decryption, caching,
//! bulk download and preview selection. Content is encrypted per attachment
//! with a session key; the backend is reached through the
//! [`backend::AttachmentBackend`] trait.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod crypto;
pub mod download;
pub mod error;
pub mod fetch;
pub mod i18n;
pub mod mime;
pub mod model;
pub mod notify;
pub mod parser;
pub mod preview;
pub mod reader;
pub mod session;
pub mod store;
pub mod upload;
