//! abex - AI-assisted literature abstract extraction
//!
//! A resilient dispatcher for chat-completion APIs: it owns a pool of API
//! credentials, rotates across them, temporarily disables misbehaving ones,
//! retries with backoff, falls back across (endpoint, model) configurations,
//! and decodes loosely formatted JSON responses into total, sentinel-filled
//! records.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;

pub use error::{AbexError, Result};
