//! Core dispatch logic: credential pool, call executor, retry/fallback
//! orchestrator, and response decoding.

pub mod clock;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod http;
pub mod logging;
pub mod pool;
pub mod prompt;
pub mod record;
