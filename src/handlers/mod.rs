//! HTTP request handlers
//!
//! - `api` - Service banner and health check
//! - `convert` - Text-to-speech conversion

pub mod api;
pub mod convert;
