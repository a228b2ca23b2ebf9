//! Error Handling Module
//!
//! This module provides error handling for the protocol layer, including:
//! - Core error types (`LlmError`, `ErrorCategory`)
//! - HTTP failure classification shared by every provider adapter
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use chatwire::error::{LlmError, ErrorCategory};
//!
//! let error = LlmError::upstream("openai", 404, "Not found");
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert!(!error.is_retryable());
//! ```

mod conversions;
pub mod helpers;
pub mod types;

pub use helpers::*;
pub use types::*;
