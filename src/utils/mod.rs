//! Small shared utilities.

pub mod cancel;
pub mod mime;

pub use cancel::{CancelHandle, make_cancellable_stream};
