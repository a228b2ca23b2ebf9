//! Core data types: neutral messages, requests, models and output segments.

pub mod message;
pub mod model;
pub mod request;
pub mod segment;

pub use message::*;
pub use model::*;
pub use request::*;
pub use segment::*;
