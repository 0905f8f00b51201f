//! Stream utilities: lifecycle enforcement, backpressure, collection.

pub mod backpressure;
mod collect;
mod lifecycle;

pub use backpressure::{DEFAULT_STREAM_BUFFER, bounded_stream};
pub use collect::{CollectedStream, collect_stream};
pub use lifecycle::{LifecycleGuard, enforce_lifecycle};
