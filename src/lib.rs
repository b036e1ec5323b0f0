// Re-export modules for the binary and the integration tests
pub mod config;
pub mod messaging;  // Thread store, directory, attachments, replies, unread poller
pub mod models;
pub mod transport;  // Backend seam and its HTTP binding

// Re-export main types for convenience
pub use messaging::{ChatError, Signal, Signals, ValidationError};
pub use models::*;
pub use transport::{HttpTransport, Transport};
