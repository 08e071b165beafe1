//! Shared pieces of the courier workspace: envelope helpers and logging.

pub mod envelope;
pub mod logging;

pub use envelope::Envelope;
pub use tracing;
