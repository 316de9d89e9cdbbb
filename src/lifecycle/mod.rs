//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting, drains → background tasks exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the signal out to every task
//! - In-flight requests are drained, not cut

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
