//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Breakers publish events:
//!     → events.rs (subscriber task: log + metric per event)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Request ID flows through request spans
//! - Metrics are cheap and no-ops unless the exporter is enabled

pub mod events;
pub mod logging;
pub mod metrics;
