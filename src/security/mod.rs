//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (reject oversized bodies)
//!     → headers.rs (keep Content-Type and Authorization only)
//!     → Forward to backend
//! ```
//!
//! # Design Decisions
//! - Minimal trust surface: backends never see arbitrary client headers
//! - Fail closed: reject on any limit violation

pub mod headers;
pub mod limits;
