//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved target URL:
//!     → target_policy.rs (scheme, host and address checks)
//!     → Pass to relay, or 403
//! ```
//!
//! # Design Decisions
//! - Disabled by default; the relay itself never filters targets
//! - No DNS lookups: only literal IP hosts are classified as private

pub mod target_policy;

pub use target_policy::{Denial, TargetPolicy};
