//! Change detection and classification engine
//!
//! This module observes external dependencies, compares each observation with
//! the last persisted state, and classifies what changed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Monitor   │────▶│  Scheduler  │     │ RateLimit   │
//! │  (batch)    │     │  (is due?)  │     │  Handler    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       ▲
//!        ▼                                       │ reserve / observe
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Checker   │────▶│ Comparator  │────▶│  Severity   │
//! │  (fetch)    │     │  (compare)  │     │ (classify)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ Normalizer  │
//! │ (fingerpr.) │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`monitor`]: Bounded concurrent batch over all records
//! - [`scheduler`]: Due/not-due decision per record
//! - [`checker`]: Checker trait, one implementation per access method
//! - [`checkers`]: Concrete checkers (repository, http content, api spec, docs)
//! - [`fallback`]: Ordered fallback chain used by the checkers
//! - [`normalizer`]: Content canonicalization and hashing
//! - [`comparator`]: Generic snapshot comparison
//! - [`severity`]: Severity classification rules
//! - [`rate_limit`]: Shared quota budget
//! - [`result`]: Per-record outcomes and batch summary
//! - [`change`]: Change detection output types
//! - [`error`]: Per-record error type
//! - [`semver`]: Lenient version parsing

pub mod change;
pub mod checker;
pub mod checkers;
pub mod comparator;
pub mod error;
pub mod fallback;
pub mod monitor;
pub mod normalizer;
pub mod rate_limit;
pub mod result;
pub mod scheduler;
pub mod semver;
pub mod severity;

pub use change::{ChangeDetection, ChangeKind, Severity, StructuralDiff};
pub use checker::Checker;
pub use error::CheckError;
pub use monitor::{Monitor, MonitorOptions};
pub use result::{BatchSummary, CheckOutcome, CheckResult, SkipReason, apply_results};
