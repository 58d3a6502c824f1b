//! Common error handling utilities for the WardWatch engine
//!
//! Every collaborator the reconciliation engine talks to (patient directory,
//! device directory, live reading poll, remote risk prediction) reports failure
//! through [`MonitorError`]. Keeping a single taxonomy lets the poll cache, the
//! alert monitor and the CLI surface transport problems the same way: as a
//! value scoped to the affected call or device, never as a crash.
//!
//! # Error Categories
//!
//! - **Network / Timeout / Status**: transport failures talking to the backend
//! - **Decode**: a response arrived but its body could not be read
//! - **Storage**: local persistence (prediction cache) could not be read or written
//! - **Config**: invalid engine or backend configuration
//! - **Unavailable**: the collaborator has nothing to offer for this request
//!
//! # Example
//!
//! ```rust
//! use error_common::{MonitorError, ErrorReport};
//!
//! let err = MonitorError::Status { status: 503, url: "/devices".to_string() };
//! assert!(err.is_transient());
//!
//! let report = ErrorReport::from(&err);
//! assert_eq!(report.code, "NET_5003");
//! ```

pub mod codes;
pub mod types;

pub use types::*;
