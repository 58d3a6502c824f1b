//! `wardctl`: inspect live ward reconciliation from the command line.
//!
//! Directory documents are read from JSON fixture files in the backend's own
//! shape, so a dump of `/api/devices` and `/api/patients` can be replayed
//! offline.
//!
//! ```bash
//! wardctl --devices devices.json resolve P-1042
//! wardctl --devices devices.json --live latest.json vitals P-1042 --history
//! wardctl --devices devices.json alerts --critical
//! wardctl --devices devices.json environment R101
//! wardctl prediction show
//! wardctl prediction evict P-1042
//! ```

pub mod cli;
pub mod commands;
pub mod fixtures;

pub use cli::*;
pub use commands::*;
pub use fixtures::*;
