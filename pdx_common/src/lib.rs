//! PDX Common Library
//!
//! Shared constants, configuration loading and the fieldbus master interface
//! used by every crate of the PDX process-data exchange workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Numeric limits and defaults
//! - [`config`] - Configuration loading traits and engine configuration
//! - [`master`] - Fieldbus master collaborator traits and state snapshots
//! - [`time`] - Absolute timestamps and the cycle timer trait
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pdx_common::prelude::*;
//!
//! let ts = Timestamp::new(1, 999_999_999).add_nanos(1);
//! assert_eq!(ts, Timestamp::new(2, 0));
//! ```

pub mod config;
pub mod consts;
pub mod master;
pub mod prelude;
pub mod time;
