//! Pulse Loopback CLI - Command line patchbay.
//!
//! This crate provides the front-end pieces used by the `pulse-loopback`
//! binary: configuration, the patchbay view and shutdown handling.

pub mod config;
pub mod patchbay;
pub mod signals;

pub use config::Config;
pub use patchbay::{Patchbay, UnlinkReport};
