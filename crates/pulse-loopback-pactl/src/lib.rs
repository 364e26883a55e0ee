//! Pulse Loopback pactl - Talking to the audio server through `pactl`.
//!
//! This crate handles every interaction with the control utility:
//! - Spawning `pactl`, optionally through a shell wrapper
//! - Capturing stderr and turning non-zero exits into errors
//! - Parsing sources, sinks and modules into core entities
//! - Loading and unloading modules

pub mod client;
pub mod error;
pub mod runner;

pub use client::{AudioServer, PactlClient};
pub use error::{PactlError, PactlResult};
pub use runner::{CommandWrapper, DEFAULT_PROGRAM, ProcessOutput, ProcessRunner};
