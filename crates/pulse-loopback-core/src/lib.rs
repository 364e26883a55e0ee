//! Pulse Loopback Core - Domain types for loopback routing.
//!
//! This crate contains the pieces that do not need a running audio server:
//! - The module argument codec
//! - Source, sink and module entities
//! - Deriving loopback links from the module list

pub mod arguments;
pub mod entity;
pub mod error;
pub mod link;

pub use arguments::Arguments;
pub use entity::{LOOPBACK_MODULE, Module, SourceOrSink};
pub use error::{Error, Result};
pub use link::{LinkMap, SinkLinks, compute_links, find_link};
