//! Audio server entities reported by `pactl`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::arguments::{self, Arguments};
use crate::error::{Error, Result};

/// Name of the module that implements a loopback link.
pub const LOOPBACK_MODULE: &str = "module-loopback";

/// A source or a sink.
///
/// Indices are unique within their kind only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOrSink {
    /// Index assigned by the audio server
    pub index: u32,
    /// Internal name
    #[serde(default)]
    pub name: String,
    /// Human-readable label
    pub description: String,
}

/// A loaded audio server module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Index assigned by the audio server
    pub index: u32,
    /// Module name, e.g. `module-loopback`
    pub name: String,
    /// Parsed module arguments
    pub arguments: Arguments,
}

impl Module {
    /// Parse one line of `pactl list short modules`.
    ///
    /// The line holds up to four tab-separated fields: index, name,
    /// argument text and a trailing field that is ignored.
    ///
    /// # Errors
    /// Returns an error if the line has too few fields, the index is not an
    /// integer, or the argument text is malformed.
    pub fn from_short_line(line: &str) -> Result<Self> {
        let mut fields = line.splitn(4, '\t');
        let (Some(index), Some(name), Some(args)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::MalformedModuleLine(line.to_string()));
        };

        let index = index.trim().parse().map_err(|_| Error::MalformedModuleLine(line.to_string()))?;

        Ok(Self { index, name: name.to_string(), arguments: arguments::parse(args)? })
    }

    /// Whether this module is a loopback link.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        self.name == LOOPBACK_MODULE
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.index, self.name, self.arguments)
    }
}
