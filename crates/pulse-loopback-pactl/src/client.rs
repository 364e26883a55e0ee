//! High-level operations on the audio server.

use pulse_loopback_core::{Arguments, Module, SourceOrSink};
use tracing::{debug, info};

use crate::error::{PactlError, PactlResult};
use crate::runner::ProcessRunner;

/// Operations the front-end needs from the audio server.
///
/// Every call is independent and blocks until the server has answered.
pub trait AudioServer {
    /// List all sources.
    ///
    /// # Errors
    /// Returns an error if the server cannot be queried.
    fn list_sources(&self) -> PactlResult<Vec<SourceOrSink>>;

    /// List all sinks.
    ///
    /// # Errors
    /// Returns an error if the server cannot be queried.
    fn list_sinks(&self) -> PactlResult<Vec<SourceOrSink>>;

    /// List all loaded modules.
    ///
    /// # Errors
    /// Returns an error if the server cannot be queried or a module
    /// description is malformed.
    fn list_modules(&self) -> PactlResult<Vec<Module>>;

    /// Load a module and return its index.
    ///
    /// # Errors
    /// Returns an error if the server rejects the module.
    fn load_module(&self, name: &str, arguments: &Arguments) -> PactlResult<u32>;

    /// Unload the module with the given index.
    ///
    /// # Errors
    /// Returns an error if the server rejects the request, e.g. for an
    /// unknown index.
    fn unload_module(&self, index: u32) -> PactlResult<()>;
}

/// [`AudioServer`] backed by the `pactl` command line utility.
#[derive(Debug, Clone, Default)]
pub struct PactlClient {
    runner: ProcessRunner,
}

impl PactlClient {
    /// Create a client that runs commands through `runner`.
    #[must_use]
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    fn list_sources_or_sinks(&self, kind: &str) -> PactlResult<Vec<SourceOrSink>> {
        let stdout = self.runner.output(&["--format", "json", "list", kind])?;
        let entities: Vec<SourceOrSink> = serde_json::from_str(&stdout)?;
        debug!(kind, count = entities.len(), "Listed entities");
        Ok(entities)
    }
}

impl AudioServer for PactlClient {
    fn list_sources(&self) -> PactlResult<Vec<SourceOrSink>> {
        self.list_sources_or_sinks("sources")
    }

    fn list_sinks(&self) -> PactlResult<Vec<SourceOrSink>> {
        self.list_sources_or_sinks("sinks")
    }

    fn list_modules(&self) -> PactlResult<Vec<Module>> {
        let mut output = self.runner.run(&["list", "short", "modules"])?;
        let lines = output.lines().collect::<std::io::Result<Vec<_>>>()?;
        output.finish()?;

        let modules = lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Module::from_short_line(line))
            .collect::<pulse_loopback_core::Result<Vec<_>>>()?;
        debug!(count = modules.len(), "Listed modules");
        Ok(modules)
    }

    fn load_module(&self, name: &str, arguments: &Arguments) -> PactlResult<u32> {
        let serialized = arguments.to_string();
        let mut args = vec!["load-module", name];
        if !serialized.is_empty() {
            args.push(&serialized);
        }

        let mut output = self.runner.run(&args)?;
        let line = output.read_line()?;
        output.finish()?;

        let line = line.unwrap_or_default();
        let index = line.trim().parse().map_err(|_| PactlError::InvalidIndex(line.clone()))?;
        info!(name, index, arguments = %serialized, "Loaded module");
        Ok(index)
    }

    fn unload_module(&self, index: u32) -> PactlResult<()> {
        self.runner.output(&["unload-module", &index.to_string()])?;
        info!(index, "Unloaded module");
        Ok(())
    }
}
