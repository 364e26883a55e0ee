//! Patchbay view of sources, sinks and the loopback links between them.

use std::fmt::Write as _;

use pulse_loopback_core::{
    Arguments, LOOPBACK_MODULE, LinkMap, SourceOrSink, compute_links, find_link,
};
use pulse_loopback_pactl::{AudioServer, PactlError, PactlResult};
use tracing::{debug, error, info, warn};

/// Outcome of removing every link from one source.
#[derive(Debug, Default)]
pub struct UnlinkReport {
    /// Sinks that were unlinked
    pub unlinked: Vec<u32>,
    /// Sinks that could not be unlinked, with the reason
    pub failed: Vec<(u32, PactlError)>,
}

/// Last known state of the audio server, plus the operations that change it.
///
/// Listing failures during a refresh are logged and shown as empty lists.
/// Failed changes leave the state untouched.
pub struct Patchbay<S> {
    server: S,
    latency_msec: u32,
    sources: Vec<SourceOrSink>,
    sinks: Vec<SourceOrSink>,
    links: LinkMap,
}

impl<S: AudioServer> Patchbay<S> {
    /// Create an empty patchbay. Call [`Patchbay::refresh`] to populate it.
    #[must_use]
    pub fn new(server: S, latency_msec: u32) -> Self {
        Self {
            server,
            latency_msec,
            sources: Vec::new(),
            sinks: Vec::new(),
            links: LinkMap::new(),
        }
    }

    /// Known sources.
    pub fn sources(&self) -> &[SourceOrSink] {
        &self.sources
    }

    /// Known sinks.
    pub fn sinks(&self) -> &[SourceOrSink] {
        &self.sinks
    }

    /// Known links.
    pub fn links(&self) -> &LinkMap {
        &self.links
    }

    /// Re-read sources, sinks and links. Returns whether anything changed.
    ///
    /// # Errors
    /// Returns only fatal errors; everything else degrades to empty lists.
    pub fn refresh(&mut self) -> PactlResult<bool> {
        let sources = dedupe(or_empty(self.server.list_sources(), "sources")?);
        let sinks = dedupe(or_empty(self.server.list_sinks(), "sinks")?);
        let links = self.load_links()?;

        if sources == self.sources && sinks == self.sinks && links == self.links {
            return Ok(false);
        }

        debug!(
            sources = sources.len(),
            sinks = sinks.len(),
            links = links.len(),
            "Patchbay changed"
        );
        self.sources = sources;
        self.sinks = sinks;
        self.links = links;
        Ok(true)
    }

    /// Re-read only the links. Returns whether they changed.
    ///
    /// # Errors
    /// Returns only fatal errors.
    pub fn refresh_links(&mut self) -> PactlResult<bool> {
        let links = self.load_links()?;
        if links == self.links {
            return Ok(false);
        }
        self.links = links;
        Ok(true)
    }

    fn load_links(&self) -> PactlResult<LinkMap> {
        let modules = or_empty(self.server.list_modules(), "links")?;
        Ok(compute_links(&modules))
    }

    /// Create a loopback from `source` to `sink` and return its module index.
    ///
    /// # Errors
    /// Returns an error if the server rejects the module.
    pub fn link(&mut self, source: u32, sink: u32) -> PactlResult<u32> {
        let arguments = Arguments::from_iter([
            ("latency_msec", self.latency_msec.to_string()),
            ("source", source.to_string()),
            ("sink", sink.to_string()),
        ]);

        let index = self.server.load_module(LOOPBACK_MODULE, &arguments).inspect_err(|e| {
            error!(source, sink, error = %e, "Failed to create loopback module");
        })?;
        info!(source, sink, index, "Linked");

        self.refresh_links()?;
        Ok(index)
    }

    /// Remove the loopback from `source` to `sink`.
    ///
    /// Returns `false` if no such link is known.
    ///
    /// # Errors
    /// Returns an error if the server refuses to unload the module.
    pub fn unlink(&mut self, source: u32, sink: u32) -> PactlResult<bool> {
        let Some(module) = find_link(&self.links, source, sink) else {
            return Ok(false);
        };

        self.server.unload_module(module.index).inspect_err(|e| {
            error!(module = %module, error = %e, "Failed to unload module");
        })?;
        info!(source, sink, "Unlinked");

        self.refresh_links()?;
        Ok(true)
    }

    /// Remove every loopback starting at `source`.
    ///
    /// # Errors
    /// Returns only fatal errors; per-link failures are collected in the
    /// report.
    pub fn unlink_source(&mut self, source: u32) -> PactlResult<UnlinkReport> {
        let mut report = UnlinkReport::default();
        let Some(sinks) = self.links.get(&source) else {
            return Ok(report);
        };

        for (&sink, module) in sinks {
            match self.server.unload_module(module.index) {
                Ok(()) => report.unlinked.push(sink),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(module = %module, error = %e, "Failed to unload module");
                    report.failed.push((sink, e));
                }
            }
        }

        if !report.unlinked.is_empty() {
            self.refresh_links()?;
        }
        Ok(report)
    }

    /// Description of a sink, if known.
    #[must_use]
    pub fn sink_description(&self, index: u32) -> Option<&str> {
        describe(&self.sinks, index)
    }

    /// Description of a source, if known.
    #[must_use]
    pub fn source_description(&self, index: u32) -> Option<&str> {
        describe(&self.sources, index)
    }

    /// Render the patchbay as text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("Sources:\n");
        for source in &self.sources {
            let _ = writeln!(out, "  [{}] {}", source.index, source.description);
        }
        out.push_str("Sinks:\n");
        for sink in &self.sinks {
            let _ = writeln!(out, "  [{}] {}", sink.index, sink.description);
        }
        out.push_str("Links:\n");
        for (&source, sinks) in &self.links {
            for (&sink, module) in sinks {
                let source =
                    self.source_description(source).map_or_else(|| format!("#{source}"), str::to_string);
                let sink =
                    self.sink_description(sink).map_or_else(|| format!("#{sink}"), str::to_string);
                let _ = writeln!(out, "  {source} -> {sink} (module {})", module.index);
            }
        }

        out
    }
}

fn or_empty<T: Default>(result: PactlResult<T>, what: &str) -> PactlResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(what, error = %e, "Failed to load, showing nothing");
            Ok(T::default())
        }
    }
}

/// Keep one entry per index: the first position, the last value.
fn dedupe(entities: Vec<SourceOrSink>) -> Vec<SourceOrSink> {
    let mut unique: Vec<SourceOrSink> = Vec::with_capacity(entities.len());
    for entity in entities {
        match unique.iter_mut().find(|e| e.index == entity.index) {
            Some(existing) => *existing = entity,
            None => unique.push(entity),
        }
    }
    unique
}

fn describe(entities: &[SourceOrSink], index: u32) -> Option<&str> {
    entities.iter().find(|e| e.index == index).map(|e| e.description.as_str())
}

#[cfg(test)]
mod tests {
    use std::io;

    use assert_matches::assert_matches;
    use mockall::mock;
    use pulse_loopback_core::Module;

    use super::*;

    mock! {
        Server {}

        impl AudioServer for Server {
            fn list_sources(&self) -> PactlResult<Vec<SourceOrSink>>;
            fn list_sinks(&self) -> PactlResult<Vec<SourceOrSink>>;
            fn list_modules(&self) -> PactlResult<Vec<Module>>;
            fn load_module(&self, name: &str, arguments: &Arguments) -> PactlResult<u32>;
            fn unload_module(&self, index: u32) -> PactlResult<()>;
        }
    }

    fn entity(index: u32, description: &str) -> SourceOrSink {
        SourceOrSink { index, name: String::new(), description: description.to_string() }
    }

    fn loopback(index: u32, source: u32, sink: u32) -> Module {
        Module {
            index,
            name: LOOPBACK_MODULE.to_string(),
            arguments: Arguments::from_iter([
                ("source", source.to_string()),
                ("sink", sink.to_string()),
            ]),
        }
    }

    fn failed(stderr: &str) -> PactlError {
        PactlError::ProcessFailed {
            program: "pactl".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    fn server_with(modules: Vec<Module>) -> MockServer {
        let mut server = MockServer::new();
        server
            .expect_list_sources()
            .returning(|| Ok(vec![entity(0, "Mic"), entity(3, "Headset Mic")]));
        server.expect_list_sinks().returning(|| Ok(vec![entity(1, "Speakers")]));
        server.expect_list_modules().returning(move || Ok(modules.clone()));
        server
    }

    #[test]
    fn test_refresh_reports_changes_once() {
        let mut patchbay = Patchbay::new(server_with(vec![loopback(10, 0, 1)]), 20);

        assert!(patchbay.refresh().unwrap());
        assert!(!patchbay.refresh().unwrap());

        assert_eq!(patchbay.sources().len(), 2);
        assert_eq!(patchbay.sinks().len(), 1);
        assert_eq!(find_link(patchbay.links(), 0, 1).map(|m| m.index), Some(10));
    }

    #[test]
    fn test_refresh_degrades_to_empty_on_listing_failure() {
        let mut server = MockServer::new();
        server.expect_list_sources().returning(|| Err(failed("Connection failure")));
        server.expect_list_sinks().returning(|| Ok(vec![entity(1, "Speakers")]));
        server
            .expect_list_modules()
            .returning(|| Err(PactlError::Io(io::ErrorKind::BrokenPipe.into())));
        let mut patchbay = Patchbay::new(server, 20);

        assert!(patchbay.refresh().unwrap());

        assert!(patchbay.sources().is_empty());
        assert_eq!(patchbay.sinks().len(), 1);
        assert!(patchbay.links().is_empty());
    }

    #[test]
    fn test_refresh_propagates_fatal_errors() {
        let mut server = MockServer::new();
        server.expect_list_sources().returning(|| {
            Err(PactlError::WaitFailed {
                program: "pactl".to_string(),
                source: io::ErrorKind::Interrupted.into(),
            })
        });
        let mut patchbay = Patchbay::new(server, 20);

        assert_matches!(patchbay.refresh(), Err(PactlError::WaitFailed { .. }));
    }

    #[test]
    fn test_refresh_dedupes_by_index() {
        let mut server = MockServer::new();
        server
            .expect_list_sources()
            .returning(|| Ok(vec![entity(0, "Old"), entity(2, "Other"), entity(0, "New")]));
        server.expect_list_sinks().returning(|| Ok(Vec::new()));
        server.expect_list_modules().returning(|| Ok(Vec::new()));
        let mut patchbay = Patchbay::new(server, 20);

        patchbay.refresh().unwrap();

        assert_eq!(patchbay.sources(), [entity(0, "New"), entity(2, "Other")]);
    }

    #[test]
    fn test_link_loads_loopback_and_refreshes() {
        let mut server = MockServer::new();
        server
            .expect_load_module()
            .withf(|name, args| {
                name == LOOPBACK_MODULE
                    && args.get_int("source") == Some(3)
                    && args.get_int("sink") == Some(1)
                    && args.get_int("latency_msec") == Some(35)
            })
            .times(1)
            .returning(|_, _| Ok(42));
        server.expect_list_modules().times(1).returning(|| Ok(vec![loopback(42, 3, 1)]));
        let mut patchbay = Patchbay::new(server, 35);

        assert_eq!(patchbay.link(3, 1).unwrap(), 42);
        assert_eq!(find_link(patchbay.links(), 3, 1).map(|m| m.index), Some(42));
    }

    #[test]
    fn test_failed_link_leaves_state_unchanged() {
        let mut server = server_with(vec![loopback(10, 0, 1)]);
        server
            .expect_load_module()
            .returning(|_, _| Err(failed("Failure: Module initialization failed")));
        let mut patchbay = Patchbay::new(server, 20);
        patchbay.refresh().unwrap();
        let before = patchbay.links().clone();

        assert_matches!(patchbay.link(3, 1), Err(PactlError::ProcessFailed { .. }));
        assert_eq!(patchbay.links(), &before);
    }

    #[test]
    fn test_unlink_single_link() {
        let mut server = MockServer::new();
        let mut calls = 0;
        server.expect_list_modules().returning(move || {
            calls += 1;
            Ok(if calls == 1 { vec![loopback(10, 0, 1)] } else { Vec::new() })
        });
        server.expect_unload_module().withf(|&index| index == 10).times(1).returning(|_| Ok(()));
        let mut patchbay = Patchbay::new(server, 20);
        patchbay.refresh_links().unwrap();

        assert!(!patchbay.unlink(0, 7).unwrap());
        assert!(patchbay.unlink(0, 1).unwrap());
        assert!(patchbay.links().is_empty());
    }

    #[test]
    fn test_unlink_source_collects_failures() {
        let mut server = MockServer::new();
        let mut calls = 0;
        server.expect_list_modules().returning(move || {
            calls += 1;
            Ok(if calls == 1 {
                vec![loopback(10, 0, 1), loopback(11, 0, 2), loopback(12, 3, 1)]
            } else {
                vec![loopback(11, 0, 2), loopback(12, 3, 1)]
            })
        });
        server.expect_unload_module().withf(|&index| index == 10).returning(|_| Ok(()));
        server
            .expect_unload_module()
            .withf(|&index| index == 11)
            .returning(|_| Err(failed("Failure: No such entity")));
        let mut patchbay = Patchbay::new(server, 20);
        patchbay.refresh_links().unwrap();

        let report = patchbay.unlink_source(0).unwrap();

        assert_eq!(report.unlinked, [1]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 2);
        assert!(find_link(patchbay.links(), 0, 1).is_none());
        assert!(find_link(patchbay.links(), 0, 2).is_some());
        assert!(find_link(patchbay.links(), 3, 1).is_some());
    }

    #[test]
    fn test_unlink_source_without_links() {
        let mut patchbay = Patchbay::new(MockServer::new(), 20);

        let report = patchbay.unlink_source(5).unwrap();

        assert!(report.unlinked.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_render() {
        let mut patchbay =
            Patchbay::new(server_with(vec![loopback(10, 3, 1), loopback(11, 9, 1)]), 20);
        patchbay.refresh().unwrap();

        assert_eq!(
            patchbay.render(),
            "Sources:\n  [0] Mic\n  [3] Headset Mic\nSinks:\n  [1] Speakers\nLinks:\n  \
             Headset Mic -> Speakers (module 10)\n  #9 -> Speakers (module 11)\n"
        );
    }
}
