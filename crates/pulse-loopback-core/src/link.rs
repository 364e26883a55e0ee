//! Loopback links between sources and sinks.
//!
//! Links are not stored anywhere. They are derived from the module list on
//! every query, so unloading a loopback module removes its link.

use std::collections::BTreeMap;

use tracing::debug;

use crate::entity::Module;

/// Loopback modules keyed by sink index.
pub type SinkLinks = BTreeMap<u32, Module>;

/// Loopback modules keyed by source index, then sink index.
pub type LinkMap = BTreeMap<u32, SinkLinks>;

/// Endpoint value used when a loopback argument is missing or unparseable.
const NO_ENDPOINT: i32 = -1;

/// Derive the link map from a module list.
///
/// Only `module-loopback` modules contribute. A module whose `source` or
/// `sink` argument is missing or not a valid index is dropped. If two
/// modules claim the same pair, the later one wins.
#[must_use]
pub fn compute_links(modules: &[Module]) -> LinkMap {
    let mut links = LinkMap::new();

    for module in modules.iter().filter(|m| m.is_loopback()) {
        let source = module.arguments.get_int_or("source", NO_ENDPOINT);
        let sink = module.arguments.get_int_or("sink", NO_ENDPOINT);

        let Ok(source) = u32::try_from(source) else {
            debug!(index = module.index, "Loopback module has no usable source");
            continue;
        };
        let sinks = links.entry(source).or_default();

        let Ok(sink) = u32::try_from(sink) else {
            debug!(index = module.index, source, "Loopback module has no usable sink");
            continue;
        };
        sinks.insert(sink, module.clone());
    }

    links
}

/// Look up the module linking `source` to `sink`.
#[must_use]
pub fn find_link(links: &LinkMap, source: u32, sink: u32) -> Option<&Module> {
    links.get(&source).and_then(|sinks| sinks.get(&sink))
}
