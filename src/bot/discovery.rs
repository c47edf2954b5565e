use std::collections::HashMap;

use tracing::debug;

use super::context::BOT_SCOPE;
use super::event::ModuleMap;

/// Version recorded for a peer module announced without one
const UNKNOWN_VERSION: &str = "?";

/// Lines announcing a module set: `bot module <name> <version>` for each
/// module followed by `bot end_module`
pub fn announcement(modules: &ModuleMap) -> Vec<Vec<String>> {
    let mut lines: Vec<Vec<String>> = modules
        .iter()
        .map(|(name, version)| {
            vec![
                BOT_SCOPE.to_string(),
                "module".to_string(),
                name.clone(),
                version.clone(),
            ]
        })
        .collect();
    lines.push(vec![BOT_SCOPE.to_string(), "end_module".to_string()]);
    lines
}

/// Request a peer's module set
pub fn lsmod_request() -> Vec<String> {
    vec![BOT_SCOPE.to_string(), "lsmod".to_string()]
}

/// Module sets of peers, assembled from their announcements
#[derive(Debug, Default)]
pub struct PeerDirectory {
    pending: HashMap<String, ModuleMap>,
    known: HashMap<String, ModuleMap>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `bot module` line
    pub fn on_module(&mut self, peer: &str, name: &str, version: Option<&str>) {
        self.pending
            .entry(peer.to_string())
            .or_default()
            .insert(name.to_string(), version.unwrap_or(UNKNOWN_VERSION).to_string());
    }

    /// Complete a sequence with `bot end_module`. Returns the peer's full map,
    /// which becomes its known module set.
    pub fn on_end_module(&mut self, peer: &str) -> ModuleMap {
        let modules = self.pending.remove(peer).unwrap_or_default();
        debug!(target: "agent", "peer {} has modules {:?}", peer, modules);
        self.known.insert(peer.to_string(), modules.clone());
        modules
    }

    /// Forget a peer that left
    pub fn forget(&mut self, peer: &str) {
        self.pending.remove(peer);
        self.known.remove(peer);
    }

    pub fn known(&self, peer: &str) -> Option<&ModuleMap> {
        self.known.get(peer)
    }
}
