//! Relay routing configuration
//!
//! Declares which streams are pushed out to upstream origins. Two shapes:
//!
//! - A [`PushRoute`] maps a source URL prefix to one or more master push
//!   targets: every stream whose URL matches the prefix is republished to
//!   each target.
//! - A [`SubstreamGroup`] aggregates several source streams under one
//!   master relay connection; each sub-stream is tagged with its position
//!   in the group when forwarded.

/// Master push destinations for matching source streams
#[derive(Debug, Clone)]
pub struct PushRoute {
    /// Source URL prefix this route applies to (e.g. "rtmp://local/live")
    pub source_prefix: String,
    /// Upstream target URLs to republish to
    pub targets: Vec<String>,
}

impl PushRoute {
    /// Create a route from a source prefix to target URLs
    pub fn new(source_prefix: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            targets,
        }
    }
}

/// Ordered membership of source streams under one master relay
#[derive(Debug, Clone)]
pub struct SubstreamGroup {
    /// Target URL of the master relay that aggregates the group
    pub master_url: String,
    /// Source URLs of the member streams; position is the sub-stream index
    pub subs: Vec<String>,
}

impl SubstreamGroup {
    /// Create a group of sub-streams under a master target
    pub fn new(master_url: impl Into<String>, subs: Vec<String>) -> Self {
        Self {
            master_url: master_url.into(),
            subs,
        }
    }
}

/// Relay routing configuration
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Master push routes
    pub routes: Vec<PushRoute>,
    /// Sub-stream groups
    pub groups: Vec<SubstreamGroup>,
}

impl RelayConfig {
    /// Create an empty configuration (no relaying)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a master push route
    pub fn route(mut self, route: PushRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Add a sub-stream group
    pub fn group(mut self, group: SubstreamGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Target URLs every matching route pushes `source_url` to
    pub fn push_targets(&self, source_url: &str) -> Vec<String> {
        self.routes
            .iter()
            .filter(|route| source_url.starts_with(&route.source_prefix))
            .flat_map(|route| route.targets.iter().cloned())
            .collect()
    }

    /// Find the group listing `source_url` as a sub-stream
    ///
    /// Returns the sub-stream index and the master target URL.
    pub fn substream_slot(&self, source_url: &str) -> Option<(usize, &str)> {
        for group in &self.groups {
            if let Some(index) = group.subs.iter().position(|sub| sub == source_url) {
                return Some((index, group.master_url.as_str()));
            }
        }
        None
    }
}
