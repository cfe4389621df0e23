//! Signal Filter
//!
//! Parses the configured list of signal paths and decides which updates
//! are forwarded.
//!
//! # Empty filters
//!
//! An empty filter means "subscribe to nothing", never "subscribe to
//! everything". Parsing an empty or absent filter yields a
//! [`ConfigWarning`] which the engine logs once at startup.

use std::collections::BTreeSet;
use std::fmt;

/// Decides whether a signal path is of interest.
///
/// [`FilterSpec`] implements exact matching. Wildcard or hierarchical
/// matchers can implement this trait without changing the consumers.
pub trait SignalMatcher: Send + Sync + fmt::Debug {
    /// Check whether updates for `path` should be forwarded.
    fn matches(&self, path: &str) -> bool;
}

/// Non-fatal configuration findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigWarning {
    /// The signal filter is empty, so nothing will be subscribed.
    #[error("SIGNAL_FILTER has not been set, no signals will be forwarded")]
    EmptySignalFilter,
}

/// Immutable set of signal paths to subscribe to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    paths: BTreeSet<String>,
}

impl FilterSpec {
    /// Parse a comma separated list of signal paths.
    ///
    /// Whitespace around entries is ignored, empty entries are dropped and
    /// duplicates collapse. An empty result carries
    /// [`ConfigWarning::EmptySignalFilter`].
    #[must_use]
    pub fn parse(raw: Option<&str>) -> (Self, Option<ConfigWarning>) {
        let paths: BTreeSet<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(ToString::to_string)
            .collect();

        let warning = paths.is_empty().then_some(ConfigWarning::EmptySignalFilter);
        (Self { paths }, warning)
    }

    /// Build a filter from an explicit list of paths.
    #[must_use]
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether the filter selects no signals at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of distinct paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Paths as owned strings, e.g. for a subscribe request.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }
}

impl SignalMatcher for FilterSpec {
    fn matches(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.paths().collect::<Vec<_>>().join(",");
        f.write_str(&joined)
    }
}
