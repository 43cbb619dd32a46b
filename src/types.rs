use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical name types used throughout the crate.
pub type TaskName = String;
pub type TransformName = String;

/// Kind of reload notification pushed to connected clients.
///
/// - `FullReload`: the page must be reloaded entirely.
/// - `CssInject`: stylesheets can be swapped in place without a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadKind {
    FullReload,
    CssInject,
}

impl Default for ReloadKind {
    fn default() -> Self {
        ReloadKind::FullReload
    }
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadKind::FullReload => write!(f, "full-reload"),
            ReloadKind::CssInject => write!(f, "css-inject"),
        }
    }
}

impl FromStr for ReloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full-reload" => Ok(ReloadKind::FullReload),
            "css-inject" => Ok(ReloadKind::CssInject),
            other => Err(format!(
                "invalid reload kind: {other} (expected \"full-reload\" or \"css-inject\")"
            )),
        }
    }
}

/// Why a build run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// The initial run at process start (before any watching).
    Initial,
    /// A filesystem change matched a transform's input globs.
    FileWatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_kind_round_trips_through_str() {
        assert_eq!("css-inject".parse::<ReloadKind>(), Ok(ReloadKind::CssInject));
        assert_eq!(
            "full-reload".parse::<ReloadKind>(),
            Ok(ReloadKind::FullReload)
        );
        assert_eq!(ReloadKind::CssInject.to_string(), "css-inject");
    }

    #[test]
    fn reload_kind_rejects_unknown() {
        assert!("inject".parse::<ReloadKind>().is_err());
    }
}
