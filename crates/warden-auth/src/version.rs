//! Build metadata
//!
//! Constructed once at startup and passed by value to whatever reports it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::API_VERSION;

/// Revision reported when none was stamped at build time
pub const UNKNOWN_REVISION: &str = "unknown";

/// Application version, source revision and API version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Release version of the application
    pub app_version: String,
    /// Source revision the binary was built from
    pub git_revision: String,
    /// Route version segment (`v1`)
    pub api_version: String,
}

impl BuildInfo {
    /// Build metadata for the given application version and revision
    pub fn new(app_version: impl Into<String>, git_revision: Option<&str>) -> Self {
        Self {
            app_version: app_version.into(),
            git_revision: git_revision
                .filter(|rev| !rev.is_empty())
                .unwrap_or(UNKNOWN_REVISION)
                .to_string(),
            api_version: API_VERSION.to_string(),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "App Version: {}\nGit Revision: {}\nAPI Version: {}",
            self.app_version, self.git_revision, self.api_version
        )
    }
}
