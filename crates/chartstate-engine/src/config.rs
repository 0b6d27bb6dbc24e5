//! Engine configuration, read from RON.
//!
//! ```ron
//! (
//!     max_undo_depth: Some(200),
//!     default_group_timeout_ms: Some(1000),
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Protocols kept behind the timeline cursor. `None` is unbounded.
    pub max_undo_depth: Option<usize>,
    /// Grouping window for grouped transactions that give no timeout.
    pub default_group_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn default_group_timeout(&self) -> Option<Duration> {
        self.default_group_timeout_ms.map(Duration::from_millis)
    }
}
