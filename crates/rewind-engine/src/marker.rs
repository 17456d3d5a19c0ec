//! The "Block"/"Unblock" authoring marker.
//!
//! Narrative documents embed this marker to pin a checkpoint the player may
//! not roll back past (`block`) and to lift it again (`unblock`). Executing
//! the marker never suspends: it reports completion immediately so the
//! runtime moves on to the next event in the same tick.
//!
//! ```
//! use rewind_engine::marker::HistoryMarker;
//!
//! let marker: HistoryMarker = "block".parse().unwrap();
//! assert_eq!(marker, HistoryMarker::Block);
//! assert!("rewind".parse::<HistoryMarker>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collab::NarrativeRuntime;
use crate::controller::RollbackController;

/// Marker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMarker {
    Block,
    Unblock,
}

/// Completion reported to the runtime after executing a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerCompletion {
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown history marker '{0}' (expected 'block' or 'unblock')")]
pub struct UnknownMarker(pub String);

impl HistoryMarker {
    pub fn execute<R: NarrativeRuntime>(
        self,
        controller: &mut RollbackController<R>,
    ) -> MarkerCompletion {
        match self {
            HistoryMarker::Block => controller.block(),
            HistoryMarker::Unblock => controller.unblock(),
        }
        MarkerCompletion::Finished
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HistoryMarker::Block => "block",
            HistoryMarker::Unblock => "unblock",
        }
    }
}

impl FromStr for HistoryMarker {
    type Err = UnknownMarker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(HistoryMarker::Block),
            "unblock" => Ok(HistoryMarker::Unblock),
            _ => Err(UnknownMarker(s.to_owned())),
        }
    }
}

impl fmt::Display for HistoryMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
