//! States of a batch migration run.
//!
//! ```text
//! INIT -> EXTRACT -> TRANSFORM -> LOAD -> CHECKPOINT --+
//!            ^                                         |
//!            +-----------------------------------------+
//!         EXTRACT -> BUILD_INDEX -> DONE
//! ```
//!
//! FAILED is reachable from every non-terminal phase.

use serde::Serialize;
use std::fmt;

use crate::core::{Document, Page};

/// Phase of the migration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    Extract,
    Transform,
    Load,
    Checkpoint,
    BuildIndex,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Whether `next` may directly follow this phase.
    pub fn can_advance_to(&self, next: Phase) -> bool {
        use Phase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Init, Extract)
                | (Init, BuildIndex)
                | (Extract, Transform)
                | (Extract, BuildIndex)
                | (Transform, Load)
                | (Transform, Checkpoint)
                | (Load, Checkpoint)
                | (Checkpoint, Extract)
                | (BuildIndex, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Extract => "EXTRACT",
            Phase::Transform => "TRANSFORM",
            Phase::Load => "LOAD",
            Phase::Checkpoint => "CHECKPOINT",
            Phase::BuildIndex => "BUILD_INDEX",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one batch as it moves from TRANSFORM to CHECKPOINT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Cursor to store once the batch is committed.
    pub next_cursor: Option<String>,
}

/// A phase together with the data it operates on.
#[derive(Debug)]
pub enum Step {
    Init,
    Extract,
    Transform(Page),
    Load {
        documents: Vec<Document>,
        tally: BatchTally,
    },
    Checkpoint(BatchTally),
    BuildIndex,
    Done,
}

impl Step {
    pub fn phase(&self) -> Phase {
        match self {
            Step::Init => Phase::Init,
            Step::Extract => Phase::Extract,
            Step::Transform(_) => Phase::Transform,
            Step::Load { .. } => Phase::Load,
            Step::Checkpoint(_) => Phase::Checkpoint,
            Step::BuildIndex => Phase::BuildIndex,
            Step::Done => Phase::Done,
        }
    }
}
