//! Synthesis messages
//!
//! Typed requests into the synth worker and the events it reports back, instead of
//! generic serde_json::Value, so channel traffic is checked at compile time.

use crate::synthesis::Synthesis;
use std::{path::PathBuf, sync::Arc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthTrigger {
    Open,
    Save,
    Command,
}

impl SynthTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthTrigger::Open => "open",
            SynthTrigger::Save => "save",
            SynthTrigger::Command => "command",
        }
    }
}

#[derive(Debug)]
pub enum SynthRequest {
    /// `document` locates the project; without one the worker's current directory is
    /// searched. `generation` is allocated when the request is queued.
    Synthesize {
        trigger: SynthTrigger,
        document: Option<PathBuf>,
        generation: u64,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum SynthEvent {
    Started {
        operation_id: Uuid,
        generation: u64,
        project_root: PathBuf,
    },
    Installed {
        operation_id: Uuid,
        synthesis: Arc<Synthesis>,
        duration_ms: u64,
    },
    Superseded {
        operation_id: Uuid,
        generation: u64,
    },
    Failed {
        operation_id: Uuid,
        generation: u64,
        error: String,
    },
}

impl SynthEvent {
    pub fn operation_id(&self) -> Uuid {
        match self {
            SynthEvent::Started { operation_id, .. }
            | SynthEvent::Installed { operation_id, .. }
            | SynthEvent::Superseded { operation_id, .. }
            | SynthEvent::Failed { operation_id, .. } => *operation_id,
        }
    }
}
