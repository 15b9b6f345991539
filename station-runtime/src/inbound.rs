//! Inbound engine messages (§6 "Engine inbound messages"): what the UI/scan
//! gun side of the station sends in, as opposed to the `ViewMessage`s the
//! engine narrates out.

use serde::{Deserialize, Serialize};

/// A raw scan-gun read, handed to [`crate::scan::classify`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMessage {
    pub raw: String,
}

/// The two station operating modes §6 names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    Testing,
    Rework,
}

impl Default for EngineMode {
    fn default() -> Self {
        EngineMode::Testing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChangeMessage {
    pub mode: EngineMode,
}

/// Request an instrument-level self-check broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TECheckMessage;

/// Request a replay of recent iteration summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryGetAllMessage;

/// The full set of messages the engine accepts from the UI/scan side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineInbound {
    Scan(ScanMessage),
    ModeChange(ModeChangeMessage),
    TeCheck(TECheckMessage),
    HistoryGetAll(HistoryGetAllMessage),
}
