//! Outbound messages to the (out-of-scope) UI front end (§6). Fanned out on
//! a broadcast channel rather than a `DuplexChannel`: this stream is
//! one-directional and has many potential readers, not a request/response
//! pair with a single peer.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct InstructionMessage {
    pub major: String,
    pub minor: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct NotificationMessage {
    pub major: String,
    pub minor: String,
    pub color: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepsInitMessage {
    pub steps: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepStartMessage {
    pub step: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepProgressMessage {
    pub step: String,
    pub value: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepFinishMessage {
    pub step: String,
    pub success: Option<bool>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct MetricsMessage {
    pub pass_hour: u32,
    pub fail_hour: u32,
    pub pass_day: u32,
    pub fail_day: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistoryAddEntryMessage {
    pub id: u64,
    pub pf: bool,
    pub dt: chrono::DateTime<chrono::Local>,
    pub mn: u32,
    pub sn: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct HistorySetAllMessage {
    pub records: Vec<HistoryAddEntryMessage>,
}

/// The full set of messages the engine may emit toward the UI.
#[derive(Clone, Debug, Serialize)]
pub enum ViewMessage {
    Instruction(InstructionMessage),
    Notification(NotificationMessage),
    StepsInit(StepsInitMessage),
    StepStart(StepStartMessage),
    StepProgress(StepProgressMessage),
    StepFinish(StepFinishMessage),
    Metrics(MetricsMessage),
    HistoryAddEntry(HistoryAddEntryMessage),
    HistorySetAll(HistorySetAllMessage),
}

/// A fan-out sender for [`ViewMessage`]s. Cloning subscribes a new reader;
/// messages from one component arrive to every subscriber in emission
/// order, but ordering across components is not guaranteed (§5).
#[derive(Clone)]
pub struct ViewSink {
    tx: tokio::sync::broadcast::Sender<ViewMessage>,
}

impl ViewSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ViewMessage> {
        self.tx.subscribe()
    }

    /// Dropped silently if there are no subscribers left; the engine does
    /// not block on a UI that isn't listening.
    pub fn emit(&self, message: ViewMessage) {
        let _ = self.tx.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_observes_emitted_message() {
        let sink = ViewSink::new(8);
        let mut rx = sink.subscribe();
        sink.emit(ViewMessage::StepStart(StepStartMessage {
            step: "connection-check".to_string(),
        }));
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, ViewMessage::StepStart(_)));
    }
}
