//! The message data model: [`Notification`], [`ResponseRequired`], and
//! [`LayeredAction`], per spec §3.
//!
//! Every message carries a process-unique id, a send timestamp, an optional
//! completion timestamp, an optional timeout, and an ordered set of fields
//! for display. `ResponseRequired` additionally carries a three-valued
//! success flag and transitions (`success`/`failure`/`exception`) that set
//! the completion time at most once.

use chrono::{DateTime, Local};
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use std::fmt;
use std::time::Duration;

/// Tag type for [`MessageId`].
pub enum MessageKind {}

impl TypedUuidKind for MessageKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("message");
        TAG
    }
}

/// A process-unique message identity. Ids are never reused for the
/// lifetime of the process.
pub type MessageId = TypedUuid<MessageKind>;

/// One field of a message, in declaration order, for display/logging.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: &'static str,
    pub value: String,
}

/// Three-valued outcome of a [`ResponseRequired`] message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Success {
    Unset,
    Success,
    Failure,
}

/// Fields shared by every message in the system.
#[derive(Clone, Debug)]
pub struct MessageHeader {
    pub id: MessageId,
    pub sent_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub timeout: Option<Duration>,
    fields: Vec<Field>,
}

impl MessageHeader {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            id: MessageId::new_v4(),
            sent_at: Local::now(),
            completed_at: None,
            timeout,
            fields: Vec::new(),
        }
    }

    pub fn push_field(&mut self, name: &'static str, value: impl fmt::Display) {
        self.fields.push(Field {
            name,
            value: value.to_string(),
        });
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// `T_ELAPSED` = completion - start. `None` until completion is marked.
    pub fn elapsed(&self) -> Option<Duration> {
        let done = self.completed_at?;
        (done - self.sent_at).to_std().ok()
    }

    pub fn is_timed_out(&self, now: DateTime<Local>) -> bool {
        match self.timeout {
            Some(timeout) => {
                let elapsed = (now - self.sent_at).to_std().unwrap_or(Duration::ZERO);
                elapsed > timeout
            }
            None => false,
        }
    }

    fn mark_complete(&mut self) {
        // Invariant: completion timestamp is set at most once.
        if self.completed_at.is_none() {
            self.completed_at = Some(Local::now());
        }
    }
}

/// A one-way message: no response is ever expected.
#[derive(Clone, Debug)]
pub struct Notification {
    pub header: MessageHeader,
    pub name: &'static str,
}

impl Notification {
    pub fn new(name: &'static str) -> Self {
        Self {
            header: MessageHeader::new(None),
            name,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self.name, self.header.fields())
    }
}

/// A message that correlates a request with exactly one response.
#[derive(Clone, Debug)]
pub struct ResponseRequired {
    pub header: MessageHeader,
    pub name: &'static str,
    pub success: Success,
    pub error: Option<String>,
}

impl ResponseRequired {
    pub fn new(name: &'static str, timeout: Option<Duration>) -> Self {
        Self {
            header: MessageHeader::new(timeout),
            name,
            success: Success::Unset,
            error: None,
        }
    }

    pub fn success(&mut self) {
        self.success = Success::Success;
        self.header.mark_complete();
    }

    pub fn failure(&mut self) {
        self.success = Success::Failure;
        self.header.mark_complete();
    }

    pub fn exception(&mut self, e: impl fmt::Display) {
        self.error = Some(e.to_string());
        self.failure();
    }

    /// Apply `process_response_values` semantics (§10.2): a hook that can
    /// downgrade an apparently-successful response to a failure before the
    /// flag is latched.
    pub fn check(&mut self, process_response_values: impl FnOnce(&Self) -> bool) {
        if process_response_values(self) {
            self.success();
        } else {
            self.failure();
        }
    }

    pub fn is_done(&self) -> bool {
        self.header.completed_at.is_some()
    }
}

impl fmt::Display for ResponseRequired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_message(f, self.name, self.header.fields())
    }
}

/// A `ResponseRequired` that targets either self (the peer at the other
/// channel end) or a named sub-component on the peer, with a method name,
/// positional args, and keyword args.
#[derive(Clone, Debug)]
pub struct LayeredAction {
    pub response: ResponseRequired,
    /// `None` targets the peer itself; `Some(name)` targets a named
    /// sub-component on the peer.
    pub target: Option<String>,
    pub method: String,
    pub args: Vec<serde_json::Value>,
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

impl LayeredAction {
    pub fn new(target: Option<String>, method: impl Into<String>) -> Self {
        Self {
            response: ResponseRequired::new("LayeredAction", None),
            target,
            method: method.into(),
            args: Vec::new(),
            kwargs: serde_json::Map::new(),
        }
    }
}

fn write_message(f: &mut fmt::Formatter<'_>, name: &str, fields: &[Field]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        if field.name == "T_ELAPSED" {
            write!(f, "{} elapsed", field.value)?;
        } else {
            write!(f, "{}={}", field.name, field.value)?;
        }
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Notification::new("a");
        let b = Notification::new("b");
        assert_ne!(a.header.id, b.header.id);
    }

    #[test]
    fn completion_timestamp_set_at_most_once() {
        let mut m = ResponseRequired::new("m", None);
        m.success();
        let first = m.header.completed_at;
        // A second transition must not move the completion time.
        m.failure();
        assert_eq!(m.header.completed_at, first);
        assert_eq!(m.success, Success::Success);
    }

    #[test]
    fn elapsed_is_none_before_completion() {
        let m = ResponseRequired::new("m", None);
        assert!(m.header.elapsed().is_none());
    }

    #[test]
    fn exception_sets_error_and_marks_failure() {
        let mut m = ResponseRequired::new("m", None);
        m.exception("boom");
        assert_eq!(m.success, Success::Failure);
        assert_eq!(m.error.as_deref(), Some("boom"));
    }

    #[test]
    fn check_hook_can_downgrade_to_failure() {
        let mut m = ResponseRequired::new("m", None);
        m.check(|_| false);
        assert_eq!(m.success, Success::Failure);
    }

    #[test]
    fn display_renders_fields_in_order() {
        let mut m = ResponseRequired::new("Ping", None);
        m.header.push_field("a", 1);
        m.header.push_field("b", "x");
        assert_eq!(m.to_string(), "Ping(a=1,b=x)");
    }
}
