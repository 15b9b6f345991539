//! The duplex messaging fabric (§4.2): a typed, bidirectional channel with
//! two back-ends — an in-process queue pair, and a cross-process framed
//! byte pipe — behind one [`DuplexChannel`] type.
//!
//! Messages never cross direction. Sentinels are not data: they travel
//! alongside the message stream as a distinct [`Frame`] variant, and once a
//! [`ChannelError::ConnectionClosed`] has been observed on one endpoint,
//! every subsequent operation on either endpoint keeps failing the same way
//! (absorbing state).

pub mod inprocess;
pub mod process;

use crate::errors::ChannelError;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::time::Duration;

/// A frame on the wire: either application data, or one of the two
/// well-known lifecycle tokens.
#[derive(Debug, Serialize, serde::Deserialize)]
pub(crate) enum Frame<M> {
    Started,
    Sentinel,
    Data(M),
}

enum Backend<M> {
    InProcess(inprocess::InProcessHalf<M>),
    CrossProcess(process::CrossProcessHalf<M>),
}

/// One endpoint of a duplex channel. Messages must be (de)serializable so
/// the same type works unmodified over both back-ends.
pub struct DuplexChannel<M> {
    backend: Backend<M>,
}

impl<M> DuplexChannel<M>
where
    M: Serialize + DeserializeOwned + Send + Debug + 'static,
{
    /// Builds an in-process duplex pair: two endpoints wired so that what
    /// one side `put`s, the other side's `get` observes.
    pub fn in_process_pair() -> (Self, Self) {
        let (a, b) = inprocess::pair();
        (
            Self {
                backend: Backend::InProcess(a),
            },
            Self {
                backend: Backend::InProcess(b),
            },
        )
    }

    /// Wraps a cross-process endpoint over length-prefixed framed byte
    /// pipes (e.g. the stdin/stdout of a child process, or a pair of OS
    /// pipes set up by the caller).
    pub fn cross_process(
        reader: impl tokio::io::AsyncRead + Send + Unpin + 'static,
        writer: impl tokio::io::AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            backend: Backend::CrossProcess(process::CrossProcessHalf::new(reader, writer)),
        }
    }

    /// Enqueue a message. Fails with `ConnectionClosed` if the peer end is
    /// gone. Returns as soon as the in-process queue accepts it, or once the
    /// cross-process frame is flushed to the pipe.
    pub async fn put(&mut self, msg: M) -> Result<(), ChannelError> {
        self.put_frame(Frame::Data(msg)).await
    }

    /// Writes the well-known close sentinel. Not a data value.
    pub async fn put_sentinel(&mut self) {
        let _ = self.put_frame(Frame::Sentinel).await;
    }

    /// Writes the well-known "worker has started" token.
    pub async fn put_started(&mut self) {
        let _ = self.put_frame(Frame::Started).await;
    }

    async fn put_frame(&mut self, frame: Frame<M>) -> Result<(), ChannelError> {
        match &mut self.backend {
            Backend::InProcess(h) => h.put(frame),
            Backend::CrossProcess(h) => h.put(frame).await,
        }
    }

    /// Blocking dequeue. `timeout = None` waits forever; `Some(Duration::ZERO)`
    /// is equivalent to [`get_nowait`](Self::get_nowait).
    pub async fn get(&mut self, timeout: Option<Duration>) -> Result<M, ChannelError> {
        loop {
            let frame = match &mut self.backend {
                Backend::InProcess(h) => h.get(timeout).await?,
                Backend::CrossProcess(h) => h.get(timeout).await?,
            };
            match frame {
                Frame::Data(msg) => return Ok(msg),
                Frame::Sentinel => return Err(ChannelError::SentinelReceived),
                Frame::Started => continue,
            }
        }
    }

    /// `get(Some(Duration::ZERO))`.
    pub async fn get_nowait(&mut self) -> Result<M, ChannelError> {
        self.get(Some(Duration::ZERO)).await
    }

    /// One step of the "iterate until `Empty`" contract (§4.2): the next
    /// already-queued message, or `None` once the queue is drained. A
    /// closed connection also yields `None` — iteration doesn't distinguish
    /// "nothing queued right now" from "peer gone", it just stops.
    pub async fn next(&mut self) -> Option<M> {
        self.get_nowait().await.ok()
    }

    /// True iff `get_nowait` would currently succeed. Non-destructive: a
    /// message observed by `poll` is still returned by the next `get`.
    pub async fn poll(&mut self) -> bool {
        match &mut self.backend {
            Backend::InProcess(h) => h.peek().await,
            Backend::CrossProcess(h) => h.peek().await,
        }
    }

    /// Send the close sentinel, then read until the peer acknowledges with
    /// its own sentinel (or the connection closes outright).
    pub async fn kill_other(&mut self) {
        self.put_sentinel().await;
        loop {
            match self.get(None).await {
                Err(ChannelError::SentinelReceived) | Err(ChannelError::ConnectionClosed) => break,
                Err(ChannelError::Empty) => continue,
                Ok(_) => continue,
            }
        }
    }

    /// No-op on the cross-process back-end; a counter decrement on the
    /// in-process back-end (mirrors the source queue's task-tracking).
    pub fn task_done(&mut self) {
        if let Backend::InProcess(h) = &mut self.backend {
            h.task_done();
        }
    }
}
