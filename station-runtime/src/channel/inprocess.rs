//! In-process back-end: a crossed pair of unbounded `tokio::sync::mpsc`
//! queues, one per direction. This is the back-end [`crate::actor::ActorWorker`]
//! uses for resources that live as ordinary tokio tasks in this process.

use super::Frame;
use crate::errors::ChannelError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout as tokio_timeout;

pub(super) struct InProcessHalf<M> {
    tx: mpsc::UnboundedSender<Frame<M>>,
    rx: mpsc::UnboundedReceiver<Frame<M>>,
    peeked: Option<Frame<M>>,
    outstanding: i64,
}

pub(super) fn pair<M>() -> (InProcessHalf<M>, InProcessHalf<M>) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    (
        InProcessHalf {
            tx: tx_a,
            rx: rx_b,
            peeked: None,
            outstanding: 0,
        },
        InProcessHalf {
            tx: tx_b,
            rx: rx_a,
            peeked: None,
            outstanding: 0,
        },
    )
}

impl<M> InProcessHalf<M> {
    pub(super) fn put(&mut self, frame: Frame<M>) -> Result<(), ChannelError> {
        self.tx.send(frame).map_err(|_| ChannelError::ConnectionClosed)
    }

    pub(super) async fn get(&mut self, timeout: Option<Duration>) -> Result<Frame<M>, ChannelError> {
        if let Some(frame) = self.peeked.take() {
            self.outstanding += 1;
            return Ok(frame);
        }

        let frame = match timeout {
            None => self.rx.recv().await.ok_or(ChannelError::ConnectionClosed)?,
            Some(d) if d.is_zero() => self.rx.try_recv().map_err(|e| match e {
                mpsc::error::TryRecvError::Empty => ChannelError::Empty,
                mpsc::error::TryRecvError::Disconnected => ChannelError::ConnectionClosed,
            })?,
            Some(d) => match tokio_timeout(d, self.rx.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(ChannelError::ConnectionClosed),
                Err(_) => return Err(ChannelError::Empty),
            },
        };
        self.outstanding += 1;
        Ok(frame)
    }

    pub(super) async fn peek(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(frame) => {
                self.peeked = Some(frame);
                true
            }
            Err(_) => false,
        }
    }

    pub(super) fn task_done(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::super::DuplexChannel;

    #[tokio::test]
    async fn put_on_one_side_is_observed_by_get_on_the_other() {
        let (mut a, mut b): (DuplexChannel<i32>, DuplexChannel<i32>) =
            DuplexChannel::in_process_pair();
        a.put(7).await.unwrap();
        assert_eq!(b.get(None).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn sentinel_is_not_observed_as_data() {
        let (mut a, mut b): (DuplexChannel<i32>, DuplexChannel<i32>) =
            DuplexChannel::in_process_pair();
        a.put_sentinel().await;
        let err = b.get(None).await.unwrap_err();
        assert_eq!(err, crate::errors::ChannelError::SentinelReceived);
    }

    #[tokio::test]
    async fn poll_is_non_destructive() {
        let (mut a, mut b): (DuplexChannel<i32>, DuplexChannel<i32>) =
            DuplexChannel::in_process_pair();
        a.put(1).await.unwrap();
        assert!(b.poll().await);
        assert!(b.poll().await);
        assert_eq!(b.get(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropping_one_side_closes_the_other() {
        let (a, mut b): (DuplexChannel<i32>, DuplexChannel<i32>) = DuplexChannel::in_process_pair();
        drop(a);
        let err = b.get(None).await.unwrap_err();
        assert_eq!(err, crate::errors::ChannelError::ConnectionClosed);
    }

    #[tokio::test]
    async fn next_drains_the_queue_then_yields_none() {
        let (mut a, mut b): (DuplexChannel<i32>, DuplexChannel<i32>) = DuplexChannel::in_process_pair();
        a.put(1).await.unwrap();
        a.put(2).await.unwrap();
        assert_eq!(b.next().await, Some(1));
        assert_eq!(b.next().await, Some(2));
        assert_eq!(b.next().await, None);
    }
}
