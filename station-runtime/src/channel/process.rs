//! Cross-process back-end: two simplex byte pipes (e.g. a child process's
//! stdin/stdout) framed as 4-byte big-endian length prefix + JSON body.
//!
//! Used for resources that need OS-level isolation from the station
//! process (a misbehaving instrument driver should not be able to take the
//! whole station down with it).

use super::Frame;
use crate::errors::ChannelError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(super) struct CrossProcessHalf<M> {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    peeked: Option<Frame<M>>,
    closed: bool,
}

impl<M> CrossProcessHalf<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    pub(super) fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peeked: None,
            closed: false,
        }
    }

    pub(super) async fn put(&mut self, frame: Frame<M>) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::ConnectionClosed);
        }
        let body = serde_json::to_vec(&frame).map_err(|_| ChannelError::ConnectionClosed)?;
        let len = (body.len() as u32).to_be_bytes();
        let result = async {
            self.writer.write_all(&len).await?;
            self.writer.write_all(&body).await?;
            self.writer.flush().await
        }
        .await;
        if result.is_err() {
            self.closed = true;
        }
        result.map_err(|_| ChannelError::ConnectionClosed)
    }

    pub(super) async fn get(&mut self, timeout: Option<Duration>) -> Result<Frame<M>, ChannelError> {
        if let Some(frame) = self.peeked.take() {
            return Ok(frame);
        }
        if self.closed {
            return Err(ChannelError::ConnectionClosed);
        }

        match timeout {
            None => self.read_one().await,
            Some(d) => match tokio::time::timeout(d, self.read_one()).await {
                Ok(r) => r,
                Err(_) => Err(ChannelError::Empty),
            },
        }
    }

    pub(super) async fn peek(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        match tokio::time::timeout(Duration::from_millis(0), self.read_one()).await {
            Ok(Ok(frame)) => {
                self.peeked = Some(frame);
                true
            }
            _ => false,
        }
    }

    async fn read_one(&mut self) -> Result<Frame<M>, ChannelError> {
        let mut len_buf = [0u8; 4];
        self.reader
            .read_exact(&mut len_buf)
            .await
            .map_err(|_| ChannelError::ConnectionClosed)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|_| ChannelError::ConnectionClosed)?;
        serde_json::from_slice(&body).map_err(|_| ChannelError::ConnectionClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::DuplexChannel;

    #[tokio::test]
    async fn roundtrips_over_an_in_memory_duplex_stream() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let mut a: DuplexChannel<String> = DuplexChannel::cross_process(client_r, client_w);
        let mut b: DuplexChannel<String> = DuplexChannel::cross_process(server_r, server_w);

        a.put("hello".to_string()).await.unwrap();
        assert_eq!(b.get(None).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn sentinel_round_trips_as_connection_closed_signal() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let mut a: DuplexChannel<String> = DuplexChannel::cross_process(client_r, client_w);
        let mut b: DuplexChannel<String> = DuplexChannel::cross_process(server_r, server_w);

        a.put_sentinel().await;
        let err = b.get(None).await.unwrap_err();
        assert_eq!(err, crate::errors::ChannelError::SentinelReceived);
    }
}
