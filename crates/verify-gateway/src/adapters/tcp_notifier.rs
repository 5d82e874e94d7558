//! Raw TCP hand-off to the downstream worker.
//!
//! One short-lived connection per verified request: connect, write the
//! payload, optionally read a single acknowledgement byte, close. No framing
//! and no retries.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::config::DownstreamConfig;
use crate::domain::{NotificationPayload, NotifyError};
use crate::ports::DownstreamNotifier;

/// Reply byte meaning the worker declined the verification
pub const REJECTION_BYTE: u8 = b'x';

#[derive(Debug, Clone)]
pub struct TcpNotifier {
    address: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    read_timeout: Duration,
}

impl TcpNotifier {
    pub fn new(config: &DownstreamConfig) -> Self {
        Self {
            address: format!("{}:{}", config.host, config.port),
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

#[async_trait]
impl DownstreamNotifier for TcpNotifier {
    async fn notify(
        &self,
        payload: &NotificationPayload,
        await_ack: bool,
    ) -> Result<(), NotifyError> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| NotifyError::ConnectTimeout(self.connect_timeout))?
            .map_err(NotifyError::Connect)?;

        let bytes = payload.to_bytes();
        timeout(self.write_timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| NotifyError::WriteTimeout(self.write_timeout))?
        .map_err(NotifyError::Write)?;

        if !await_ack {
            debug!(addr = %self.address, bytes = bytes.len(), "Payload written, not waiting for reply");
            return Ok(());
        }

        let mut reply = [0u8; 1];
        let read = timeout(self.read_timeout, stream.read(&mut reply))
            .await
            .map_err(|_| NotifyError::ReadTimeout(self.read_timeout))?
            .map_err(NotifyError::Read)?;

        match read {
            0 => Err(NotifyError::EmptyReply),
            _ if reply[0] == REJECTION_BYTE => Err(NotifyError::Rejected),
            _ => {
                debug!(reply = reply[0], "Downstream acknowledged");
                Ok(())
            }
        }
    }
}
