use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::ClientError,
    message::{Reply, Request},
    transport::CommandTransport,
};

/// Request/reply client for the command channel.
///
/// The protocol has no request ids, so the next reply always belongs to the
/// last request sent. The transport lives behind a mutex held for the whole
/// exchange: a second `invoke` waits until the first reply has been read.
pub struct CommandClient<T> {
    channel: Mutex<Channel<T>>,
}

struct Channel<T> {
    transport: T,
    closed: bool,
}

impl<T: CommandTransport> CommandClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            channel: Mutex::new(Channel {
                transport,
                closed: false,
            }),
        }
    }

    pub async fn invoke(&self, request: Request) -> Result<Reply, ClientError> {
        let mut channel = self.channel.lock().await;
        if channel.closed {
            return Err(ClientError::Transport(
                "command connection is closed".to_string(),
            ));
        }

        let service = request.service;
        let encoded = serde_json::to_string(&request)?;
        debug!(%service, "sending request");

        let frame = match channel.transport.exchange(encoded).await {
            Ok(frame) => frame,
            Err(err) => {
                if err.is_transport() {
                    warn!(%service, error = %err, "command channel failed");
                    channel.closed = true;
                }
                return Err(err);
            }
        };

        serde_json::from_str::<Reply>(&frame)
            .map_err(|err| ClientError::Protocol(format!("malformed reply to {service}: {err}")))
    }

    /// Releases the connection. Later calls to `invoke` fail.
    pub async fn close(&self) {
        let mut channel = self.channel.lock().await;
        if !channel.closed {
            channel.transport.close().await;
            channel.closed = true;
        }
    }
}
