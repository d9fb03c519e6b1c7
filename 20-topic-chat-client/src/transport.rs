//! Network seams for both channels.
//!
//! [`CommandTransport`] and [`TopicFilter`] are the only things the rest of
//! the crate knows about the network, so tests swap them for in-memory stubs.
//! The TCP implementations speak the JSON line framing from [`crate::message`].

use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dispatcher::DispatchEvent,
    error::ClientError,
    message::{
        Delivery, FilterUpdate, read_frame, read_frame_lossy, write_frame, write_message,
    },
};

/// Strict request/reply exchange on the command channel.
#[async_trait]
pub trait CommandTransport: Send {
    /// Sends one encoded request and returns the next reply frame.
    async fn exchange(&mut self, request: String) -> Result<String, ClientError>;

    async fn close(&mut self);
}

/// Controls which topics the subscription channel delivers.
#[async_trait]
pub trait TopicFilter: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), ClientError>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ClientError>;

    async fn close(&mut self);
}

pub struct TcpCommandTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpCommandTransport {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to command server at {addr}"))?;
        info!("command channel connected to {addr}");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }
}

#[async_trait]
impl CommandTransport for TcpCommandTransport {
    async fn exchange(&mut self, request: String) -> Result<String, ClientError> {
        write_frame(&mut self.writer, &request).await?;
        match read_frame(&mut self.reader).await? {
            Some(reply) => Ok(reply),
            None => Err(ClientError::Transport(
                "server closed the command connection".to_string(),
            )),
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.writer.shutdown().await {
            warn!(?error, "failed to shutdown command channel cleanly");
        }
    }
}

pub struct TcpTopicFilter {
    writer: OwnedWriteHalf,
}

#[async_trait]
impl TopicFilter for TcpTopicFilter {
    async fn subscribe(&mut self, topic: &str) -> Result<(), ClientError> {
        let update = FilterUpdate::Subscribe {
            topic: topic.to_string(),
        };
        write_message(&mut self.writer, &update).await?;
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), ClientError> {
        let update = FilterUpdate::Unsubscribe {
            topic: topic.to_string(),
        };
        write_message(&mut self.writer, &update).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(error) = self.writer.shutdown().await {
            warn!(?error, "failed to shutdown subscription channel cleanly");
        }
    }
}

/// Opens the subscription channel, returning the filter half and the delivery half.
pub async fn connect_subscriber(
    addr: SocketAddr,
) -> Result<(TcpTopicFilter, BufReader<OwnedReadHalf>)> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to subscription server at {addr}"))?;
    info!("subscription channel connected to {addr}");

    let (reader, writer) = stream.into_split();
    Ok((TcpTopicFilter { writer }, BufReader::new(reader)))
}

/// Forwards every delivery frame to the dispatcher queue until the channel closes.
///
/// Undecodable frames become notices; the pump keeps reading after them.
pub fn spawn_delivery_pump<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<DispatchEvent>,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let frame = match read_frame_lossy(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    let _ = events.send(DispatchEvent::Notice(
                        "subscription connection closed by server".to_string(),
                    ));
                    break;
                }
                Err(error) => {
                    warn!(?error, "subscription channel read failed");
                    let _ = events.send(DispatchEvent::Notice(format!(
                        "subscription connection lost: {error}"
                    )));
                    break;
                }
            };

            let event = match serde_json::from_str::<Delivery>(&frame) {
                Ok(delivery) => {
                    debug!(topic = %delivery.topic, "delivery received");
                    DispatchEvent::Delivery(delivery)
                }
                Err(error) => {
                    debug!(%error, "malformed delivery frame");
                    DispatchEvent::Notice(format!("malformed delivery frame: {frame}"))
                }
            };

            if events.send(event).is_err() {
                break;
            }
        }
    })
}
