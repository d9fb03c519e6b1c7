use std::{fmt, io};

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ClientError;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Services understood by the command channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Login,
    Users,
    Channel,
    Channels,
    Subscribe,
    Publish,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Login => "login",
            Service::Users => "users",
            Service::Channel => "channel",
            Service::Channels => "channels",
            Service::Subscribe => "subscribe",
            Service::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// One command-channel request. Built fresh for every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub service: Service,
    pub data: Map<String, Value>,
}

impl Request {
    /// Creates a request whose data carries only the current timestamp.
    pub fn new(service: Service) -> Self {
        let mut data = Map::new();
        data.insert("timestamp".to_string(), Value::from(Utc::now().timestamp()));
        Self { service, data }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), Value::String(value.into()));
        self
    }

    pub fn login(user: &str) -> Self {
        Self::new(Service::Login).with("user", user)
    }

    pub fn users() -> Self {
        Self::new(Service::Users)
    }

    pub fn channel(channel: &str) -> Self {
        Self::new(Service::Channel).with("channel", channel)
    }

    pub fn channels() -> Self {
        Self::new(Service::Channels)
    }

    pub fn subscribe(channel: &str) -> Self {
        Self::new(Service::Subscribe).with("channel", channel)
    }

    pub fn publish(channel: &str, user: &str, content: &str) -> Self {
        Self::new(Service::Publish)
            .with("channel", channel)
            .with("user", user)
            .with("content", content)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    #[serde(alias = "sucesso")]
    Success,
    #[serde(alias = "erro")]
    Error,
}

/// The single reply correlated with the last request sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Reply {
    pub fn description(&self) -> Option<&str> {
        self.data.get("description").and_then(Value::as_str)
    }

    /// Turns an error status into [`ClientError::Server`], keeping the data otherwise.
    pub fn into_result(self) -> Result<Map<String, Value>, ClientError> {
        match self.status {
            ReplyStatus::Success => Ok(self.data),
            ReplyStatus::Error => Err(ClientError::Server(
                self.description()
                    .unwrap_or("server reported an error")
                    .to_string(),
            )),
        }
    }
}

/// Subscription channel frame sent by the server for every matching publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
}

/// Subscription channel frame sent by the client to change its topic filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterUpdate {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Reads the next non-blank line, without its terminator. `None` on EOF.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Like [`read_frame`], but bytes that are not UTF-8 are replaced instead of
/// failing the read, so one bad frame never ends the stream.
pub async fn read_frame_lossy<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut bytes = Vec::new();
    loop {
        bytes.clear();
        if reader.read_until(b'\n', &mut bytes).await? == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&bytes);
        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(frame.len() + 1);
    encoded.extend_from_slice(frame.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(frame) => serde_json::from_str(&frame).map(Some).map_err(to_io_error),
        None => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = serde_json::to_string(message).map_err(to_io_error)?;
    write_frame(writer, &encoded).await
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
