//! In-process stand-in for the chat backend.
//!
//! Runs a command server and a topic-filtering publication server on
//! ephemeral ports, with only as much backend behavior as the client tests need.

#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashSet},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
    sync::broadcast,
    task::JoinHandle,
    time::{sleep, timeout},
};
use topic_chat_client::message::{
    Delivery, FilterUpdate, read_frame, write_frame, write_message,
};

pub const WAIT: Duration = Duration::from_secs(3);

#[derive(Default)]
struct BackendState {
    users: BTreeSet<String>,
    channels: BTreeSet<String>,
    subscriptions: HashSet<String>,
    requests: Vec<Value>,
}

type SharedState = Arc<Mutex<BackendState>>;

pub struct StubBackend {
    pub command_addr: SocketAddr,
    pub subscribe_addr: SocketAddr,
    state: SharedState,
    publications: broadcast::Sender<Delivery>,
    tasks: Vec<JoinHandle<()>>,
}

impl StubBackend {
    pub async fn start() -> Result<Self> {
        let command_listener = TcpListener::bind("127.0.0.1:0").await?;
        let subscribe_listener = TcpListener::bind("127.0.0.1:0").await?;
        let command_addr = command_listener.local_addr()?;
        let subscribe_addr = subscribe_listener.local_addr()?;

        let state = SharedState::default();
        let (publications, _) = broadcast::channel(64);

        let command_task = {
            let state = Arc::clone(&state);
            let publications = publications.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = command_listener.accept().await {
                    tokio::spawn(serve_commands(
                        stream,
                        Arc::clone(&state),
                        publications.clone(),
                    ));
                }
            })
        };

        let subscribe_task = {
            let state = Arc::clone(&state);
            let publications = publications.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = subscribe_listener.accept().await {
                    tokio::spawn(serve_subscriber(
                        stream,
                        Arc::clone(&state),
                        publications.subscribe(),
                    ));
                }
            })
        };

        Ok(Self {
            command_addr,
            subscribe_addr,
            state,
            publications,
            tasks: vec![command_task, subscribe_task],
        })
    }

    /// Publishes a raw payload on `topic`, as another backend component would.
    pub fn publish(&self, topic: &str, payload: &str) {
        let _ = self.publications.send(Delivery {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().expect("state lock").requests.clone()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state
            .lock()
            .expect("state lock")
            .subscriptions
            .contains(topic)
    }

    /// Waits until the publication server has applied a subscribe for `topic`.
    pub async fn wait_for_subscription(&self, topic: &str) -> Result<()> {
        timeout(WAIT, async {
            while !self.is_subscribed(topic) {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| anyhow!("backend never saw a subscription to {topic}"))
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_commands(
    stream: TcpStream,
    state: SharedState,
    publications: broadcast::Sender<Delivery>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Ok(Some(frame)) = read_frame(&mut reader).await {
        let reply = match serde_json::from_str::<Value>(&frame) {
            Ok(request) => handle_request(request, &state, &publications),
            Err(err) => error_reply(format!("invalid request: {err}")),
        };
        if write_frame(&mut writer, &reply.to_string()).await.is_err() {
            break;
        }
    }
}

fn handle_request(
    request: Value,
    state: &SharedState,
    publications: &broadcast::Sender<Delivery>,
) -> Value {
    let mut state = state.lock().expect("state lock");
    state.requests.push(request.clone());

    let service = request["service"].as_str().unwrap_or_default();
    let data = request["data"].as_object().cloned().unwrap_or_default();
    let field = |name: &str| {
        data.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    match service {
        "login" => match field("user") {
            None => error_reply("invalid user name"),
            Some(user) if state.users.contains(&user) => {
                error_reply(format!("user '{user}' is already online"))
            }
            Some(user) => {
                let description = format!("user '{user}' logged in");
                state.users.insert(user);
                success_reply([("status", json!("sucesso")), ("description", json!(description))])
            }
        },
        "users" => success_reply([("users", json!(state.users))]),
        "channels" => success_reply([("channels", json!(state.channels))]),
        "channel" => match field("channel") {
            None => error_reply("invalid channel name"),
            Some(channel) if state.channels.contains(&channel) => {
                error_reply(format!("channel '{channel}' already exists"))
            }
            Some(channel) => {
                let description = format!("channel '{channel}' created");
                state.channels.insert(channel);
                success_reply([("description", json!(description))])
            }
        },
        "subscribe" => match field("channel") {
            None => error_reply("invalid channel name"),
            Some(_) => success_reply([]),
        },
        "publish" => match (field("channel"), field("user"), field("content")) {
            (Some(channel), Some(user), Some(content)) => {
                let payload = json!({
                    "type": "publish",
                    "user": user,
                    "content": content,
                    "timestamp": Utc::now().timestamp(),
                });
                let _ = publications.send(Delivery {
                    topic: channel,
                    payload: payload.to_string(),
                });
                success_reply([])
            }
            _ => error_reply("publish needs channel, user and content"),
        },
        other => error_reply(format!("unknown service '{other}'")),
    }
}

fn success_reply<const N: usize>(fields: [(&str, Value); N]) -> Value {
    let mut data = Map::new();
    data.insert("timestamp".to_string(), json!(Utc::now().timestamp()));
    for (key, value) in fields {
        data.insert(key.to_string(), value);
    }
    json!({"status": "success", "data": data})
}

fn error_reply(description: impl Into<String>) -> Value {
    json!({
        "status": "error",
        "data": {"description": description.into(), "timestamp": Utc::now().timestamp()}
    })
}

async fn serve_subscriber(
    stream: TcpStream,
    state: SharedState,
    mut publications: broadcast::Receiver<Delivery>,
) {
    let (reader, mut writer) = stream.into_split();
    // `next_line` is cancel safe, unlike a bare `read_line`, so no update is lost in `select!`.
    let mut updates = BufReader::new(reader).lines();
    let mut topics = HashSet::new();

    loop {
        select! {
            update = updates.next_line() => match parse_update(update) {
                Some(FilterUpdate::Subscribe { topic }) => {
                    state.lock().expect("state lock").subscriptions.insert(topic.clone());
                    topics.insert(topic);
                }
                Some(FilterUpdate::Unsubscribe { topic }) => {
                    state.lock().expect("state lock").subscriptions.remove(&topic);
                    topics.remove(&topic);
                }
                None => break,
            },
            delivery = publications.recv() => match delivery {
                Ok(delivery) if topics.contains(&delivery.topic) => {
                    if write_message(&mut writer, &delivery).await.is_err() {
                        break;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn parse_update(line: std::io::Result<Option<String>>) -> Option<FilterUpdate> {
    let line = line.ok()??;
    serde_json::from_str(&line).ok()
}
