//! The interactive loop.
//!
//! One input line is read, handled to completion (including its single
//! round trip on the command channel) and answered before the next line is
//! read. Inbound deliveries are rendered by the dispatcher task in the
//! meantime, so waiting on a reply never holds them up.

use std::{future::Future, io, thread};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::{select, sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    cli::ClientArgs,
    command::{HELP, UserCommand},
    command_client::CommandClient,
    console::Console,
    dispatcher::Dispatcher,
    editor::{RawMode, spawn_line_editor},
    error::ClientError,
    message::Request,
    registry::{SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome},
    session::Session,
    transport::{
        CommandTransport, TcpCommandTransport, TopicFilter, connect_subscriber,
        spawn_delivery_pump,
    },
};

/// Connects both channels and runs the interactive loop on the terminal until exit or Ctrl-C.
pub async fn run(args: ClientArgs) -> Result<()> {
    let console = Console::stdout(&args.prompt);
    let transport = TcpCommandTransport::connect(args.command_addr).await?;
    let (filter, deliveries) = connect_subscriber(args.subscribe_addr).await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut tasks = BackgroundTasks(vec![
        Dispatcher::new(console.clone()).spawn(events_rx),
        spawn_delivery_pump(deliveries, events_tx),
    ]);

    let client = Client::start(transport, filter, console.clone(), &args.global_topic)
        .await
        .with_context(|| format!("failed to subscribe to {}", args.global_topic))?;

    if !Console::is_interactive() {
        return client.run_until(stdin_lines(), ctrl_c()).await;
    }

    let raw_mode = RawMode::enable().context("failed to switch the terminal to raw mode")?;
    let editor = spawn_line_editor(console.clone());
    tasks.0.push(editor.task);
    let interrupted = editor.interrupted;
    let shutdown = async move {
        select! {
            _ = ctrl_c() => {}
            _ = interrupted => {}
        }
    };

    let result = client.run_until(editor.lines, shutdown).await;
    if let Err(error) = console.release().await {
        warn!(?error, "failed to clear the prompt");
    }
    drop(raw_mode);
    result
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}

/// Reads piped stdin on a dedicated thread so a pending read never keeps the process alive.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(?error, "failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Aborts the background tasks when the session ends, however it ends.
struct BackgroundTasks(Vec<JoinHandle<()>>);

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

enum Outcome {
    Lines(Vec<String>),
    Exit,
}

impl Outcome {
    fn info(text: impl AsRef<str>) -> Self {
        Outcome::Lines(vec![format!("*** {}", text.as_ref())])
    }
}

pub struct Client<T, F> {
    commands: CommandClient<T>,
    registry: SubscriptionRegistry<F>,
    session: Session,
    console: Console,
}

impl<T, F> Client<T, F>
where
    T: CommandTransport,
    F: TopicFilter,
{
    /// Creates the session and subscribes it to the global topic.
    pub async fn start(
        transport: T,
        filter: F,
        console: Console,
        global_topic: &str,
    ) -> Result<Self, ClientError> {
        let mut client = Self {
            commands: CommandClient::new(transport),
            registry: SubscriptionRegistry::new(filter),
            session: Session::new(),
            console,
        };
        client
            .registry
            .subscribe(&mut client.session, global_topic)
            .await?;
        Ok(client)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reads lines from `input` until exit, end of input or `shutdown` resolves,
    /// then closes both connections.
    pub async fn run_until<S>(mut self, mut input: mpsc::Receiver<String>, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let topics = self.registry.list_topics(&self.session).join(", ");
        self.console
            .info(&format!(
                "listening to {topics}; type 'help' for commands"
            ))
            .await?;

        let result: Result<()> = loop {
            select! {
                _ = &mut shutdown => {
                    info!("interrupted");
                    break Ok(());
                }
                line = input.recv() => {
                    let Some(line) = line else {
                        debug!("input closed");
                        break Ok(());
                    };
                    select! {
                        _ = &mut shutdown => {
                            info!("interrupted while a command was in flight");
                            break Ok(());
                        }
                        flow = self.handle_line(&line) => match flow {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Exit) => break Ok(()),
                            Err(err) => {
                                break Err(anyhow::Error::new(err).context("failed to write to the terminal"));
                            }
                        }
                    }
                }
            }
        };

        self.close().await;
        result
    }

    /// Handles one input line and renders the result. Only terminal failures are errors.
    pub async fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let command = match UserCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                self.console.prompt().await?;
                return Ok(Flow::Continue);
            }
            Err(err) => {
                self.console.warn(&err.to_string()).await?;
                return Ok(Flow::Continue);
            }
        };

        match self.execute(command).await {
            Ok(Outcome::Lines(lines)) => {
                self.console.render(lines).await?;
                Ok(Flow::Continue)
            }
            Ok(Outcome::Exit) => {
                self.console.info("leaving chat").await?;
                Ok(Flow::Exit)
            }
            Err(err) => {
                self.console.warn(&err.to_string()).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute(&mut self, command: UserCommand) -> Result<Outcome, ClientError> {
        match command {
            UserCommand::Exit => Ok(Outcome::Exit),
            UserCommand::Help => Ok(help_lines(None)),
            UserCommand::Unknown(input) => Ok(help_lines(Some(&input))),
            UserCommand::Login { name } => self.login(&name).await,
            UserCommand::Users => self.list("users", Request::users()).await,
            UserCommand::Channels => self.list("channels", Request::channels()).await,
            UserCommand::CreateChannel { name } => {
                let data = self.commands.invoke(Request::channel(&name)).await?.into_result()?;
                Ok(Outcome::info(
                    describe(&data).unwrap_or_else(|| format!("channel {name} created")),
                ))
            }
            UserCommand::Subscribe { topic } => self.subscribe(&topic).await,
            UserCommand::Unsubscribe { topic } => {
                match self.registry.unsubscribe(&mut self.session, &topic).await? {
                    UnsubscribeOutcome::Unsubscribed => {
                        Ok(Outcome::info(format!("unsubscribed from {topic}")))
                    }
                    UnsubscribeOutcome::NotSubscribed => {
                        Ok(Outcome::info(format!("not subscribed to {topic}")))
                    }
                }
            }
            UserCommand::Topics => {
                let topics = self.registry.list_topics(&self.session);
                Ok(Outcome::info(format!("topics: {}", topics.join(", "))))
            }
            UserCommand::Publish { topic, message } => self.publish(&topic, &message).await,
        }
    }

    async fn login(&mut self, name: &str) -> Result<Outcome, ClientError> {
        if let Some(current) = self.session.identity() {
            return Err(ClientError::validation(format!(
                "already logged in as {current}"
            )));
        }

        self.commands.invoke(Request::login(name)).await?.into_result()?;
        self.session.set_identity(name)?;
        info!(user = name, "logged in");

        // Identity is already committed, so a personal topic failure is reported, not returned.
        let mut lines = vec![format!("*** logged in as {name}")];
        match self.registry.subscribe(&mut self.session, name).await {
            Ok(SubscribeOutcome::Subscribed) => {
                lines.push(format!("*** direct messages will arrive on {name}"));
            }
            Ok(SubscribeOutcome::AlreadySubscribed) => {}
            Err(err) => {
                warn!(user = name, %err, "personal topic subscription failed");
                lines.push(format!("!!! {err}"));
                lines.push(format!(
                    "!!! direct messages will not arrive until 'subscribe {name}' succeeds"
                ));
            }
        }
        Ok(Outcome::Lines(lines))
    }

    async fn subscribe(&mut self, topic: &str) -> Result<Outcome, ClientError> {
        if self.session.topics().contains(topic) {
            return Ok(Outcome::info(format!("already subscribed to {topic}")));
        }

        self.commands
            .invoke(Request::subscribe(topic))
            .await?
            .into_result()?;
        let text = match self.registry.subscribe(&mut self.session, topic).await? {
            SubscribeOutcome::Subscribed => format!("subscribed to {topic}"),
            SubscribeOutcome::AlreadySubscribed => format!("already subscribed to {topic}"),
        };
        Ok(Outcome::info(text))
    }

    async fn publish(&mut self, topic: &str, message: &str) -> Result<Outcome, ClientError> {
        let Some(user) = self.session.identity().map(str::to_string) else {
            return Err(ClientError::validation("you must login before publishing"));
        };

        self.commands
            .invoke(Request::publish(topic, &user, message))
            .await?
            .into_result()?;
        Ok(Outcome::info(format!("message delivered to {topic}")))
    }

    async fn list(&mut self, label: &str, request: Request) -> Result<Outcome, ClientError> {
        let data = self.commands.invoke(request).await?.into_result()?;
        Ok(Outcome::info(format!("{label}: {}", listing(label, data))))
    }

    pub async fn close(&mut self) {
        self.commands.close().await;
        self.registry.close().await;
        info!("connections closed");
    }
}

fn help_lines(unknown: Option<&str>) -> Outcome {
    let mut lines = Vec::with_capacity(HELP.len() + 1);
    if let Some(input) = unknown {
        lines.push(format!("!!! unknown command: {input}"));
    }
    lines.extend(HELP.iter().map(|line| line.to_string()));
    Outcome::Lines(lines)
}

fn describe(data: &Map<String, Value>) -> Option<String> {
    data.get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Renders `data[label]` as a comma separated list, or the whole data when it is not a list.
fn listing(label: &str, mut data: Map<String, Value>) -> String {
    match data.remove(label) {
        Some(Value::Array(items)) if items.is_empty() => "(none)".to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
        None => Value::Object(data).to_string(),
    }
}
