//! Terminal client for a topic-based chat backend.
//!
//! The backend is reached over two independent connections: a command
//! channel with strict request/reply semantics, and a subscription channel
//! that delivers topic-tagged messages whenever they are published. Each
//! module focuses on one concern:
//!
//! - [`cli`] parses the command-line flags.
//! - [`message`] defines the JSON line protocol for both channels.
//! - [`transport`] holds the network seams and their TCP implementations.
//! - [`command_client`] keeps exactly one request in flight on the command channel.
//! - [`session`] and [`registry`] track identity and subscribed topics.
//! - [`dispatcher`] classifies and renders inbound messages on its own task.
//! - [`console`] serializes everything written to the terminal.
//! - [`editor`] edits the line being typed when attached to a terminal.
//! - [`command`] parses operator input, and [`client`] runs the interactive loop.

pub mod cli;
pub mod client;
pub mod command;
pub mod command_client;
pub mod console;
pub mod dispatcher;
pub mod editor;
pub mod error;
pub mod message;
pub mod registry;
pub mod session;
pub mod transport;
