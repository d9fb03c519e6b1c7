use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Address of the request/reply command server.
    #[arg(long, default_value = "127.0.0.1:5555")]
    pub command_addr: SocketAddr,

    /// Address of the topic publication server.
    #[arg(long, default_value = "127.0.0.1:5558")]
    pub subscribe_addr: SocketAddr,

    /// Topic every session listens to from the start.
    #[arg(long, default_value = "general")]
    pub global_topic: String,

    /// Prompt shown when stdout is a terminal.
    #[arg(long, default_value = "> ")]
    pub prompt: String,
}
