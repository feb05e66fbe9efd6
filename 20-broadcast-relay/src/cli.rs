use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_PORT, RelayConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // `serve` with default arguments when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command.unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting TCP connections and fanning out every line.
    Serve(ServeArgs),
    /// Connect to a relay and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value_t = RelayConfig::default().listen)]
    pub listen: SocketAddr,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            listen: RelayConfig::default().listen,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Display name sent when the relay asks for one. Read from stdin if omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Address of the relay to connect to.
    #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    pub server: SocketAddr,
}
