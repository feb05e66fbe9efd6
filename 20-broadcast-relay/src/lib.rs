//! Line-oriented TCP chat relay.
//!
//! Every connected client picks a display name, then each line it sends is
//! broadcast to every connected client, itself included. The wire protocol is
//! plain newline-terminated text:
//!
//! ```text
//! server -> client   SUBMIT_NAME
//! client -> server   <name>                    (empty aborts the handshake)
//! server -> client   NAME_ACCEPTED <name>
//! server -> all      <name> has joined the chat.
//! client -> server   <content>                 (empty lines are ignored)
//! server -> all      <name>: <content>
//! server -> all      <name> has left the chat.
//! ```
//!
//! - [`listener`] accepts TCP connections and spawns one task per connection.
//! - [`session`] runs the handshake and read loop for a single connection.
//! - [`registry`] holds the shared set of output sinks used for fan-out.
//! - [`relay`] builds the notices and chat lines and broadcasts them.
//! - [`protocol`] has the wire markers plus line read/write helpers.
//! - [`client`] is a small terminal client speaking the same protocol.
//! - [`cli`] and [`config`] cover argument parsing and listener settings.
//!
//! Names are neither validated nor checked for uniqueness, and nothing caps
//! the number of concurrent connections.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;
