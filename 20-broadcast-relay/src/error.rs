use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures of the listening endpoint. Both end the process; per-connection
/// errors never surface here.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}
