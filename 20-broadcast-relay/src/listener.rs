use std::{future::Future, net::SocketAddr, sync::Arc};

use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::info;

use crate::{
    config::RelayConfig,
    error::RelayError,
    registry::{Registry, SessionId, Sink},
    relay::Relay,
    session::Session,
};

/// Accepts connections and hands each one to its own session task.
///
/// There is no cap on concurrent sessions.
pub struct Listener {
    listener: TcpListener,
    relay: Relay,
}

impl Listener {
    pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self::new(listener))
    }

    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            relay: Relay::new(Arc::new(Registry::new())),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener.local_addr().map_err(RelayError::LocalAddr)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.relay.registry())
    }

    /// Accepts connections until accepting fails.
    pub async fn run(self) -> Result<(), RelayError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves or accepting fails.
    ///
    /// Sessions already spawned keep running after this returns.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send,
    {
        let Listener { listener, relay } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("listener shutting down");
                    return Ok(());
                }
                accept_result = listener.accept() => {
                    let (stream, peer) = accept_result.map_err(RelayError::Accept)?;
                    spawn_session(stream, peer, &relay);
                }
            }
        }
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, relay: &Relay) {
    let relay = relay.clone();
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        let session = Session::new(SessionId::next(), BufReader::new(reader), Sink::new(writer))
            .with_peer(peer);
        session.run(&relay).await;
    });
}
