//! Per-connection handshake and read loop.
//!
//! A session moves through `AwaitingName -> Active -> Closed` exactly once.
//! Whatever ends it (an empty name, end-of-stream, or an I/O error), the
//! closing steps always run: deregister, announce the departure if the session
//! ever became active, and shut down the write side of the connection.

use std::{mem, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use crate::{
    protocol::{SUBMIT_NAME, name_accepted, read_line},
    registry::{SessionId, Sink},
    relay::Relay,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingName,
    Active { name: String },
    Closed,
}

pub struct Session<R> {
    id: SessionId,
    peer: Option<SocketAddr>,
    reader: R,
    sink: Sink,
    state: SessionState,
}

impl<R> Session<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(id: SessionId, reader: R, sink: Sink) -> Self {
        Self {
            id,
            peer: None,
            reader,
            sink,
            state: SessionState::AwaitingName,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drives the session to completion. Consumes it so the read half is
    /// released together with the session.
    pub async fn run(mut self, relay: &Relay) {
        if let Err(err) = self.serve(relay).await {
            warn!(session = %self.id, peer = ?self.peer, error = ?err, "session ended with error");
        }
        self.close(relay).await;
    }

    async fn serve(&mut self, relay: &Relay) -> Result<()> {
        self.sink
            .send_line(SUBMIT_NAME)
            .await
            .context("failed to request name")?;

        let Some(name) = self.await_name().await? else {
            debug!(session = %self.id, peer = ?self.peer, "handshake abandoned");
            return Ok(());
        };

        self.activate(relay, name).await?;
        self.pump(relay).await
    }

    async fn await_name(&mut self) -> Result<Option<String>> {
        let line = read_line(&mut self.reader)
            .await
            .context("failed to read name")?;
        Ok(line.filter(|name| !name.is_empty()))
    }

    async fn activate(&mut self, relay: &Relay, name: String) -> Result<()> {
        relay.register(self.id, self.sink.clone()).await;
        info!(session = %self.id, peer = ?self.peer, %name, "client joined");
        self.state = SessionState::Active { name: name.clone() };

        // Announce even if the confirmation failed: the session is registered
        // and its close will announce the departure.
        let confirmed = self.sink.send_line(&name_accepted(&name)).await;
        relay.announce_join(&name).await;
        confirmed.context("failed to confirm name")
    }

    async fn pump(&mut self, relay: &Relay) -> Result<()> {
        let SessionState::Active { name } = &self.state else {
            return Ok(());
        };

        while let Some(content) = read_line(&mut self.reader)
            .await
            .context("failed to read from client")?
        {
            if content.is_empty() {
                continue;
            }
            relay.relay_message(name, &content).await;
        }
        Ok(())
    }

    async fn close(&mut self, relay: &Relay) {
        relay.deregister(self.id).await;

        if let SessionState::Active { name } = mem::replace(&mut self.state, SessionState::Closed)
        {
            info!(session = %self.id, peer = ?self.peer, %name, "client disconnected");
            relay.announce_leave(&name).await;
        }

        if let Err(error) = self.sink.shutdown().await {
            debug!(session = %self.id, ?error, "failed to shut down connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context as TaskContext, Poll},
    };

    use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, duplex, split};

    use super::*;

    /// Accepts a fixed number of writes, then fails every write after that.
    struct FailingAfter {
        writes_left: usize,
    }

    impl AsyncWrite for FailingAfter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.writes_left == 0 {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            self.writes_left -= 1;
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Harness {
        relay: Relay,
        observer: BufReader<DuplexStream>,
    }

    impl Harness {
        async fn new() -> Self {
            let relay = Relay::default();
            let (writer, reader) = duplex(1024);
            relay.register(SessionId::next(), Sink::new(writer)).await;
            Self {
                relay,
                observer: BufReader::new(reader),
            }
        }

        /// Runs a session fed with `input`, returning the lines sent back to it.
        async fn run_session(&self, input: &[u8]) -> BufReader<ReadHalf<DuplexStream>> {
            let (client, server) = duplex(1024);
            let (client_read, mut client_write) = split(client);
            let (server_read, server_write) = split(server);

            client_write.write_all(input).await.unwrap();
            client_write.shutdown().await.unwrap();

            let session = Session::new(
                SessionId::next(),
                BufReader::new(server_read),
                Sink::new(server_write),
            );
            assert_eq!(session.state(), &SessionState::AwaitingName);
            session.run(&self.relay).await;

            BufReader::new(client_read)
        }
    }

    async fn lines<R: AsyncBufRead + Unpin>(reader: &mut R) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = read_line(reader).await.unwrap() {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn full_lifecycle_announces_join_messages_and_leave() {
        let mut harness = Harness::new().await;

        let mut client = harness.run_session(b"alice\n\nhello\n").await;

        assert_eq!(
            lines(&mut client).await,
            vec![
                "SUBMIT_NAME",
                "NAME_ACCEPTED alice",
                "alice has joined the chat.",
                "alice: hello",
            ]
        );

        let expected = [
            "alice has joined the chat.",
            "alice: hello",
            "alice has left the chat.",
        ];
        for line in expected {
            assert_eq!(
                read_line(&mut harness.observer).await.unwrap().as_deref(),
                Some(line)
            );
        }
        assert_eq!(harness.relay.registry().len().await, 1);
    }

    #[tokio::test]
    async fn empty_name_closes_without_announcements() {
        let mut harness = Harness::new().await;

        let mut client = harness.run_session(b"\nignored\n").await;
        assert_eq!(lines(&mut client).await, vec!["SUBMIT_NAME"]);

        harness.relay.announce_join("probe").await;
        assert_eq!(
            read_line(&mut harness.observer).await.unwrap().as_deref(),
            Some("probe has joined the chat.")
        );
        assert_eq!(harness.relay.registry().len().await, 1);
    }

    #[tokio::test]
    async fn eof_before_name_closes_quietly() {
        let mut harness = Harness::new().await;

        let mut client = harness.run_session(b"").await;
        assert_eq!(lines(&mut client).await, vec!["SUBMIT_NAME"]);

        harness.relay.announce_join("probe").await;
        assert_eq!(
            read_line(&mut harness.observer).await.unwrap().as_deref(),
            Some("probe has joined the chat.")
        );
    }

    #[tokio::test]
    async fn whitespace_only_lines_are_relayed_verbatim() {
        let mut harness = Harness::new().await;

        harness.run_session(b"bob\n  \n").await;

        for line in [
            "bob has joined the chat.",
            "bob:   ",
            "bob has left the chat.",
        ] {
            assert_eq!(
                read_line(&mut harness.observer).await.unwrap().as_deref(),
                Some(line)
            );
        }
    }

    #[tokio::test]
    async fn failed_confirmation_still_pairs_join_with_leave() {
        let mut harness = Harness::new().await;

        let session = Session::new(
            SessionId::next(),
            &b"alice\nnever relayed\n"[..],
            Sink::new(FailingAfter { writes_left: 1 }),
        );
        session.run(&harness.relay).await;

        for line in ["alice has joined the chat.", "alice has left the chat."] {
            assert_eq!(
                read_line(&mut harness.observer).await.unwrap().as_deref(),
                Some(line)
            );
        }
        assert_eq!(harness.relay.registry().len().await, 1);
    }
}
