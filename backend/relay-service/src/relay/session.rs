//! Per-connection state machine.
//!
//! ```text
//! Accepted -> Provisioned -> AwaitingName -> Active -> Closing -> Closed
//!                  |               |                      ^
//!                  +---------------+----------------------+  (read error / EOF / idle)
//! ```
//!
//! A session provisions its key pair, registers, negotiates a display name,
//! then relays every line it reads until `STOP`, EOF, a read error or the
//! idle watchdog fires. Only `STOP` produces a departure notice.

use super::message_types::{ClientLine, USERNAME_PROMPT};
use super::writer::run_writer;
use super::{Outbound, UserId};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, ReadHalf};
use tokio::sync::mpsc::channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Provisioned,
    AwaitingName,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Accepted, Provisioned)
                | (Provisioned, AwaitingName)
                | (AwaitingName, Active)
                | (Provisioned | AwaitingName | Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent `STOP`
    Stopped,
    /// EOF or transport read error
    Disconnected,
    /// Idle watchdog fired
    TimedOut,
}

impl SessionEnd {
    fn from_read_error(err: &AppError) -> Self {
        match err {
            AppError::IdleTimeout(_) => SessionEnd::TimedOut,
            _ => SessionEnd::Disconnected,
        }
    }
}

struct ConnectionSession<S> {
    app: AppState,
    reader: BufReader<ReadHalf<S>>,
    outbound: Option<Outbound>,
    user_id: UserId,
    name: String,
    state: SessionState,
    peer: String,
}

/// Run one client connection to completion.
///
/// Returns `Err` only when the connection never got registered (key
/// generation failed). Everything after registration ends in `Ok`.
pub async fn run_session<S>(app: AppState, stream: S, peer: String) -> AppResult<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let provisioner = app.provisioner.clone();
    let keys = tokio::task::spawn_blocking(move || provisioner.generate())
        .await
        .map_err(|e| AppError::KeyGeneration(format!("key generation task failed: {e}")))?
        .map_err(|e| {
            tracing::warn!(%peer, error = %e, "aborting connection before registration");
            AppError::from(e)
        })?;

    let (read_half, write_half) = tokio::io::split(stream);
    let (outbound, queue) = channel(app.config.outbound_capacity);
    let user = app.registry.register(keys, outbound.clone()).await;
    let writer = tokio::spawn(run_writer(
        write_half,
        queue,
        user.id,
        app.config.write_timeout,
    ));

    tracing::info!(%peer, user_id = %user.id, "client connected");

    let mut session = ConnectionSession {
        app,
        reader: BufReader::new(read_half),
        outbound: Some(outbound),
        user_id: user.id,
        name: user.name,
        state: SessionState::Accepted,
        peer,
    };
    session.transition(SessionState::Provisioned);

    let end = session.drive().await;
    session.close().await;

    if let Err(e) = writer.await {
        tracing::warn!(user_id = %session.user_id, error = %e, "writer task panicked");
    }

    tracing::info!(
        peer = %session.peer,
        user_id = %session.user_id,
        name = %session.name,
        reason = ?end,
        "client disconnected"
    );
    Ok(end)
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(user_id = %self.user_id, from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }

    async fn drive(&mut self) -> SessionEnd {
        if let Err(e) = self.handshake().await {
            tracing::debug!(user_id = %self.user_id, error = %e, "handshake aborted");
            return SessionEnd::from_read_error(&e);
        }
        self.message_loop().await
    }

    async fn handshake(&mut self) -> AppResult<()> {
        self.transition(SessionState::AwaitingName);
        self.send_own(USERNAME_PROMPT.to_string()).await;

        let line = self
            .read_line()
            .await?
            .ok_or_else(|| AppError::TransportRead("closed during handshake".into()))?;

        if let Some(name) = self.app.registry.rename(self.user_id, &line).await {
            self.name = name;
        }
        if !self.app.registry.mark_joined(self.user_id).await {
            tracing::debug!(user_id = %self.user_id, "user left the registry before joining");
        }
        self.transition(SessionState::Active);

        let formatter = self.app.formatter();
        for member in self.app.registry.snapshot().await {
            if member.user.id == self.user_id {
                continue;
            }
            let encoded = member.user.keys.encoded_modulus();
            self.send_own(formatter.public_key(&member.user.name, &encoded))
                .await;
        }

        self.app
            .router
            .announce(Some(self.user_id), &formatter.join_notice(&self.name))
            .await;

        tracing::info!(user_id = %self.user_id, name = %self.name, "client joined");
        Ok(())
    }

    async fn message_loop(&mut self) -> SessionEnd {
        loop {
            let line = match self.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::Disconnected,
                Err(e) => {
                    tracing::info!(user_id = %self.user_id, error = %e, "closing session");
                    return SessionEnd::from_read_error(&e);
                }
            };

            match ClientLine::parse(&line) {
                ClientLine::Stop => {
                    self.transition(SessionState::Closing);
                    let remaining = match self.app.registry.remove(self.user_id).await {
                        Some(remaining) => remaining,
                        None => self.app.registry.len().await,
                    };
                    let notice = self.app.formatter().departure_notice(&self.name, remaining);
                    self.app.router.announce(Some(self.user_id), &notice).await;
                    return SessionEnd::Stopped;
                }
                ClientLine::Message(text) => {
                    self.app.router.deliver(self.user_id, &self.name, &text).await;
                }
            }
        }
    }

    /// Closing -> Closed: leave the registry and release the transport
    async fn close(&mut self) {
        if self.state != SessionState::Closing {
            self.transition(SessionState::Closing);
        }
        self.app.registry.remove(self.user_id).await;
        // last sender gone: the writer drains what is queued, then shuts down
        self.outbound.take();
        self.transition(SessionState::Closed);
    }

    /// Queue a line for this session's own client, waiting for room
    async fn send_own(&self, line: String) {
        if let Some(outbound) = &self.outbound {
            if outbound.send(line).await.is_err() {
                tracing::debug!(user_id = %self.user_id, "own outbound queue closed");
            }
        }
    }

    /// Next line from the client, `None` on EOF
    async fn read_line(&mut self) -> AppResult<Option<String>> {
        let mut buf = String::new();
        let read = self.reader.read_line(&mut buf);

        let n = match self.app.config.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| AppError::IdleTimeout(limit))?,
            None => read.await,
        }
        .map_err(|e| AppError::TransportRead(e.to_string()))?;

        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }
}
