//! Per-connection SSH session handler.
//!
//! One handler instance lives for the lifetime of a connection; russh invokes
//! its callbacks sequentially, so the per-channel state machine (pty → shell,
//! or exec) is mutated without any locking. Every password attempt and every
//! command is published to the event bus before any accept/reject decision is
//! made; recording always happens.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus;
use crate::event::{Event, SERVICE_SSH};
use crate::policy::AuthPolicy;
use crate::server::terminal::Terminal;
use crate::shell::RestrictedShell;

/// Per-channel state; request handlers mutate it sequentially.
#[derive(Debug, Default)]
struct ChannelState {
    terminal: Option<Terminal>,
    shell: RestrictedShell,
    shell_running: bool,
}

/// Handler for a single accepted SSH connection.
pub struct SessionHandler {
    /// Remote peer as `host:port`; command events carry this form.
    remote: String,
    /// Bare host of the remote peer; auth events carry this form.
    host: String,
    tx: mpsc::Sender<Event>,
    policy: Arc<AuthPolicy>,
    prompt: String,
    attempts: u32,
    channels: HashMap<ChannelId, ChannelState>,
}

impl SessionHandler {
    pub fn new(
        peer: SocketAddr,
        tx: mpsc::Sender<Event>,
        policy: Arc<AuthPolicy>,
        prompt: String,
    ) -> Self {
        Self {
            remote: peer.to_string(),
            host: peer.ip().to_string(),
            tx,
            policy,
            prompt,
            attempts: 0,
            channels: HashMap::new(),
        }
    }
}

impl Handler for SessionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.attempts += 1;
        info!(remote = %self.remote, user, "password authentication attempt");

        bus::publish(
            &self.tx,
            Event::new(SERVICE_SSH)
                .with_remote(self.host.clone())
                .with_auth(user, password),
        )
        .await;

        if self.policy.allows(user, password) {
            info!(remote = %self.remote, user, "authentication accepted");
            return Ok(Auth::Accept);
        }

        if self.attempts >= self.policy.max_retry {
            debug!(remote = %self.remote, "authentication attempt limit reached");
            return Err(russh::Error::Disconnect);
        }

        debug!(remote = %self.remote, user, "authentication rejected");
        Ok(Auth::reject())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(remote = %self.remote, channel = %channel.id(), "session channel opened");
        self.channels.insert(channel.id(), ChannelState::default());
        Ok(true)
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(remote = %self.remote, %channel, "channel closed");
        self.channels.remove(&channel);
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(remote = %self.remote, %channel, variable = variable_name, "env request ignored");
        session.channel_success(channel)?;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(remote = %self.remote, %channel, subsystem = name, "subsystem request refused");
        session.channel_failure(channel)?;
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(
            remote = %self.remote, %channel, term,
            cols = col_width, rows = row_height, "pty request"
        );
        let prompt = self.prompt.clone();
        if let Some(state) = self.channels.get_mut(&channel) {
            state.terminal = Some(Terminal::new(prompt));
        }
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(state) = self.channels.get_mut(&channel) else {
            session.channel_failure(channel)?;
            return Ok(());
        };

        match &state.terminal {
            None => {
                // A shell with no pty behind it would have no line discipline
                // to run on; treat the request as malformed.
                warn!(remote = %self.remote, %channel, "shell request without pty refused");
                session.channel_failure(channel)?;
            }
            Some(terminal) => {
                info!(remote = %self.remote, %channel, "shell session started");
                let greeting = CryptoVec::from(terminal.prompt().as_bytes());
                state.shell_running = true;
                session.channel_success(channel)?;
                session.data(channel, greeting)?;
            }
        }
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        info!(remote = %self.remote, command = %command, "exec request");

        bus::publish(
            &self.tx,
            Event::new(SERVICE_SSH)
                .with_remote(self.remote.clone())
                .with_command(command.clone()),
        )
        .await;

        let response = RestrictedShell::new().exec(&command);

        session.channel_success(channel)?;
        session.data(channel, CryptoVec::from(format!("{response}\n").into_bytes()))?;
        session.exit_status_request(channel, 0)?;
        session.eof(channel)?;
        session.close(channel)?;
        self.channels.remove(&channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Self {
            channels,
            tx,
            remote,
            ..
        } = self;
        let Some(state) = channels.get_mut(&channel) else {
            return Ok(());
        };
        let ChannelState {
            terminal,
            shell,
            shell_running,
        } = state;
        if !*shell_running {
            return Ok(());
        }
        let Some(terminal) = terminal.as_mut() else {
            return Ok(());
        };

        let feed = terminal.feed(data);
        if !feed.echo.is_empty() {
            session.data(channel, CryptoVec::from(feed.echo))?;
        }

        for line in feed.lines {
            if line.trim().is_empty() {
                session.data(channel, CryptoVec::from(terminal.prompt().as_bytes()))?;
                continue;
            }

            info!(remote = %remote, command = %line, "shell command");
            bus::publish(
                tx,
                Event::new(SERVICE_SSH)
                    .with_remote(remote.clone())
                    .with_command(line.clone()),
            )
            .await;

            let output = shell.exec(&line);
            let mut reply = String::new();
            if !output.is_empty() {
                reply.push_str(&output.replace('\n', "\r\n"));
                reply.push_str("\r\n");
            }

            if shell.exited() {
                session.data(channel, CryptoVec::from(reply.into_bytes()))?;
                session.eof(channel)?;
                session.close(channel)?;
                return Ok(());
            }

            reply.push_str(terminal.prompt());
            session.data(channel, CryptoVec::from(reply.into_bytes()))?;
        }

        if feed.eof {
            session.data(channel, CryptoVec::from("logout\r\n".as_bytes()))?;
            session.eof(channel)?;
            session.close(channel)?;
        }

        Ok(())
    }
}
