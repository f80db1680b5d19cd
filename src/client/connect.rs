//! Connection establishment and registration.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::rustls::ClientConfig;
use tracing::{debug, info, warn, Instrument};

use super::{reader, shutdown, Client};
use crate::error::{ConnectError, HandshakeError, Result};
use crate::event::Event;
use crate::state::{ConnectionState, HandshakeAction, HandshakeMachine};
use crate::transport::{default_client_config, LineChannel, LineReader};

/// A registered connection, ready to be handed to the consumer task.
struct Registered {
    reader: LineReader,
    nick: String,
    caps: Arc<[String]>,
}

async fn connect_addr(addr: SocketAddr, local: Option<IpAddr>) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(ip) = local {
        socket.bind(SocketAddr::new(ip, 0))?;
    }
    socket.connect(addr).await
}

impl Client {
    /// Connect to the configured server and register.
    ///
    /// Runs the whole handshake on the calling task. On success the client
    /// is [`Connected`](ConnectionState::Connected) and a background task
    /// feeds every further line to the
    /// [`LineInterpreter`](crate::LineInterpreter). Every failure is reported
    /// as one [`ConnectError`] whose [`cause`](ConnectError::cause) is the
    /// underlying [`HandshakeError`].
    pub async fn connect(&self) -> Result<()> {
        self.connect_inner(false).instrument(self.span()).await
    }

    pub(super) async fn connect_inner(&self, from_shutdown: bool) -> Result<()> {
        let _handshake = self.inner.handshake.try_lock().map_err(|_| {
            ConnectError::from(HandshakeError::precondition(
                "a connection attempt is already in progress",
            ))
        })?;
        self.check_preconditions(from_shutdown)?;
        self.inner.attempted.store(true, Ordering::Release);

        match self.establish().await {
            Ok(registered) => {
                self.start(registered, from_shutdown).await;
                Ok(())
            }
            Err(cause) => {
                if let Some(closer) = self.inner.closer.lock().take() {
                    closer.cancel();
                }
                self.inner.writer.lock().await.take();
                self.advance(ConnectionState::Disconnected);
                warn!(error = %cause, "connection attempt failed");
                Err(cause.into())
            }
        }
    }

    fn check_preconditions(&self, from_shutdown: bool) -> Result<(), HandshakeError> {
        let state = self.state();
        if state == ConnectionState::Connected {
            return Err(HandshakeError::precondition(
                "already connected to an IRC server, disconnect first",
            ));
        }
        if state.is_handshaking() {
            return Err(HandshakeError::precondition(
                "a connection attempt is already in progress",
            ));
        }
        if !from_shutdown && self.inner.guard.is_in_progress() {
            return Err(HandshakeError::precondition(
                "shutdown is in progress, wait for it to finish",
            ));
        }
        if self.inner.config.use_ident_server {
            let running = self
                .inner
                .collab
                .ident
                .as_ref()
                .is_some_and(|ident| ident.is_running());
            if !running {
                return Err(HandshakeError::precondition(
                    "use_ident_server is enabled but no ident responder is running",
                ));
            }
        }
        if let Err(reason) = self.inner.config.validate() {
            return Err(HandshakeError::precondition(reason));
        }
        Ok(())
    }

    async fn establish(&self) -> Result<Registered, HandshakeError> {
        let attempt = self.open_and_register();
        match self.inner.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
                HandshakeError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "registration did not complete in time",
                ))
            })?,
            None => attempt.await,
        }
    }

    async fn open_and_register(&self) -> Result<Registered, HandshakeError> {
        let config = &self.inner.config;

        self.advance(ConnectionState::Resolving);
        let stream = self.open_socket().await?;
        info!(host = %config.server_hostname, port = config.server_port, "connected to server");

        let mut machine = HandshakeMachine::from_config(config);
        *self.inner.enabled_caps.lock() = Arc::from(Vec::new());

        let channel = if config.use_tls {
            let tls = config.tls_config.clone().unwrap_or_else(default_client_config);
            LineChannel::tls(stream, &config.server_hostname, tls).await?
        } else {
            LineChannel::plain(stream, &config.server_hostname)
        };
        *self.inner.closer.lock() = Some(channel.close_handle());

        if let Some(ident) = &self.inner.collab.ident {
            match (channel.peer_addr(), channel.local_addr()) {
                (Ok(remote), Ok(local)) => ident.add_entry(remote, local.port(), &config.login),
                (Err(e), _) | (_, Err(e)) => warn!(error = %e, "cannot register ident entry"),
            }
        }
        self.dispatch(Event::SocketConnect);

        // from here on anyone holding the client can send, the interpreter included
        let (reader, writer) = channel.split();
        *self.inner.writer.lock().await = Some(writer);

        self.advance(ConnectionState::Registering);
        for line in machine.start() {
            self.send_raw_line(line).await?;
        }
        self.advance(machine.state());

        let reader = self.register(reader, &mut machine).await?;

        Ok(Registered {
            reader,
            nick: machine.nick().to_string(),
            caps: machine.enabled_capabilities(),
        })
    }

    /// Try every resolved address in order; the first connection wins.
    async fn open_socket(&self) -> Result<TcpStream, HandshakeError> {
        let config = &self.inner.config;
        let host = config.server_hostname.as_str();

        let addrs = lookup_host((host, config.server_port))
            .await
            .map_err(|source| HandshakeError::AddressResolution {
                host: host.to_string(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            debug!(%addr, "trying address");
            match connect_addr(addr, config.local_address).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "unable to connect, trying next address");
                    last_error = Some(e);
                }
            }
        }

        Err(HandshakeError::AddressResolution {
            host: host.to_string(),
            source: last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
            }),
        })
    }

    /// Read lines until registration completes.
    async fn register(
        &self,
        mut reader: LineReader,
        machine: &mut HandshakeMachine,
    ) -> Result<LineReader, HandshakeError> {
        loop {
            let line = reader.read_line().await?.ok_or_else(|| {
                HandshakeError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection during registration",
                ))
            })?;

            self.inner.collab.interpreter.handle_line(self, &line);

            let mut pending: VecDeque<HandshakeAction> = machine.feed(&line)?.into();
            while let Some(action) = pending.pop_front() {
                match action {
                    HandshakeAction::Send(out) => self.send_raw_line(out).await?,
                    HandshakeAction::UpgradeTransport => {
                        self.advance(ConnectionState::UpgradingTransport);
                        let tls = machine
                            .tls_config()
                            .or_else(|| self.inner.config.tls_config.clone())
                            .unwrap_or_else(default_client_config);
                        reader = self.upgrade_transport(reader, tls).await?;
                        info!("connection upgraded to TLS");
                        pending.extend(machine.finish_upgrade(&line)?);
                    }
                    HandshakeAction::Complete => return Ok(reader),
                }
            }
            self.advance(machine.state());
        }
    }

    /// Swap the transport under both halves for TLS.
    ///
    /// The writer stays locked for the whole swap, so concurrent senders
    /// wait and then go out encrypted.
    async fn upgrade_transport(
        &self,
        reader: LineReader,
        tls: Arc<ClientConfig>,
    ) -> Result<LineReader, HandshakeError> {
        let mut slot = self.inner.writer.lock().await;
        let writer = slot.take().ok_or_else(|| {
            HandshakeError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport closed during registration",
            ))
        })?;

        let channel = LineChannel::reunite(reader, writer)?
            .upgrade_to_tls(tls)
            .await?;
        let (reader, writer) = channel.split();
        *slot = Some(writer);
        Ok(reader)
    }

    /// Bring a registered connection into service.
    async fn start(&self, registered: Registered, from_shutdown: bool) {
        let Registered { reader, nick, caps } = registered;

        self.set_nick(&nick);
        self.inner.logged_in.store(true, Ordering::Release);
        self.inner.tls.store(reader.is_tls(), Ordering::Release);
        *self.inner.enabled_caps.lock() = caps;
        info!(%nick, tls = reader.is_tls(), "logged onto server");

        if self.inner.config.shutdown_hook {
            let hook = shutdown::install_exit_hook(self);
            if let Some(old) = self.inner.exit_hook.lock().replace(hook) {
                old.abort();
            }
        }

        // set before the consumer can start a teardown
        self.advance(ConnectionState::Connected);

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let task = tokio::spawn(
            reader::run(
                Arc::downgrade(&self.inner),
                reader,
                self.inner.config.socket_timeout,
                generation,
            )
            .instrument(self.span()),
        );
        if let Some(old) = self.inner.reader_task.lock().replace(task) {
            old.abort();
        }

        self.dispatch(Event::Connect);

        for (channel, key) in &self.inner.config.auto_join_channels {
            if let Err(e) = self.send_join(channel, key).await {
                warn!(%channel, error = %e, "failed to send auto-join");
            }
        }

        if !from_shutdown {
            self.rearm_shutdown();
        }
    }
}
