//! Teardown, reconnect and the process-exit hook.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use super::Client;
use crate::error::{ConnectError, HandshakeError, ShutdownError};
use crate::event::Event;
use crate::state::ConnectionState;

/// How long shutdown waits for an aborted consumer task to wind down.
const READER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Client::shutdown`] as a boxed future, for tasks spawned by the client itself.
fn boxed_shutdown(
    client: Client,
    no_reconnect: bool,
) -> BoxFuture<'static, Result<(), ShutdownError>> {
    Box::pin(async move { client.shutdown(no_reconnect).await })
}

/// Teardown after connection `generation` was lost under the consumer task.
///
/// Fails with [`ShutdownError::AlreadyInProgress`] when the guard is held;
/// the request is then carried out by whoever releases the guard. A lost
/// connection that is no longer current is left alone.
pub(crate) fn boxed_lost_link(
    client: Client,
    generation: u64,
) -> BoxFuture<'static, Result<(), ShutdownError>> {
    Box::pin(async move {
        if client.inner.generation.load(Ordering::Acquire) != generation {
            debug!(generation, "stale connection, nothing to tear down");
            return Ok(());
        }
        if !client.inner.guard.begin_or_defer(generation) {
            return Err(ShutdownError::AlreadyInProgress);
        }
        if client.inner.generation.load(Ordering::Acquire) != generation {
            // replaced between the check and the claim
            client.rearm_shutdown();
            return Ok(());
        }
        client.teardown(false).await
    })
}

/// Send `QUIT` and shut down when the process is interrupted.
///
/// The hook holds only a weak reference, so it never keeps a client alive.
pub(super) fn install_exit_hook(client: &Client) -> JoinHandle<()> {
    let weak = Arc::downgrade(&client.inner);

    tokio::spawn(
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for interrupt, exit hook disabled");
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = Client { inner };
            if !client.is_connected() {
                return;
            }

            info!("interrupted, disconnecting");
            if let Err(e) = client.send_quit(&client.inner.config.quit_message).await {
                warn!(error = %e, "failed to send QUIT");
            }
            // shutdown aborts this task, so it has to run on its own
            tokio::spawn(async move {
                match boxed_shutdown(client, true).await {
                    Ok(()) | Err(ShutdownError::AlreadyInProgress) => {}
                    Err(e) => warn!(error = %e, "shutdown from exit hook failed"),
                }
            });
        }
        .instrument(client.span()),
    )
}

impl Client {
    /// Tear the connection down.
    ///
    /// Only the first caller proceeds; every other call fails with
    /// [`ShutdownError::AlreadyInProgress`] without touching anything. The
    /// consumer task is stopped and the transport closed on a best-effort
    /// basis. With auto-reconnect enabled and `no_reconnect` false, the
    /// client reconnects and, if configured, rejoins the channels it was in;
    /// a failed reconnect is returned as [`ShutdownError::ReconnectFailure`].
    /// The collaborators are closed at the end in every case.
    pub async fn shutdown(&self, no_reconnect: bool) -> Result<(), ShutdownError> {
        self.shutdown_inner(no_reconnect)
            .instrument(self.span())
            .await
    }

    async fn shutdown_inner(&self, no_reconnect: bool) -> Result<(), ShutdownError> {
        if !self.inner.guard.try_begin() {
            return Err(ShutdownError::AlreadyInProgress);
        }
        self.teardown(no_reconnect).await
    }

    /// The body of a shutdown whose guard is already claimed.
    async fn teardown(&self, no_reconnect: bool) -> Result<(), ShutdownError> {
        self.advance(ConnectionState::ShuttingDown);

        self.stop_tasks().await;
        self.close_transport().await;
        self.inner.logged_in.store(false, Ordering::Release);
        self.inner.tls.store(false, Ordering::Release);
        self.advance(ConnectionState::Disconnected);

        let channels = self.inner.collab.directory.channel_keys();

        let mut result = Ok(());
        let mut reconnected = false;
        if self.auto_reconnect() && !no_reconnect {
            match self.reconnect_inner(true).await {
                Ok(()) => {
                    reconnected = true;
                    if self.auto_reconnect_channels() {
                        for (channel, key) in &channels {
                            if let Err(e) = self.send_join(channel, key).await {
                                warn!(%channel, error = %e, "failed to rejoin");
                            }
                        }
                    }
                }
                Err(e) => result = Err(ShutdownError::ReconnectFailure(e)),
            }
        } else {
            self.dispatch(Event::Disconnect);
            debug!("disconnected");
        }

        let collab = &self.inner.collab;
        collab.events.shutdown();
        collab.directory.close();
        collab.interpreter.close();
        collab.side_channel.close();

        if reconnected {
            self.rearm_shutdown();
        } else {
            self.inner.guard.finish();
        }
        result
    }

    /// Stop the exit hook and the consumer task.
    ///
    /// The consumer is stopped by closing the transport under it: its pending
    /// read fails and it exits on its own. It is aborted only if it does not
    /// finish in time.
    async fn stop_tasks(&self) {
        if let Some(hook) = self.inner.exit_hook.lock().take() {
            hook.abort();
        }
        if let Some(closer) = self.inner.closer.lock().take() {
            closer.cancel();
        }

        let reader = self.inner.reader_task.lock().take();
        if let Some(mut reader) = reader {
            match tokio::time::timeout(READER_STOP_TIMEOUT, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!(error = %e, "consumer task failed"),
                Err(_) => {
                    warn!("consumer task did not stop in time, aborting");
                    reader.abort();
                }
            }
        }
    }

    /// Flush and shut down the write half of the socket.
    async fn close_transport(&self) {
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                warn!(error = %e, "cannot close connection");
            }
        }
    }

    /// Connect again with the same configuration.
    ///
    /// Fails with a precondition error if this client never tried to connect.
    /// Dispatches [`Event::Reconnect`] with the outcome.
    pub async fn reconnect(&self) -> Result<(), ConnectError> {
        self.reconnect_inner(false).instrument(self.span()).await
    }

    async fn reconnect_inner(&self, from_shutdown: bool) -> Result<(), ConnectError> {
        if !self.inner.attempted.load(Ordering::Acquire) {
            return Err(HandshakeError::precondition(
                "cannot reconnect to an IRC server because we were never connected to one previously",
            )
            .into());
        }
        if !from_shutdown {
            self.inner.guard.clear_if_done();
        }

        match self.connect_inner(from_shutdown).await {
            Ok(()) => {
                info!("reconnected");
                self.dispatch(Event::Reconnect {
                    success: true,
                    cause: None,
                });
                Ok(())
            }
            Err(e) => {
                self.dispatch(Event::Reconnect {
                    success: false,
                    cause: Some(e.cause().to_string()),
                });
                Err(e)
            }
        }
    }
}
