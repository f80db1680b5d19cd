//! Background consumer of post-registration traffic.

use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};

use super::{boxed_lost_link, Client, Inner};
use crate::error::ShutdownError;
use crate::output;
use crate::transport::LineReader;

/// Feed every line to the interpreter until the connection ends.
///
/// When nothing arrives for `idle`, the server is pinged and reading
/// continues. End of stream or a read error starts a teardown of connection
/// `generation` on a task of its own, so a dropped link goes through
/// auto-reconnect. Reads failing because the transport was closed on purpose
/// end the task quietly.
pub(super) async fn run(
    weak: Weak<Inner>,
    mut reader: LineReader,
    idle: Duration,
    generation: u64,
) {
    loop {
        let next = tokio::time::timeout(idle, reader.read_line()).await;

        let Some(inner) = weak.upgrade() else {
            debug!("client dropped, consumer exiting");
            return;
        };
        let client = Client { inner };

        match next {
            Ok(Ok(Some(line))) => client.inner.collab.interpreter.handle_line(&client, &line),
            Ok(Ok(None)) => {
                info!("server closed the connection");
                spawn_shutdown(client, generation);
                return;
            }
            Ok(Err(_)) if reader.is_closed() => {
                debug!("transport closed, consumer exiting");
                return;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "read failed");
                spawn_shutdown(client, generation);
                return;
            }
            Err(_) => {
                let token = Utc::now().timestamp().to_string();
                debug!(%token, "connection idle, pinging server");
                if let Err(e) = client.send_raw_line(output::ping(&token)).await {
                    warn!(error = %e, "failed to ping idle server");
                }
            }
        }
    }
}

pub(super) fn spawn_shutdown(client: Client, generation: u64) {
    let span = client.span();
    tokio::spawn(
        async move {
            match boxed_lost_link(client, generation).await {
                Ok(()) => {}
                Err(ShutdownError::AlreadyInProgress) => {
                    debug!(generation, "guard held, teardown left to its owner")
                }
                Err(e) => error!(error = %e, "shutdown after lost connection failed"),
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::collab::{Collaborators, LineInterpreter};
    use crate::config::Configuration;
    use parking_lot::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use crate::transport::LineChannel;

    #[derive(Default)]
    struct Record(Mutex<Vec<String>>);

    impl LineInterpreter for Record {
        fn handle_line(&self, _client: &Client, line: &str) {
            self.0.lock().push(line.to_string());
        }
    }

    #[tokio::test]
    async fn test_lines_reach_interpreter_and_idle_pings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (server_read, mut server_write) = accepted.unwrap().0.into_split();

        let record = Arc::new(Record::default());
        let client = Client::with_collaborators(
            Configuration::new("localhost", "bot"),
            Collaborators::default().with_interpreter(record.clone()),
        );
        let (reader, writer) = LineChannel::plain(stream.unwrap(), "localhost").split();
        *client.inner.writer.lock().await = Some(writer);

        let task = tokio::spawn(run(
            Arc::downgrade(&client.inner),
            reader,
            Duration::from_millis(100),
            1,
        ));

        server_write.write_all(b":nick!u@h PRIVMSG #a :hi\r\n").await.unwrap();

        let mut lines = BufReader::new(server_read).lines();
        let ping = lines.next_line().await.unwrap().unwrap();
        assert!(ping.starts_with("PING "), "{ping}");
        assert_eq!(record.0.lock().as_slice(), &[":nick!u@h PRIVMSG #a :hi".to_string()]);

        task.abort();
    }
}
