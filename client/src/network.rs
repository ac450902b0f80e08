use crate::sync::SyncClient;
use log::{debug, info, warn};
use shared::{ClientCommand, ServerMessage};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local input ran out and `LOGOUT` was sent
    LoggedOut,
    /// The server closed the connection
    ServerClosed,
}

/// A logged-in session with the server
///
/// Owns the sync state so resources fetched during one run stay cached
/// for inspection after it ends.
pub struct Client {
    name: String,
    sync: SyncClient,
}

impl Client {
    /// Creates a client that will log in as `name`
    pub fn new(name: &str, sync: SyncClient) -> Self {
        Self {
            name: name.to_string(),
            sync,
        }
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    /// Connects to the server and runs a session with stdin as player input
    pub async fn connect_and_run(&mut self, server_addr: &str) -> io::Result<SessionEnd> {
        info!("Connecting to {}...", server_addr);
        let stream = TcpStream::connect(server_addr).await?;
        let (reader, writer) = stream.into_split();

        self.run(reader, writer, tokio::io::stdin()).await
    }

    /// Logs in, then answers server messages and forwards each input line
    /// as a `GAME` command until either side runs out
    pub async fn run<R, W, I>(&mut self, reader: R, mut writer: W, input: I) -> io::Result<SessionEnd>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        I: AsyncRead + Unpin,
    {
        let mut server_lines = BufReader::new(reader).lines();
        let mut input_lines = BufReader::new(input).lines();

        send(
            &mut writer,
            &ClientCommand::Login {
                name: self.name.clone(),
            },
        )
        .await?;

        loop {
            tokio::select! {
                line = server_lines.next_line() => {
                    let Some(line) = line? else {
                        info!("Server closed the connection");
                        return Ok(SessionEnd::ServerClosed);
                    };
                    debug!("< {}", line);
                    match line.parse::<ServerMessage>() {
                        Ok(message) => {
                            for command in self.sync.handle(message) {
                                send(&mut writer, &command).await?;
                            }
                        }
                        Err(e) => warn!("Unreadable server line {:?}: {}", line, e),
                    }
                },

                text = input_lines.next_line() => {
                    match text? {
                        Some(text) if text.trim().is_empty() => {}
                        Some(text) => {
                            send(&mut writer, &ClientCommand::Game { payload: text }).await?;
                        }
                        None => {
                            send(&mut writer, &ClientCommand::Logout).await?;
                            writer.shutdown().await?;
                            return Ok(SessionEnd::LoggedOut);
                        }
                    }
                },
            }
        }
    }
}

async fn send<W>(writer: &mut W, command: &ClientCommand) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("> {}", command);
    writer.write_all(format!("{}\n", command).as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourceCache;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_session_syncs_then_logs_out() {
        let data = b"#####".to_vec();
        let digest = shared::digest(&data);
        let server_script = format!(
            "OK\nLOAD maze\nREQUIRE maze map.txt {digest}\nSYNC maze\nWRITE maze map.txt {}\nSYNC maze\n",
            shared::encode_payload(&data)
        );

        let reader = Builder::new()
            .read(server_script.as_bytes())
            .wait(Duration::from_secs(5))
            .build();
        let writer = Builder::new()
            .write(b"LOGIN alice\n")
            .write(b"GET maze map.txt\n")
            .write(b"STATUS wait requirement\n")
            .write(b"STATUS ready\n")
            .write(b"LOGOUT\n")
            .build();
        let input = Builder::new().wait(Duration::from_millis(200)).build();

        let mut client = Client::new("alice", SyncClient::new(ResourceCache::in_memory()));
        let end = client.run(reader, writer, input).await.unwrap();

        assert_eq!(end, SessionEnd::LoggedOut);
        assert_eq!(client.sync().cache().get("maze", "map.txt"), Some(&data[..]));
    }

    #[tokio::test]
    async fn test_session_ends_when_server_closes() {
        let reader = Builder::new().read(b"NOTIFY bye\n").build();
        let writer = Builder::new().write(b"LOGIN alice\n").build();
        let input = Builder::new().wait(Duration::from_secs(5)).build();

        let mut client = Client::new("alice", SyncClient::new(ResourceCache::in_memory()));
        let end = client.run(reader, writer, input).await.unwrap();

        assert_eq!(end, SessionEnd::ServerClosed);
    }

    #[tokio::test]
    async fn test_input_lines_become_game_commands() {
        let reader = Builder::new().wait(Duration::from_secs(5)).build();
        let writer = Builder::new()
            .write(b"LOGIN alice\n")
            .write(b"GAME vote maze\n")
            .write(b"LOGOUT\n")
            .build();
        let input = Builder::new().read(b"vote maze\n\n").build();

        let mut client = Client::new("alice", SyncClient::new(ResourceCache::in_memory()));
        let end = client.run(reader, writer, input).await.unwrap();

        assert_eq!(end, SessionEnd::LoggedOut);
    }
}
