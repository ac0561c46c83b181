//! Remote-command channel to game servers, spoken as the Source RCON protocol over TCP.
//!
//! Every packet is `size:i32le | id:i32le | type:i32le | body | 0x00 0x00`, where `size` counts
//! everything after itself. Authentication sends the shared secret as an `AUTH` packet; the server
//! answers with an `AUTH_RESPONSE` whose id echoes the request, or `-1` when the secret is wrong.

use std::{io, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::debug;

use crate::config::HandoffConfig;

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;
/// Smallest legal size: id + type + two terminators.
const MIN_PACKET_SIZE: i32 = 10;
const MAX_PACKET_SIZE: i32 = 64 * 1024;
const AUTH_REQUEST_ID: i32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connecting to {addr} timed out")]
    ConnectTimeout { addr: String },
    #[error("remote rejected the shared secret")]
    AuthRejected,
    #[error("remote-command I/O failed")]
    Io(#[from] io::Error),
    #[error("`{command}` got no response in time")]
    Timeout { command: String },
    #[error("malformed packet: {0}")]
    Protocol(String),
    #[error("refusing to send command argument `{0}`")]
    InvalidArgument(String),
}

impl RemoteError {
    /// Whether a fresh connection may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            RemoteError::AuthRejected | RemoteError::InvalidArgument(_)
        )
    }
}

/// The fixed vocabulary sent to game servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Ask the match plugin to download and load a configuration.
    LoadMatchUrl(String),
}

impl RemoteCommand {
    /// Command line as typed into the server console.
    pub fn render(&self) -> Result<String, RemoteError> {
        match self {
            RemoteCommand::LoadMatchUrl(url) => {
                ensure_plain_argument(url)?;
                Ok(format!("matchzy_loadmatch_url \"{url}\""))
            }
        }
    }
}

fn ensure_plain_argument(value: &str) -> Result<(), RemoteError> {
    let forbidden = |c: char| matches!(c, '"' | ';' | '\n' | '\r' | '\0');
    if value.is_empty() || value.chars().any(forbidden) {
        return Err(RemoteError::InvalidArgument(value.to_owned()));
    }
    Ok(())
}

/// An authenticated remote-command connection.
pub trait RemoteSession: Send {
    /// Send one command and wait for its response body.
    fn execute(&mut self, command: RemoteCommand) -> BoxFuture<'_, Result<String, RemoteError>>;
}

/// Opens authenticated sessions to game servers.
pub trait RemoteConnector: Send + Sync {
    fn connect(
        &self,
        host: String,
        port: u16,
        secret: String,
    ) -> BoxFuture<'static, Result<Box<dyn RemoteSession>, RemoteError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

impl Packet {
    fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = (body.len() + MIN_PACKET_SIZE as usize) as i32;
        let mut buf = Vec::with_capacity(body.len() + 14);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    async fn read_from<R>(reader: &mut R) -> Result<Self, RemoteError>
    where
        R: AsyncRead + Unpin,
    {
        let size = reader.read_i32_le().await?;
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(RemoteError::Protocol(format!("packet size {size}")));
        }

        let mut payload = vec![0u8; size as usize];
        reader.read_exact(&mut payload).await?;

        let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body_bytes = &payload[8..payload.len() - 2];
        let body = String::from_utf8_lossy(body_bytes)
            .trim_end_matches('\0')
            .to_owned();

        Ok(Self { id, kind, body })
    }
}

/// Connector speaking Source RCON over plain TCP.
#[derive(Debug, Clone)]
pub struct SourceRconConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SourceRconConnector {
    pub fn new(config: &HandoffConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
        }
    }
}

impl RemoteConnector for SourceRconConnector {
    fn connect(
        &self,
        host: String,
        port: u16,
        secret: String,
    ) -> BoxFuture<'static, Result<Box<dyn RemoteSession>, RemoteError>> {
        let connect_timeout = self.connect_timeout;
        let command_timeout = self.command_timeout;
        Box::pin(async move {
            let addr = format!("{host}:{port}");
            let stream = timeout(connect_timeout, TcpStream::connect((host.as_str(), port)))
                .await
                .map_err(|_| RemoteError::ConnectTimeout { addr: addr.clone() })?
                .map_err(|source| RemoteError::Connect {
                    addr: addr.clone(),
                    source,
                })?;

            let mut session = SourceRconSession {
                stream,
                next_id: AUTH_REQUEST_ID + 1,
                command_timeout,
            };

            timeout(command_timeout, session.authenticate(&secret))
                .await
                .map_err(|_| RemoteError::Timeout {
                    command: "auth".to_owned(),
                })??;

            debug!(%addr, "remote-command session authenticated");
            Ok(Box::new(session) as Box<dyn RemoteSession>)
        })
    }
}

struct SourceRconSession {
    stream: TcpStream,
    next_id: i32,
    command_timeout: Duration,
}

impl SourceRconSession {
    async fn authenticate(&mut self, secret: &str) -> Result<(), RemoteError> {
        let request = Packet::new(AUTH_REQUEST_ID, SERVERDATA_AUTH, secret);
        self.stream.write_all(&request.encode()).await?;

        // Servers send an empty RESPONSE_VALUE before the AUTH_RESPONSE; skip it.
        loop {
            let packet = Packet::read_from(&mut self.stream).await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            return match packet.id {
                -1 => Err(RemoteError::AuthRejected),
                AUTH_REQUEST_ID => Ok(()),
                other => Err(RemoteError::Protocol(format!(
                    "auth response for unknown request {other}"
                ))),
            };
        }
    }

    async fn round_trip(&mut self, line: String) -> Result<String, RemoteError> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(AUTH_REQUEST_ID + 1);

        let request = Packet::new(id, SERVERDATA_EXECCOMMAND, line);
        self.stream.write_all(&request.encode()).await?;

        loop {
            let packet = Packet::read_from(&mut self.stream).await?;
            if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
                return Ok(packet.body);
            }
        }
    }
}

impl RemoteSession for SourceRconSession {
    fn execute(&mut self, command: RemoteCommand) -> BoxFuture<'_, Result<String, RemoteError>> {
        Box::pin(async move {
            let line = command.render()?;
            let limit = self.command_timeout;
            timeout(limit, self.round_trip(line.clone()))
                .await
                .map_err(|_| RemoteError::Timeout { command: line })?
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Minimal game-server stand-in for exercising the channel end to end.

    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::{net::TcpListener, sync::Mutex};

    use super::*;

    /// Records every command line received; answers `ok` to each.
    pub struct FakeGameServer {
        pub port: u16,
        pub commands: Arc<Mutex<Vec<String>>>,
        pub connections: Arc<AtomicUsize>,
    }

    impl FakeGameServer {
        /// `reject_first` connections are refused by answering the AUTH with `-1`.
        pub async fn start(secret: &str, reject_first: usize) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let commands = Arc::new(Mutex::new(Vec::new()));
            let connections = Arc::new(AtomicUsize::new(0));

            let secret = secret.to_owned();
            let seen = commands.clone();
            let counter = connections.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let index = counter.fetch_add(1, Ordering::SeqCst);
                    let secret = secret.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let Ok(auth) = Packet::read_from(&mut stream).await else {
                            return;
                        };
                        let accepted = index >= reject_first && auth.body == secret;
                        let reply_id = if accepted { auth.id } else { -1 };
                        let _ = stream
                            .write_all(&Packet::new(auth.id, SERVERDATA_RESPONSE_VALUE, "").encode())
                            .await;
                        let _ = stream
                            .write_all(
                                &Packet::new(reply_id, SERVERDATA_AUTH_RESPONSE, "").encode(),
                            )
                            .await;
                        if !accepted {
                            return;
                        }

                        while let Ok(packet) = Packet::read_from(&mut stream).await {
                            seen.lock().await.push(packet.body.clone());
                            let reply = Packet::new(packet.id, SERVERDATA_RESPONSE_VALUE, "ok");
                            if stream.write_all(&reply.encode()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            });

            Self {
                port,
                commands,
                connections,
            }
        }
    }
}
