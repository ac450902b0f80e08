//! Server network layer handling TCP connections and the tick loop

use crate::coordinator::SessionCoordinator;
use crate::registry::ClientId;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Messages sent from connection tasks to the control loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        client: ClientId,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
    },
    Line {
        client: ClientId,
        line: String,
    },
    Disconnected {
        client: ClientId,
    },
}

/// Converts a tick rate in Hz into the loop period
pub fn tick_period(tick_rate: u32) -> Duration {
    Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32)
}

/// Accepts connections and drives the session coordinator
///
/// Socket I/O lives in per-connection tasks; everything that touches session
/// state runs on the single control loop in [`Server::run`].
pub struct Server {
    listener: TcpListener,
    coordinator: SessionCoordinator,
    tick_duration: Duration,
}

impl Server {
    pub async fn bind(
        addr: &str,
        coordinator: SessionCoordinator,
        tick_duration: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            coordinator,
            tick_duration,
        })
    }

    /// Address the listener is bound to, useful after binding port 0
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Main loop: every tick drains all pending network events, then
    /// advances the session exactly once
    ///
    /// Returns only if the listener fails; the listening socket is closed
    /// before the error is handed back.
    pub async fn run(self) -> io::Result<()> {
        let Server {
            listener,
            mut coordinator,
            tick_duration,
        } = self;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut acceptor = tokio::spawn(accept_loop(listener, events_tx));

        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                result = &mut acceptor => {
                    error!("Closing the listening socket");
                    return match result {
                        Ok(result) => result,
                        Err(e) => Err(io::Error::other(e)),
                    };
                },

                _ = tick_interval.tick() => {
                    drain_events(&mut coordinator, &mut events_rx);
                    coordinator.tick();
                },
            }
        }
    }
}

/// Applies every event queued since the last tick, in arrival order
pub fn drain_events(
    coordinator: &mut SessionCoordinator,
    events: &mut mpsc::UnboundedReceiver<NetworkEvent>,
) {
    loop {
        match events.try_recv() {
            Ok(event) => dispatch_event(coordinator, event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

/// Applies a single network event to the coordinator
///
/// Blank lines are dropped here; every other line is split into its
/// command word and argument string.
pub fn dispatch_event(coordinator: &mut SessionCoordinator, event: NetworkEvent) {
    match event {
        NetworkEvent::Connected {
            client,
            addr,
            sender,
        } => {
            info!("Client {} connected from {}", client, addr);
            coordinator.connect(client, sender);
        }
        NetworkEvent::Line { client, line } => {
            if let Some((cmd, args)) = shared::split_line(&line) {
                coordinator.handle_from(client, cmd, args);
            }
        }
        NetworkEvent::Disconnected { client } => {
            info!("Client {} disconnected", client);
            coordinator.disconnect(client);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<NetworkEvent>,
) -> io::Result<()> {
    let mut next_id = 1;

    loop {
        let (stream, addr) = listener.accept().await?;
        let client = ClientId(next_id);
        next_id += 1;

        tokio::spawn(handle_connection(stream, addr, client, events.clone()));
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    client: ClientId,
    events: mpsc::UnboundedSender<NetworkEvent>,
) {
    let (reader, writer) = stream.into_split();
    let (sender, outgoing) = mpsc::unbounded_channel();

    if events
        .send(NetworkEvent::Connected {
            client,
            addr,
            sender,
        })
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        if let Err(e) = write_lines(writer, outgoing).await {
            warn!("Write error on {}: {}", client, e);
        }
    });

    if let Err(e) = read_lines(reader, client, &events).await {
        warn!("Read error on {}: {}", client, e);
    }
    let _ = events.send(NetworkEvent::Disconnected { client });
}

/// Frames `\n`-terminated lines and forwards each one as a [`NetworkEvent::Line`]
///
/// Bytes are decoded lossily, so a client sending invalid UTF-8 gets a
/// garbled command rather than a dropped connection. Returns on EOF.
pub async fn read_lines<R>(
    reader: R,
    client: ClientId,
    events: &mpsc::UnboundedSender<NetworkEvent>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let read = reader.read_until(b'\n', &mut buffer).await?;
        if read == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        debug!("> {} {:?}", client, line);

        if events.send(NetworkEvent::Line { client, line }).is_err() {
            return Ok(());
        }
    }
}

/// Writes queued lines to the socket until the coordinator drops the sender
pub async fn write_lines<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outgoing.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}
