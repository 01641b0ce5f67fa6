//! Per-connection reader and writer.
//!
//! The reader decodes frames, enforces the rate limit and strike count,
//! answers pings, and turns everything else into [`ClientEvent`]s for the
//! coordinator. The writer drains the connection's [`Outbox`].

use crate::broadcast::{Outbound, Outbox};
use crate::coordinator::ClientEvent;
use crate::error::ServerError;
use crate::rate_limit::{RateDecision, TokenBucket};
use crate::server::ServerConfig;
use crate::session::Session;
use broadside_core::{parse_placement, Coord, HandleId};
use broadside_protocol::{
    ChatLine, ChecksumKind, Command, Decoder, Encoder, ErrorBody, ErrorCode, Packet, PacketType,
    ProtocolError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

/// How long the writer may take to flush after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the reader keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Serves one accepted transport until it closes.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    events: mpsc::Sender<ClientEvent>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let outbox = Arc::new(Outbox::new(config.outbox_capacity));
    let (reply_tx, reply_rx) = oneshot::channel();
    events
        .send(ClientEvent::Admit {
            addr,
            outbox: outbox.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| ServerError::ShuttingDown)?;

    let handle = match reply_rx.await {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => {
            tracing::warn!("[{}] Rejected: {}", addr, e);
            let mut encoder = Encoder::new(config.checksum);
            let body = ErrorBody::new(e.error_code(), e.to_string());
            let frame = encoder.encode_json(PacketType::Error, &body)?;
            stream.write_all(&frame).await?;
            let _ = stream.shutdown().await;
            return Err(e.into());
        }
        Err(_) => return Err(ServerError::ShuttingDown),
    };
    tracing::info!("Client connected: {} as {}", addr, handle);

    let (mut reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_loop(writer, outbox.clone(), config.checksum));

    let mut conn = Connection {
        session: Session::new(handle, addr),
        bucket: TokenBucket::new(config.rate_limit, Instant::now()),
        outbox: outbox.clone(),
        events: events.clone(),
        config,
    };
    let mut decoder = Decoder::new(conn.config.checksum);
    let mut buf = [0u8; 4096];

    let result = 'conn: loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        tracing::debug!("[{}] Connection closed by client", addr);
                        break 'conn Ok(());
                    }
                    Ok(n) => {
                        tracing::debug!("[{}] Received {} bytes", addr, n);
                        decoder.extend(&buf[..n]);
                    }
                    Err(e) => {
                        tracing::debug!("[{}] Read error: {}", addr, e);
                        break 'conn Err(ServerError::Io(e));
                    }
                }
            }

            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", addr);
                break 'conn Err(ServerError::ShuttingDown);
            }
        }

        loop {
            let decoded = match decoder.decode_packet() {
                Ok(Some(packet)) => Ok(packet),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            match conn.on_frame(decoded).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break 'conn Ok(()),
                Err(e) => break 'conn Err(e),
            }
        }
    };

    // Late coordinator pushes to a closed outbox are dropped.
    let _ = events.send(ClientEvent::Disconnected { handle }).await;
    outbox.close();
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await {
        Ok(Ok(Err(e))) => tracing::debug!("[{}] Writer error: {}", addr, e),
        Err(_) => tracing::debug!("[{}] Writer did not drain in time", addr),
        _ => {}
    }
    tracing::debug!(
        "[{}] {} closed after {} frames, {:?} (last frame {:?} ago)",
        addr,
        handle,
        conn.session.frame_count(),
        conn.session.age(),
        conn.session.idle_duration()
    );

    result
}

/// Writes queued packets until the outbox is closed and empty.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    outbox: Arc<Outbox>,
    checksum: ChecksumKind,
) -> Result<(), ServerError> {
    let mut encoder = Encoder::new(checksum);
    while let Some(packet) = outbox.recv().await {
        let frame = encoder.encode(packet.packet_type, packet.payload)?;
        writer.write_all(&frame).await?;
    }
    writer.shutdown().await?;
    Ok(())
}

struct Connection {
    session: Session,
    bucket: TokenBucket,
    outbox: Arc<Outbox>,
    events: mpsc::Sender<ClientEvent>,
    config: ServerConfig,
}

impl Connection {
    fn handle(&self) -> HandleId {
        self.session.handle
    }

    fn reply_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.outbox.push(Outbound::error(code, message));
    }

    fn reject(&self, err: impl Into<ServerError>) {
        let err = err.into();
        tracing::debug!("[{}] Rejected request: {}", self.session.remote_addr, err);
        self.reply_error(err.error_code(), err.to_string());
    }

    async fn forward(&self, event: ClientEvent) -> Result<(), ServerError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ServerError::ShuttingDown)
    }

    async fn on_frame(
        &mut self,
        decoded: Result<Packet, ProtocolError>,
    ) -> Result<Flow, ServerError> {
        let addr = self.session.remote_addr;
        let packet = match decoded {
            Ok(packet) => packet,
            Err(e) if e.is_recoverable() => {
                let strikes = self.session.record_strike();
                tracing::warn!(
                    "[{}] Bad frame ({} of {}): {}",
                    addr,
                    strikes,
                    self.config.max_strikes,
                    e
                );
                self.reply_error(e.error_code(), e.to_string());
                if strikes >= self.config.max_strikes {
                    tracing::warn!("[{}] Too many bad frames, closing", addr);
                    return Ok(Flow::Close);
                }
                return Ok(Flow::Continue);
            }
            Err(e) => {
                tracing::warn!("[{}] Fatal frame error: {}", addr, e);
                self.reply_error(e.error_code(), e.to_string());
                return Err(e.into());
            }
        };

        self.session.record_frame();
        tracing::debug!(
            "[{}] {} seq={} ({} bytes)",
            addr,
            packet.packet_type,
            packet.sequence,
            packet.payload.len()
        );

        if packet.packet_type == PacketType::Ping {
            self.outbox
                .push(Outbound::new(PacketType::Pong, packet.payload.clone()));
            return Ok(Flow::Continue);
        }

        if let RateDecision::Dropped { consecutive } = self.bucket.try_acquire(Instant::now()) {
            if consecutive > self.config.rate_limit_hard_cap {
                tracing::warn!("[{}] Rate limit abuse, closing", addr);
                return Err(ServerError::RateLimited);
            }
            tracing::warn!("[{}] Rate limited ({} in a row)", addr, consecutive);
            self.reject(ServerError::RateLimited);
            return Ok(Flow::Continue);
        }

        self.route(packet).await
    }

    async fn route(&mut self, packet: Packet) -> Result<Flow, ServerError> {
        let handle = self.handle();
        let text = match packet.text() {
            Ok(text) => text,
            Err(e) => {
                self.reject(e);
                return Ok(Flow::Continue);
            }
        };

        match packet.packet_type {
            PacketType::Place => match parse_placement(text) {
                Ok((origin, orientation)) => {
                    self.forward(ClientEvent::Place {
                        handle,
                        origin,
                        orientation,
                    })
                    .await?
                }
                Err(e) => self.reject(e),
            },
            PacketType::Fire => match text.trim().parse::<Coord>() {
                Ok(coord) => {
                    self.forward(ClientEvent::Fire {
                        handle,
                        coord,
                        seq: packet.sequence,
                    })
                    .await?
                }
                Err(e) => self.reject(e),
            },
            PacketType::Chat => match ChatLine::parse(text) {
                Ok(ChatLine::Say(text)) => self.forward(ClientEvent::Chat { handle, text }).await?,
                Ok(ChatLine::Command(Command::Quit)) => return self.quit().await,
                Ok(ChatLine::Command(command)) => {
                    self.forward(ClientEvent::Command { handle, command }).await?
                }
                Err(e) => self.reject(e),
            },
            PacketType::Status => {
                self.forward(ClientEvent::Command {
                    handle,
                    command: Command::Status,
                })
                .await?
            }
            PacketType::Quit => return self.quit().await,
            PacketType::Ping => {}
            PacketType::Result | PacketType::Pong | PacketType::Error => {
                self.reject(ServerError::InvalidRequest(format!(
                    "{} packets are sent by the server",
                    packet.packet_type
                )));
            }
        }
        Ok(Flow::Continue)
    }

    async fn quit(&self) -> Result<Flow, ServerError> {
        tracing::info!("[{}] {} quit", self.session.remote_addr, self.handle());
        self.forward(ClientEvent::Quit {
            handle: self.handle(),
        })
        .await?;
        Ok(Flow::Close)
    }
}
