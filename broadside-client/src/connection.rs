//! Connection management.

use crate::error::ClientError;
use broadside_protocol::{ChecksumKind, Decoder, Encoder, Packet, PacketType};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size (4 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long `recv` waits for a packet.
    pub recv_timeout: Duration,
    /// Checksum trailer width; must match the server.
    pub checksum: ChecksumKind,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(5),
            checksum: ChecksumKind::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumKind) -> Self {
        self.checksum = checksum;
        self
    }
}

/// A connection to a broadside server.
pub struct Connection {
    config: ConnectionConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    encoder: Mutex<Encoder>,
    decoder: Mutex<Decoder>,
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            encoder: Mutex::new(Encoder::new(config.checksum)),
            decoder: Mutex::new(Decoder::new(config.checksum)),
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.decoder.lock().await.clear();
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends a packet and returns the sequence number it carried.
    pub async fn send(
        &self,
        packet_type: PacketType,
        payload: impl Into<Bytes>,
    ) -> Result<u32, ClientError> {
        let (sequence, frame) = {
            let mut encoder = self.encoder.lock().await;
            let sequence = encoder.next_sequence();
            (sequence, encoder.encode(packet_type, payload)?)
        };
        self.write_raw(&frame).await?;
        tracing::debug!("Sent {} seq={}", packet_type, sequence);
        Ok(sequence)
    }

    /// Sends a packet with an explicit sequence number, leaving the
    /// connection's own counter untouched. Used to resend a packet.
    pub async fn send_with_sequence(
        &self,
        sequence: u32,
        packet_type: PacketType,
        payload: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        let frame = Packet::new(sequence, packet_type, payload).encode(self.config.checksum)?;
        self.write_raw(&frame).await
    }

    /// Writes bytes to the socket as-is.
    pub async fn write_raw(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Receives the next packet, waiting up to the configured timeout.
    pub async fn recv(&self) -> Result<Packet, ClientError> {
        self.recv_timeout(self.config.recv_timeout).await
    }

    /// Receives the next packet, waiting up to `timeout`.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Packet, ClientError> {
        tokio::time::timeout(timeout, self.read_packet())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn read_packet(&self) -> Result<Packet, ClientError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];
        loop {
            if let Some(packet) = self.decoder.lock().await.decode_packet()? {
                return Ok(packet);
            }

            let n = {
                let mut reader_guard = self.reader.lock().await;
                let reader = reader_guard.as_mut().ok_or(ClientError::NotConnected)?;
                reader.read(&mut buf).await?
            };
            if n == 0 {
                tracing::debug!("Connection closed by server");
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::ConnectionClosed);
            }
            self.decoder.lock().await.extend(&buf[..n]);
        }
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();
        Ok(())
    }
}
