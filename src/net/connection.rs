// src/net/connection.rs
//
// Connection - single-writer wrapper around one TCP socket
//
// The read half goes to the owning session's reader loop as a FrameReader.
// The write half is owned by exactly one spawned writer task draining a
// bounded queue. Producers on any task enqueue fully-built frame payloads;
// the writer is the sole entity that touches the socket's output, so a frame
// can never interleave with another mid-write.
//
// The queue is bounded and enqueueing waits at most ENQUEUE_TIMEOUT before
// failing with Backpressure. That timeout is the only defense against
// unbounded memory growth behind a stalled receiver.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::wire::{self, FileChunk, FrameType, Packet, WireError};
use crate::{ENQUEUE_TIMEOUT, OUTBOUND_QUEUE_CAPACITY};

/// Failure to hand a frame to the writer task.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The outbound queue stayed full for the whole bounded wait. The peer
    /// is stalled or too slow; callers should treat the connection as
    /// unhealthy.
    #[error("outbound queue full, peer not draining")]
    Backpressure,

    #[error("connection closed")]
    Closed,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] WireError),
}

/// Read side of a connection. Owned by the session's reader task; reads
/// block until a complete frame, EOF, or error.
pub struct FrameReader {
    inner: BufReader<OwnedReadHalf>,
}

impl FrameReader {
    pub async fn read(&mut self) -> Result<(FrameType, Bytes), WireError> {
        wire::read_frame(&mut self.inner).await
    }
}

enum Outbound {
    Frame { frame_type: FrameType, payload: Bytes },
    /// Drain everything queued ahead, flush, shut the socket down.
    Shutdown,
}

/// Write side of a connection, shared by every task that needs to send to
/// this peer. Cheap to clone via `Arc`.
pub struct Connection {
    peer_addr: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    shutdown_tx: watch::Sender<bool>,
    writer: JoinHandle<()>,
    closed: AtomicBool,
}

impl Connection {
    /// Split the socket and spawn the writer task.
    pub fn spawn(stream: TcpStream) -> (Arc<Connection>, FrameReader) {
        let peer_addr = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let writer = tokio::spawn(run_writer(rx, write_half, shutdown_rx, peer_addr));

        let conn = Arc::new(Connection {
            peer_addr,
            tx,
            shutdown_tx,
            writer,
            closed: AtomicBool::new(false),
        });
        let reader = FrameReader {
            inner: BufReader::new(read_half),
        };
        (conn, reader)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue a control packet.
    pub async fn write_packet(&self, packet: &Packet) -> Result<(), SendError> {
        let payload = packet.encode()?;
        self.enqueue(FrameType::JsonPacket, payload).await
    }

    /// Enqueue a file chunk.
    pub async fn write_file_chunk(&self, chunk: &FileChunk) -> Result<(), SendError> {
        let payload = chunk.encode()?;
        self.enqueue(FrameType::FileChunk, payload).await
    }

    /// Enqueue an already-encoded chunk payload, preserving the FileChunk
    /// frame type. This is the relay path: the server never decodes the
    /// bytes it forwards.
    pub async fn write_raw_chunk(&self, payload: Bytes) -> Result<(), SendError> {
        self.enqueue(FrameType::FileChunk, payload).await
    }

    async fn enqueue(&self, frame_type: FrameType, payload: Bytes) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self
            .tx
            .send_timeout(Outbound::Frame { frame_type, payload }, ENQUEUE_TIMEOUT)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::Backpressure),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Hard close: interrupt the writer mid-queue and tear the socket down.
    /// Used when the peer is unhealthy (backpressure) or the process is
    /// shutting down. Idempotent; wakes the owning reader loop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("🔌 [NET] hard close for {}", self.peer_addr);
        let _ = self.shutdown_tx.send(true);
        self.writer.abort();
    }

    /// Graceful close: frames already queued (a final DISCONNECT_INFO, say)
    /// still go out, then the writer flushes and shuts the socket down. No
    /// new frames are accepted after this call.
    pub async fn close_graceful(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("🔌 [NET] graceful close for {}", self.peer_addr);
        if self
            .tx
            .send_timeout(Outbound::Shutdown, ENQUEUE_TIMEOUT)
            .await
            .is_err()
        {
            // Writer is stuck or gone; fall back to the hard path.
            let _ = self.shutdown_tx.send(true);
            self.writer.abort();
        }
    }

    /// Resolves once the connection has been closed from anywhere. The
    /// session's reader loop selects on this so a hard close from another
    /// task unblocks a pending read.
    pub async fn closed(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Outbound>,
    write_half: OwnedWriteHalf,
    mut shutdown_rx: watch::Receiver<bool>,
    peer_addr: SocketAddr,
) {
    let mut writer = BufWriter::new(write_half);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(Outbound::Frame { frame_type, payload }) => {
                    if let Err(e) = wire::write_frame(&mut writer, frame_type, &payload).await {
                        tracing::debug!("✍️ [NET] write to {} failed: {}", peer_addr, e);
                        break;
                    }
                }
                Some(Outbound::Shutdown) | None => break,
            },
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    let mut socket = writer.into_inner();
    let _ = socket.shutdown().await;
    tracing::trace!("✍️ [NET] writer for {} stopped", peer_addr);
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
