// tests/common/mod.rs
//
// Shared harness for end-to-end tests: a real server on an ephemeral port
// and a thin test client speaking the wire format directly over a socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use hubbub::server::{ChatServer, Registry};
use hubbub::wire::{self, FileChunk, FrameType, Packet};

pub const STEP: Duration = Duration::from_secs(5);

/// Start a server on an ephemeral port; returns its address and registry.
pub async fn spawn_server() -> Result<(SocketAddr, Arc<Registry>)> {
    let server = ChatServer::bind("127.0.0.1:0".parse().unwrap()).await?;
    let addr = server.local_addr()?;
    let registry = server.registry();
    tokio::spawn(server.run());
    Ok((addr, registry))
}

/// One scripted client. Reads and writes are sequential within a test, so
/// the raw socket halves suffice — no writer task needed here.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Result<TestClient> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(TestClient {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        let payload = packet.encode()?;
        wire::write_frame(&mut self.writer, FrameType::JsonPacket, &payload).await?;
        Ok(())
    }

    pub async fn send_chunk(&mut self, chunk: &FileChunk) -> Result<()> {
        let payload = chunk.encode()?;
        wire::write_frame(&mut self.writer, FrameType::FileChunk, &payload).await?;
        Ok(())
    }

    pub async fn recv_frame(&mut self) -> Result<(FrameType, Bytes)> {
        let frame = tokio::time::timeout(STEP, wire::read_frame(&mut self.reader))
            .await
            .map_err(|_| anyhow!("timed out waiting for a frame"))??;
        Ok(frame)
    }

    /// Receive a frame and require it to be a control packet.
    pub async fn recv(&mut self) -> Result<Packet> {
        let (frame_type, payload) = self.recv_frame().await?;
        if frame_type != FrameType::JsonPacket {
            bail!("expected a packet frame, got {frame_type:?}");
        }
        Ok(Packet::decode(&payload)?)
    }

    /// Receive a frame and require it to be a file chunk.
    pub async fn recv_chunk(&mut self) -> Result<FileChunk> {
        let (frame_type, payload) = self.recv_frame().await?;
        if frame_type != FrameType::FileChunk {
            bail!("expected a chunk frame, got {frame_type:?}");
        }
        Ok(FileChunk::decode(&payload)?)
    }

    /// Escape hatch for writing deliberately malformed bytes.
    pub fn raw_writer(&mut self) -> &mut OwnedWriteHalf {
        &mut self.writer
    }

    /// True once the server has closed this client's connection.
    pub async fn server_hung_up(&mut self) -> bool {
        matches!(
            tokio::time::timeout(STEP, wire::read_frame(&mut self.reader)).await,
            Ok(Err(wire::WireError::Io(_)))
        )
    }

    /// Connect-and-greet: consume the CONNECT_SUCCESS every session opens
    /// with.
    pub async fn connect_ready(addr: SocketAddr) -> Result<TestClient> {
        let mut client = TestClient::connect(addr).await?;
        match client.recv().await? {
            Packet::ConnectSuccess(_) => Ok(client),
            other => bail!("expected ConnectSuccess, got {other:?}"),
        }
    }

    /// Register a name and return the server-assigned id. Entry broadcasts
    /// for peers that registered while we were connected but unnamed may sit
    /// ahead of the ack; those are skipped.
    pub async fn register(&mut self, name: &str) -> Result<String> {
        use hubbub::wire::packet::RegisterName;
        self.send(&Packet::RegisterName(RegisterName { name: name.into() }))
            .await?;
        loop {
            match self.recv().await? {
                Packet::RegisterNameSuccess(body) => {
                    if body.name != name {
                        bail!("registered as {:?}, expected {:?}", body.name, name);
                    }
                    return Ok(body.id);
                }
                Packet::UserEntered(_) => continue,
                other => bail!("expected RegisterNameSuccess, got {other:?}"),
            }
        }
    }
}

/// Poll until `check` passes or a deadline expires. Counter updates and
/// registry removals race the frames we observe, so tests wait briefly
/// instead of asserting instantly.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) -> Result<()> {
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("condition never held: {what}")
}
