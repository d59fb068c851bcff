// src/client/session.rs
//
// ClientSession - mirror state machine on the client side
//
// One reader task consumes frames and keeps local state (registration flag,
// incoming-file contexts); commands from the input loop turn into outbound
// packets through the same single-writer Connection the server uses. A file
// send runs on its own task and interleaves freely with chat — frames can
// mix, chunks can never split, because every producer goes through the one
// outbound queue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{ensure, Context, Result};
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::client::console;
use crate::client::downloads::Downloads;
use crate::client::Command;
use crate::net::{Connection, FrameReader};
use crate::wire::packet::{
    ChatMessage, DisconnectRequest, FileSendComplete, FileSendRequest, RegisterName, UpdateName,
    Whisper,
};
use crate::wire::{FileChunk, FrameType, Packet};
use crate::CHUNK_SIZE;

#[derive(Default)]
struct ClientState {
    registered: AtomicBool,
    name: Mutex<Option<String>>,
}

impl ClientState {
    fn name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.lock().unwrap() = Some(name.to_string());
        self.registered.store(true, Ordering::SeqCst);
    }
}

pub struct ClientSession {
    conn: Arc<Connection>,
    state: Arc<ClientState>,
}

impl ClientSession {
    /// Connect and spawn the reader task.
    pub async fn connect(host: &str, port: u16, downloads_dir: PathBuf) -> Result<ClientSession> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("connecting to {host}:{port}"))?;
        stream.set_nodelay(true).ok();

        let (conn, reader) = Connection::spawn(stream);
        let state = Arc::new(ClientState::default());

        tokio::spawn(run_reader(
            reader,
            conn.clone(),
            state.clone(),
            Downloads::new(downloads_dir),
        ));

        Ok(ClientSession { conn, state })
    }

    /// Resolves when the session is over, from either side.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    /// Act on one parsed command. Returns false once the session should end.
    pub async fn handle_command(&self, command: Command) -> Result<bool> {
        match command {
            Command::Exit => {
                let _ = self
                    .conn
                    .write_packet(&Packet::DisconnectRequest(DisconnectRequest {}))
                    .await;
                self.conn.close_graceful().await;
                return Ok(false);
            }
            Command::SetName { name } => {
                // First registration and later renames are different packets;
                // the local flag picks.
                let packet = if self.state.registered.load(Ordering::SeqCst) {
                    Packet::UpdateName(UpdateName { new_name: name })
                } else {
                    Packet::RegisterName(RegisterName { name })
                };
                self.conn.write_packet(&packet).await?;
            }
            Command::Chat { message } => {
                ensure!(
                    self.state.registered.load(Ordering::SeqCst),
                    "register a name first: /n <name>"
                );
                let packet = Packet::ChatMessage(ChatMessage {
                    sender: String::new(),
                    message,
                });
                self.conn.write_packet(&packet).await?;
            }
            Command::Whisper { target, message } => {
                ensure!(
                    self.state.registered.load(Ordering::SeqCst),
                    "register a name first: /n <name>"
                );
                let packet = Packet::Whisper(Whisper {
                    sender: String::new(),
                    target,
                    message,
                });
                self.conn.write_packet(&packet).await?;
            }
            Command::SendFile { target, path } => {
                ensure!(
                    self.state.registered.load(Ordering::SeqCst),
                    "register a name first: /n <name>"
                );
                // Streaming runs on its own task so typing stays live; the
                // shared connection keeps the frames whole.
                let conn = self.conn.clone();
                tokio::spawn(async move {
                    if let Err(e) = send_file(conn, target, path).await {
                        console::error(&format!("file send failed: {e:#}"));
                    }
                });
            }
        }
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTBOUND FILE STREAMING
// ═══════════════════════════════════════════════════════════════════════════

async fn send_file(conn: Arc<Connection>, target: String, path: PathBuf) -> Result<()> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("reading {path:?}"))?;
    ensure!(metadata.is_file(), "{path:?} is not a regular file");

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("path has no file name")?;
    let file_size = metadata.len();
    let transfer_id = Uuid::new_v4().to_string();

    console::file_event(&format!(
        "sending {file_name} ({file_size} bytes) to {target}"
    ));
    let request = Packet::FileSendRequest(FileSendRequest {
        target,
        transfer_id: transfer_id.clone(),
        file_name: file_name.clone(),
        file_size,
    });
    conn.write_packet(&request).await?;

    let mut file = File::open(&path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut seq = 0i32;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = FileChunk {
            transfer_id: transfer_id.clone(),
            seq,
            data: Bytes::copy_from_slice(&buf[..n]),
        };
        conn.write_file_chunk(&chunk).await?;
        seq += 1;
    }

    conn.write_packet(&Packet::FileSendComplete(FileSendComplete { transfer_id }))
        .await?;
    console::file_event(&format!("sent {file_name} in {seq} chunks"));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// INBOUND LOOP
// ═══════════════════════════════════════════════════════════════════════════

async fn run_reader(
    mut reader: FrameReader,
    conn: Arc<Connection>,
    state: Arc<ClientState>,
    mut downloads: Downloads,
) {
    loop {
        tokio::select! {
            result = reader.read() => match result {
                Ok((FrameType::JsonPacket, payload)) => match Packet::decode(&payload) {
                    Ok(packet) => handle_inbound(packet, &state, &mut downloads).await,
                    Err(e) => {
                        console::error(&format!("bad packet from server: {e}"));
                        break;
                    }
                },
                Ok((FrameType::FileChunk, payload)) => {
                    match FileChunk::decode(&payload) {
                        Ok(chunk) => match downloads.write_chunk(&chunk).await {
                            Ok(Some(finished)) => console::file_event(&format!(
                                "received {} ({} bytes) -> {:?}",
                                finished.file_name, finished.bytes, finished.path
                            )),
                            Ok(None) => {}
                            Err(e) => console::error(&format!("writing download: {e:#}")),
                        },
                        Err(e) => {
                            console::error(&format!("bad chunk from server: {e}"));
                            break;
                        }
                    }
                }
                Ok((FrameType::FileControl | FrameType::Heartbeat, _)) => {}
                Err(e) => {
                    tracing::debug!("🔌 [CLIENT] read ended: {}", e);
                    break;
                }
            },
            _ = conn.closed() => break,
        }
    }

    console::event("disconnected from server");
    conn.close();
}

async fn handle_inbound(packet: Packet, state: &ClientState, downloads: &mut Downloads) {
    match packet {
        Packet::ConnectSuccess(body) => console::notice(&body.message),
        Packet::RegisterNameSuccess(body) => {
            state.set_name(&body.name);
            console::notice(&format!("you are registered as {}", body.name));
        }
        Packet::NameCannotBeBlank(body) => console::error(&body.message),
        Packet::NameCannotBeDuplicated(body) => console::error(&body.message),
        Packet::UserEntered(body) => console::event(&format!("{} joined", body.name)),
        Packet::ChatMessage(body) => console::chat(&body.sender, &body.message),
        Packet::ServerInfo(body) => console::notice(&body.message),
        Packet::UpdateNameSuccess(body) => {
            if state.name().as_deref() == Some(body.old_name.as_str()) {
                state.set_name(&body.new_name);
                console::notice(&format!("you are now {}", body.new_name));
            } else {
                console::event(&format!("{} is now {}", body.old_name, body.new_name));
            }
        }
        Packet::DisconnectInfo(body) => {
            if state.name().as_deref() == Some(body.target.as_str()) {
                console::notice(&format!(
                    "goodbye {} — sent {}, received {}",
                    body.target, body.sent, body.received
                ));
            } else {
                console::event(&format!(
                    "{} left (sent {}, received {})",
                    body.target, body.sent, body.received
                ));
            }
        }
        Packet::UserNotExists(body) => console::error(&body.message),
        Packet::WhisperToSender(body) => console::whisper_out(&body.target, &body.message),
        Packet::WhisperToTarget(body) => console::whisper_in(&body.sender, &body.message),
        Packet::FileSendRequest(body) => {
            if let Err(e) = downloads.begin(&body).await {
                console::error(&format!("cannot accept {}: {e:#}", body.file_name));
            } else {
                console::file_event(&format!(
                    "incoming file {} ({} bytes)",
                    body.file_name, body.file_size
                ));
            }
        }
        Packet::FileSendComplete(body) => match downloads.complete(&body.transfer_id).await {
            Ok(Some(finished)) if finished.complete => console::file_event(&format!(
                "received {} ({} bytes) -> {:?}",
                finished.file_name, finished.bytes, finished.path
            )),
            Ok(Some(finished)) => console::error(&format!(
                "transfer of {} ended early at {} bytes",
                finished.file_name, finished.bytes
            )),
            Ok(None) => {}
            Err(e) => console::error(&format!("finishing download: {e:#}")),
        },
        other => {
            tracing::debug!("🔌 [CLIENT] unexpected packet {:?}", other.packet_type());
        }
    }
}
