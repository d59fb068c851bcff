// src/server/session.rs
//
// Session - per-client state machine on the server
//
// A session runs on its connection's reader task. It registers itself in
// the registry, greets the client, then loops over inbound frames until the
// peer disconnects, the stream corrupts, or another task hard-closes the
// connection. Fan-out to other clients never touches their sockets — it
// enqueues onto their connections' writer queues through registry snapshots.
//
// Whatever path the loop exits by, the cleanup at the bottom of run() is
// the one place the registry entry is removed and the connection closed.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::net::{Connection, FrameReader, SendError};
use crate::server::registry::{NameRejection, Peer, Registry};
use crate::wire::packet::{
    self, ConnectSuccess, DisconnectInfo, NameCannotBeBlank, NameCannotBeDuplicated,
    RegisterNameSuccess, ServerInfo, UpdateNameSuccess, UserEntered, UserNotExists,
};
use crate::wire::{FrameType, Packet};

/// Outcome of handling one inbound packet.
enum Flow {
    Continue,
    /// Client asked to leave; run the disconnect procedure.
    Close,
}

pub struct Session {
    registry: Arc<Registry>,
    peer: Arc<Peer>,
    reader: FrameReader,
    /// transferId → target peer id, for chunks this client is relaying.
    transfers: HashMap<String, String>,
}

impl Session {
    /// Accept a socket: create the connection pair, enter the registry, and
    /// spawn the session onto its own task.
    pub fn spawn(registry: Arc<Registry>, stream: TcpStream) {
        let (conn, reader) = Connection::spawn(stream);
        let peer = Peer::new(Uuid::new_v4().to_string(), conn);
        registry.add(peer.clone());

        let session = Session {
            registry,
            peer,
            reader,
            transfers: HashMap::new(),
        };
        tokio::spawn(session.run());
    }

    async fn run(mut self) {
        tracing::info!(
            "🔌 [SESSION] {} connected from {}",
            self.peer.short_id(),
            self.peer.conn.peer_addr()
        );

        let greeting = Packet::ConnectSuccess(ConnectSuccess {
            message: "connected, register a name with /n".into(),
        });
        if self.reply(greeting).await.is_err() {
            self.disconnect().await;
            return;
        }

        loop {
            tokio::select! {
                result = self.reader.read() => match result {
                    Ok((FrameType::JsonPacket, payload)) => {
                        let packet = match Packet::decode(&payload) {
                            Ok(packet) => packet,
                            Err(e) => {
                                tracing::warn!(
                                    "⚠️ [SESSION] {} sent a malformed packet: {}",
                                    self.peer.short_id(),
                                    e
                                );
                                break;
                            }
                        };
                        match self.handle_packet(packet).await {
                            Flow::Continue => {}
                            Flow::Close => break,
                        }
                    }
                    Ok((FrameType::FileChunk, payload)) => {
                        if !self.relay_chunk(payload).await {
                            break;
                        }
                    }
                    Ok((FrameType::FileControl | FrameType::Heartbeat, _)) => {
                        // Reserved frame types: accepted, never dispatched.
                        tracing::trace!("🔌 [SESSION] {} sent a reserved frame", self.peer.short_id());
                    }
                    Err(e) if e.is_protocol() => {
                        tracing::warn!(
                            "⚠️ [SESSION] {} corrupted the stream: {}",
                            self.peer.short_id(),
                            e
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("🔌 [SESSION] {} read ended: {}", self.peer.short_id(), e);
                        break;
                    }
                },
                _ = self.peer.conn.closed() => {
                    tracing::debug!("🔌 [SESSION] {} closed from elsewhere", self.peer.short_id());
                    break;
                }
            }
        }

        self.disconnect().await;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PACKET DISPATCH
    // ═══════════════════════════════════════════════════════════════════════

    async fn handle_packet(&mut self, packet: Packet) -> Flow {
        match packet {
            Packet::RegisterName(body) => self.register_name(body.name).await,
            Packet::UpdateName(body) => self.update_name(body.new_name).await,
            Packet::ChatMessage(body) => self.chat(body.message).await,
            Packet::Whisper(body) => self.whisper(body.target, body.message).await,
            Packet::FileSendRequest(body) => self.file_send_request(body).await,
            Packet::FileSendComplete(body) => self.file_send_complete(body).await,
            Packet::DisconnectRequest(_) => Flow::Close,
            other => {
                // Server-to-client packets echoed back at us: a confused or
                // misbehaving client. Not worth killing the connection over.
                tracing::debug!(
                    "🔌 [SESSION] {} sent unexpected {:?}",
                    self.peer.short_id(),
                    other.packet_type()
                );
                Flow::Continue
            }
        }
    }

    async fn register_name(&mut self, name: String) -> Flow {
        if self.peer.is_named() {
            return self
                .notice("already registered; rename with /n <name>")
                .await;
        }

        match self.registry.try_set_name(&self.peer, &name) {
            Ok(_) => {
                tracing::info!("👤 [SESSION] {} registered as {:?}", self.peer.short_id(), name);
                let ack = Packet::RegisterNameSuccess(RegisterNameSuccess {
                    id: self.peer.id.clone(),
                    name: name.clone(),
                });
                if self.reply(ack).await.is_err() {
                    return Flow::Close;
                }
                let entered = Packet::UserEntered(UserEntered {
                    id: self.peer.id.clone(),
                    name,
                });
                self.broadcast(&entered).await;
                Flow::Continue
            }
            Err(NameRejection::Blank) => {
                let reply = Packet::NameCannotBeBlank(NameCannotBeBlank {
                    message: "name cannot be blank".into(),
                });
                self.reply(reply).await.into()
            }
            Err(NameRejection::Duplicate) => {
                let reply = Packet::NameCannotBeDuplicated(NameCannotBeDuplicated {
                    message: format!("name {name:?} is already taken"),
                });
                self.reply(reply).await.into()
            }
        }
    }

    async fn update_name(&mut self, new_name: String) -> Flow {
        if !self.peer.is_named() {
            return self.notice("register a name first with /n <name>").await;
        }

        match self.registry.try_set_name(&self.peer, &new_name) {
            Ok(old) => {
                let old_name = old.unwrap_or_default();
                tracing::info!(
                    "👤 [SESSION] {} renamed {:?} -> {:?}",
                    self.peer.short_id(),
                    old_name,
                    new_name
                );
                let ack = Packet::UpdateNameSuccess(UpdateNameSuccess {
                    old_name,
                    new_name,
                });
                if self.reply(ack.clone()).await.is_err() {
                    return Flow::Close;
                }
                self.broadcast(&ack).await;
                Flow::Continue
            }
            Err(NameRejection::Blank) => {
                let reply = Packet::NameCannotBeBlank(NameCannotBeBlank {
                    message: "name cannot be blank".into(),
                });
                self.reply(reply).await.into()
            }
            Err(NameRejection::Duplicate) => {
                let reply = Packet::NameCannotBeDuplicated(NameCannotBeDuplicated {
                    message: format!("name {new_name:?} is already taken"),
                });
                self.reply(reply).await.into()
            }
        }
    }

    async fn chat(&mut self, message: String) -> Flow {
        let Some(sender) = self.peer.name() else {
            return self.notice("register a name first with /n <name>").await;
        };

        // Sender field is authoritative server-side; whatever the client put
        // there is discarded.
        let packet = Packet::ChatMessage(packet::ChatMessage { sender, message });

        // One send counts once, however many clients hear it.
        self.peer.sent.fetch_add(1, Ordering::Relaxed);

        for other in self.registry.snapshot_except(&self.peer.id) {
            match other.conn.write_packet(&packet).await {
                Ok(()) => {
                    other.received.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => self.deliveries_failed(&other, e),
            }
        }
        Flow::Continue
    }

    async fn whisper(&mut self, target: String, message: String) -> Flow {
        let Some(sender) = self.peer.name() else {
            return self.notice("register a name first with /n <name>").await;
        };

        let Some(target_peer) = self.registry.find_by_name(&target) else {
            let reply = Packet::UserNotExists(UserNotExists {
                message: format!("no user named {target:?}"),
            });
            return self.reply(reply).await.into();
        };

        self.peer.sent.fetch_add(1, Ordering::Relaxed);

        let to_target = Packet::WhisperToTarget(packet::WhisperToTarget {
            sender: sender.clone(),
            target: target.clone(),
            message: message.clone(),
        });
        match target_peer.conn.write_packet(&to_target).await {
            Ok(()) => {
                target_peer.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.deliveries_failed(&target_peer, e),
        }

        let to_sender = Packet::WhisperToSender(packet::WhisperToSender {
            sender,
            target,
            message,
        });
        self.reply(to_sender).await.into()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FILE RELAY
    // ═══════════════════════════════════════════════════════════════════════

    async fn file_send_request(&mut self, body: packet::FileSendRequest) -> Flow {
        if !self.peer.is_named() {
            return self.notice("register a name first with /n <name>").await;
        }

        let Some(target_peer) = self.registry.find_by_name(&body.target) else {
            let reply = Packet::UserNotExists(UserNotExists {
                message: format!("no user named {:?}", body.target),
            });
            return self.reply(reply).await.into();
        };

        tracing::info!(
            "📦 [RELAY] {} -> {}: transfer {} ({}, {} bytes)",
            self.peer.short_id(),
            target_peer.short_id(),
            body.transfer_id,
            body.file_name,
            body.file_size
        );
        self.transfers
            .insert(body.transfer_id.clone(), target_peer.id.clone());

        let forward = Packet::FileSendRequest(body);
        if let Err(e) = target_peer.conn.write_packet(&forward).await {
            self.deliveries_failed(&target_peer, e);
        }
        Flow::Continue
    }

    /// Route one raw chunk payload to its recorded target without decoding
    /// the data. Returns false only when the payload itself is malformed —
    /// at that point the stream framing can no longer be trusted.
    async fn relay_chunk(&mut self, payload: Bytes) -> bool {
        let transfer_id = match crate::wire::FileChunk::peek_transfer_id(&payload) {
            Ok(id) => id.to_string(),
            Err(e) => {
                tracing::warn!(
                    "⚠️ [RELAY] {} sent an unroutable chunk: {}",
                    self.peer.short_id(),
                    e
                );
                return false;
            }
        };

        let Some(target_id) = self.transfers.get(&transfer_id) else {
            // No reply channel exists for chunks, so an orphan is dropped,
            // not answered.
            tracing::debug!(
                "📦 [RELAY] {} chunk for unknown transfer {}, dropped",
                self.peer.short_id(),
                transfer_id
            );
            return true;
        };

        let Some(target_peer) = self.registry.lookup(target_id) else {
            tracing::debug!(
                "📦 [RELAY] target for transfer {} is gone, dropping mapping",
                transfer_id
            );
            self.transfers.remove(&transfer_id);
            return true;
        };

        if let Err(e) = target_peer.conn.write_raw_chunk(payload).await {
            self.deliveries_failed(&target_peer, e);
        }
        true
    }

    async fn file_send_complete(&mut self, body: packet::FileSendComplete) -> Flow {
        let Some(target_id) = self.transfers.remove(&body.transfer_id) else {
            tracing::debug!(
                "📦 [RELAY] {} completed unknown transfer {}, dropped",
                self.peer.short_id(),
                body.transfer_id
            );
            return Flow::Continue;
        };

        tracing::info!(
            "📦 [RELAY] {} finished transfer {}",
            self.peer.short_id(),
            body.transfer_id
        );
        if let Some(target_peer) = self.registry.lookup(&target_id) {
            let forward = Packet::FileSendComplete(body);
            if let Err(e) = target_peer.conn.write_packet(&forward).await {
                self.deliveries_failed(&target_peer, e);
            }
        }
        Flow::Continue
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DELIVERY HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Enqueue to this session's own client. An error here means our own
    /// connection is dead or stalled; the caller converts it to Flow::Close.
    async fn reply(&self, packet: Packet) -> Result<(), SendError> {
        let result = self.peer.conn.write_packet(&packet).await;
        if let Err(ref e) = result {
            tracing::debug!(
                "🔌 [SESSION] reply to {} failed: {}",
                self.peer.short_id(),
                e
            );
            self.peer.conn.close();
        }
        result
    }

    async fn notice(&self, message: &str) -> Flow {
        let packet = Packet::ServerInfo(ServerInfo {
            message: message.into(),
        });
        self.reply(packet).await.into()
    }

    /// Enqueue to every other live session. A failed recipient is closed and
    /// skipped; its own session notices and cleans up.
    async fn broadcast(&self, packet: &Packet) {
        for other in self.registry.snapshot_except(&self.peer.id) {
            if let Err(e) = other.conn.write_packet(packet).await {
                self.deliveries_failed(&other, e);
            }
        }
    }

    /// A peer we tried to deliver to is not accepting frames. Backpressure
    /// means it is stalled beyond the bounded wait: close it so its session
    /// runs cleanup. An already-closed peer needs nothing from us.
    fn deliveries_failed(&self, other: &Peer, err: SendError) {
        match err {
            SendError::Backpressure => {
                tracing::warn!(
                    "⚠️ [SESSION] {} not draining, closing it",
                    other.short_id()
                );
                other.conn.close();
            }
            SendError::Closed => {}
            SendError::Encode(e) => {
                // Encoding is deterministic over our own DTOs; this cannot
                // depend on the recipient.
                tracing::error!("🔴 [SESSION] frame encoding failed: {}", e);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DISCONNECT
    // ═══════════════════════════════════════════════════════════════════════

    async fn disconnect(self) {
        let name = self.peer.name();
        let sent = self.peer.sent.load(Ordering::Relaxed);
        let received = self.peer.received.load(Ordering::Relaxed);

        self.registry.remove(&self.peer.id);

        if let Some(name) = name {
            tracing::info!(
                "👋 [SESSION] {} ({:?}) left: sent {}, received {}",
                self.peer.short_id(),
                name,
                sent,
                received
            );
            let info = Packet::DisconnectInfo(DisconnectInfo {
                target: name,
                sent,
                received,
            });
            // Best effort to self: the socket may already be gone.
            let _ = self.peer.conn.write_packet(&info).await;
            for other in self.registry.snapshot_except(&self.peer.id) {
                if let Err(e) = other.conn.write_packet(&info).await {
                    self.deliveries_failed(&other, e);
                }
            }
        } else {
            tracing::info!("👋 [SESSION] {} left unregistered", self.peer.short_id());
        }

        self.peer.conn.close_graceful().await;
    }
}

impl From<Result<(), SendError>> for Flow {
    fn from(result: Result<(), SendError>) -> Flow {
        match result {
            Ok(()) => Flow::Continue,
            Err(_) => Flow::Close,
        }
    }
}
