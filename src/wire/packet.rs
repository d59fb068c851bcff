// src/wire/packet.rs
//
// Control packets: the JSON half of the protocol.
//
// A packet travels inside a JsonPacket frame as
//   i32 length (= 8 + |body|) | i32 typeCode | UTF-8 JSON body
// The type code is a closed set; unknown codes fail decoding. Unknown JSON
// fields inside a body are tolerated so newer peers can add fields, but a
// missing required field is a protocol error.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::WireError;

// ═══════════════════════════════════════════════════════════════════════════
// TYPE CODES
// ═══════════════════════════════════════════════════════════════════════════

/// Numeric packet type codes. The values are the wire contract; both sides
/// must agree on them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PacketType {
    ConnectSuccess = 1,
    RegisterName = 10,
    RegisterNameSuccess = 11,
    NameCannotBeBlank = 12,
    NameCannotBeDuplicated = 13,
    UserEntered = 19,
    ChatMessage = 20,
    ServerInfo = 30,
    UpdateName = 33,
    UpdateNameSuccess = 34,
    DisconnectInfo = 40,
    DisconnectRequest = 41,
    Whisper = 50,
    UserNotExists = 51,
    WhisperToSender = 52,
    WhisperToTarget = 53,
    FileSendRequest = 60,
    FileSendComplete = 61,
}

impl TryFrom<i32> for PacketType {
    type Error = WireError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(PacketType::ConnectSuccess),
            10 => Ok(PacketType::RegisterName),
            11 => Ok(PacketType::RegisterNameSuccess),
            12 => Ok(PacketType::NameCannotBeBlank),
            13 => Ok(PacketType::NameCannotBeDuplicated),
            19 => Ok(PacketType::UserEntered),
            20 => Ok(PacketType::ChatMessage),
            30 => Ok(PacketType::ServerInfo),
            33 => Ok(PacketType::UpdateName),
            34 => Ok(PacketType::UpdateNameSuccess),
            40 => Ok(PacketType::DisconnectInfo),
            41 => Ok(PacketType::DisconnectRequest),
            50 => Ok(PacketType::Whisper),
            51 => Ok(PacketType::UserNotExists),
            52 => Ok(PacketType::WhisperToSender),
            53 => Ok(PacketType::WhisperToTarget),
            60 => Ok(PacketType::FileSendRequest),
            61 => Ok(PacketType::FileSendComplete),
            other => Err(WireError::UnknownPacketCode(other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BODY DTOS — one per type code
// ═══════════════════════════════════════════════════════════════════════════

/// `{message}` — greeting pushed right after accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectSuccess {
    pub message: String,
}

/// `{name}` — first name registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterName {
    pub name: String,
}

/// `{id, name}` — registration acknowledged; carries the server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterNameSuccess {
    pub id: String,
    pub name: String,
}

/// `{message}` — rejected: name empty after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameCannotBeBlank {
    pub message: String,
}

/// `{message}` — rejected: another session holds this name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameCannotBeDuplicated {
    pub message: String,
}

/// `{id, name}` — broadcast when a peer finishes registering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntered {
    pub id: String,
    pub name: String,
}

/// `{sender, message}` — broadcast chat. Client-to-server the sender field is
/// ignored; the server rewrites it with the authoritative name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub message: String,
}

/// `{message}` — free-form server notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub message: String,
}

/// `{newName}` — rename request from a registered client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateName {
    pub new_name: String,
}

/// `{oldName, newName}` — rename acknowledged; sent to self and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNameSuccess {
    pub old_name: String,
    pub new_name: String,
}

/// `{target, sent, received}` — final accounting when a named client leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    pub target: String,
    pub sent: u64,
    pub received: u64,
}

/// `{}` — graceful client-initiated disconnect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisconnectRequest {}

/// `{sender, target, message}` — directed message request. Sender field is
/// rewritten server-side like `ChatMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whisper {
    pub sender: String,
    pub target: String,
    pub message: String,
}

/// `{message}` — whisper or file-request target does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotExists {
    pub message: String,
}

/// `{sender, target, message}` — whisper echo to its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperToSender {
    pub sender: String,
    pub target: String,
    pub message: String,
}

/// `{sender, target, message}` — whisper delivery to its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhisperToTarget {
    pub sender: String,
    pub target: String,
    pub message: String,
}

/// `{target, transferId, fileName, fileSize}` — announces an incoming
/// transfer; relayed unchanged to the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSendRequest {
    pub target: String,
    pub transfer_id: String,
    pub file_name: String,
    pub file_size: u64,
}

/// `{transferId}` — closes a transfer; relayed to the recorded target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSendComplete {
    pub transfer_id: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// PACKET
// ═══════════════════════════════════════════════════════════════════════════

/// A decoded control packet: type code plus its body DTO.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    ConnectSuccess(ConnectSuccess),
    RegisterName(RegisterName),
    RegisterNameSuccess(RegisterNameSuccess),
    NameCannotBeBlank(NameCannotBeBlank),
    NameCannotBeDuplicated(NameCannotBeDuplicated),
    UserEntered(UserEntered),
    ChatMessage(ChatMessage),
    ServerInfo(ServerInfo),
    UpdateName(UpdateName),
    UpdateNameSuccess(UpdateNameSuccess),
    DisconnectInfo(DisconnectInfo),
    DisconnectRequest(DisconnectRequest),
    Whisper(Whisper),
    UserNotExists(UserNotExists),
    WhisperToSender(WhisperToSender),
    WhisperToTarget(WhisperToTarget),
    FileSendRequest(FileSendRequest),
    FileSendComplete(FileSendComplete),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ConnectSuccess(_) => PacketType::ConnectSuccess,
            Packet::RegisterName(_) => PacketType::RegisterName,
            Packet::RegisterNameSuccess(_) => PacketType::RegisterNameSuccess,
            Packet::NameCannotBeBlank(_) => PacketType::NameCannotBeBlank,
            Packet::NameCannotBeDuplicated(_) => PacketType::NameCannotBeDuplicated,
            Packet::UserEntered(_) => PacketType::UserEntered,
            Packet::ChatMessage(_) => PacketType::ChatMessage,
            Packet::ServerInfo(_) => PacketType::ServerInfo,
            Packet::UpdateName(_) => PacketType::UpdateName,
            Packet::UpdateNameSuccess(_) => PacketType::UpdateNameSuccess,
            Packet::DisconnectInfo(_) => PacketType::DisconnectInfo,
            Packet::DisconnectRequest(_) => PacketType::DisconnectRequest,
            Packet::Whisper(_) => PacketType::Whisper,
            Packet::UserNotExists(_) => PacketType::UserNotExists,
            Packet::WhisperToSender(_) => PacketType::WhisperToSender,
            Packet::WhisperToTarget(_) => PacketType::WhisperToTarget,
            Packet::FileSendRequest(_) => PacketType::FileSendRequest,
            Packet::FileSendComplete(_) => PacketType::FileSendComplete,
        }
    }

    /// Encode into a JsonPacket frame payload.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let body = match self {
            Packet::ConnectSuccess(b) => serde_json::to_vec(b)?,
            Packet::RegisterName(b) => serde_json::to_vec(b)?,
            Packet::RegisterNameSuccess(b) => serde_json::to_vec(b)?,
            Packet::NameCannotBeBlank(b) => serde_json::to_vec(b)?,
            Packet::NameCannotBeDuplicated(b) => serde_json::to_vec(b)?,
            Packet::UserEntered(b) => serde_json::to_vec(b)?,
            Packet::ChatMessage(b) => serde_json::to_vec(b)?,
            Packet::ServerInfo(b) => serde_json::to_vec(b)?,
            Packet::UpdateName(b) => serde_json::to_vec(b)?,
            Packet::UpdateNameSuccess(b) => serde_json::to_vec(b)?,
            Packet::DisconnectInfo(b) => serde_json::to_vec(b)?,
            Packet::DisconnectRequest(b) => serde_json::to_vec(b)?,
            Packet::Whisper(b) => serde_json::to_vec(b)?,
            Packet::UserNotExists(b) => serde_json::to_vec(b)?,
            Packet::WhisperToSender(b) => serde_json::to_vec(b)?,
            Packet::WhisperToTarget(b) => serde_json::to_vec(b)?,
            Packet::FileSendRequest(b) => serde_json::to_vec(b)?,
            Packet::FileSendComplete(b) => serde_json::to_vec(b)?,
        };

        let mut buf = BytesMut::with_capacity(8 + body.len());
        buf.put_i32(8 + body.len() as i32);
        buf.put_i32(self.packet_type() as i32);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decode a JsonPacket frame payload.
    pub fn decode(payload: &[u8]) -> Result<Packet, WireError> {
        if payload.len() < 8 {
            return Err(WireError::Truncated {
                needed: 8,
                available: payload.len(),
            });
        }

        let declared = i32::from_be_bytes(payload[0..4].try_into().unwrap());
        if declared < 0 {
            return Err(WireError::NegativeLength(declared));
        }
        if declared as usize != payload.len() {
            return Err(WireError::LengthMismatch {
                declared: declared as usize,
                actual: payload.len(),
            });
        }

        let code = i32::from_be_bytes(payload[4..8].try_into().unwrap());
        let packet_type = PacketType::try_from(code)?;
        let body = &payload[8..];

        let packet = match packet_type {
            PacketType::ConnectSuccess => Packet::ConnectSuccess(serde_json::from_slice(body)?),
            PacketType::RegisterName => Packet::RegisterName(serde_json::from_slice(body)?),
            PacketType::RegisterNameSuccess => {
                Packet::RegisterNameSuccess(serde_json::from_slice(body)?)
            }
            PacketType::NameCannotBeBlank => {
                Packet::NameCannotBeBlank(serde_json::from_slice(body)?)
            }
            PacketType::NameCannotBeDuplicated => {
                Packet::NameCannotBeDuplicated(serde_json::from_slice(body)?)
            }
            PacketType::UserEntered => Packet::UserEntered(serde_json::from_slice(body)?),
            PacketType::ChatMessage => Packet::ChatMessage(serde_json::from_slice(body)?),
            PacketType::ServerInfo => Packet::ServerInfo(serde_json::from_slice(body)?),
            PacketType::UpdateName => Packet::UpdateName(serde_json::from_slice(body)?),
            PacketType::UpdateNameSuccess => {
                Packet::UpdateNameSuccess(serde_json::from_slice(body)?)
            }
            PacketType::DisconnectInfo => Packet::DisconnectInfo(serde_json::from_slice(body)?),
            PacketType::DisconnectRequest => {
                Packet::DisconnectRequest(serde_json::from_slice(body)?)
            }
            PacketType::Whisper => Packet::Whisper(serde_json::from_slice(body)?),
            PacketType::UserNotExists => Packet::UserNotExists(serde_json::from_slice(body)?),
            PacketType::WhisperToSender => Packet::WhisperToSender(serde_json::from_slice(body)?),
            PacketType::WhisperToTarget => Packet::WhisperToTarget(serde_json::from_slice(body)?),
            PacketType::FileSendRequest => Packet::FileSendRequest(serde_json::from_slice(body)?),
            PacketType::FileSendComplete => {
                Packet::FileSendComplete(serde_json::from_slice(body)?)
            }
        };

        Ok(packet)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn representative_packets() -> Vec<Packet> {
        vec![
            Packet::ConnectSuccess(ConnectSuccess {
                message: "welcome".into(),
            }),
            Packet::RegisterName(RegisterName {
                name: "Alice".into(),
            }),
            Packet::RegisterNameSuccess(RegisterNameSuccess {
                id: "a1b2".into(),
                name: "Alice".into(),
            }),
            Packet::NameCannotBeBlank(NameCannotBeBlank {
                message: "name cannot be blank".into(),
            }),
            Packet::NameCannotBeDuplicated(NameCannotBeDuplicated {
                message: "name already taken".into(),
            }),
            Packet::UserEntered(UserEntered {
                id: "b2c3".into(),
                name: "Bob".into(),
            }),
            Packet::ChatMessage(ChatMessage {
                sender: "Alice".into(),
                message: "hi there 👋".into(),
            }),
            Packet::ServerInfo(ServerInfo {
                message: "register a name first".into(),
            }),
            Packet::UpdateName(UpdateName {
                new_name: "Alicia".into(),
            }),
            Packet::UpdateNameSuccess(UpdateNameSuccess {
                old_name: "Alice".into(),
                new_name: "Alicia".into(),
            }),
            Packet::DisconnectInfo(DisconnectInfo {
                target: "Alice".into(),
                sent: 3,
                received: 2,
            }),
            Packet::DisconnectRequest(DisconnectRequest {}),
            Packet::Whisper(Whisper {
                sender: "".into(),
                target: "Bob".into(),
                message: "psst".into(),
            }),
            Packet::UserNotExists(UserNotExists {
                message: "no such user".into(),
            }),
            Packet::WhisperToSender(WhisperToSender {
                sender: "Alice".into(),
                target: "Bob".into(),
                message: "psst".into(),
            }),
            Packet::WhisperToTarget(WhisperToTarget {
                sender: "Alice".into(),
                target: "Bob".into(),
                message: "psst".into(),
            }),
            Packet::FileSendRequest(FileSendRequest {
                target: "Bob".into(),
                transfer_id: "T1".into(),
                file_name: "x.bin".into(),
                file_size: 131072,
            }),
            Packet::FileSendComplete(FileSendComplete {
                transfer_id: "T1".into(),
            }),
        ]
    }

    #[test]
    fn every_packet_type_round_trips() {
        for packet in representative_packets() {
            let encoded = packet.encode().unwrap();
            let decoded = Packet::decode(&encoded).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn length_field_counts_header_plus_body() {
        let packet = Packet::ChatMessage(ChatMessage {
            sender: "A".into(),
            message: "hi".into(),
        });
        let encoded = packet.encode().unwrap();
        let declared = i32::from_be_bytes(encoded[0..4].try_into().unwrap());
        let body = serde_json::to_vec(&ChatMessage {
            sender: "A".into(),
            message: "hi".into(),
        })
        .unwrap();
        assert_eq!(declared as usize, 8 + body.len());
        assert_eq!(declared as usize, encoded.len());
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let packet = Packet::FileSendRequest(FileSendRequest {
            target: "Bob".into(),
            transfer_id: "T1".into(),
            file_name: "x.bin".into(),
            file_size: 1,
        });
        let encoded = packet.encode().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&encoded[8..]).unwrap();
        assert!(body.get("transferId").is_some());
        assert!(body.get("fileName").is_some());
        assert!(body.get("fileSize").is_some());
        assert!(body.get("transfer_id").is_none());

        let packet = Packet::UpdateNameSuccess(UpdateNameSuccess {
            old_name: "a".into(),
            new_name: "b".into(),
        });
        let encoded = packet.encode().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&encoded[8..]).unwrap();
        assert!(body.get("oldName").is_some());
        assert!(body.get("newName").is_some());
    }

    #[test]
    fn unknown_code_is_rejected() {
        let body = b"{}";
        let mut payload = Vec::new();
        payload.extend_from_slice(&(8 + body.len() as i32).to_be_bytes());
        payload.extend_from_slice(&99i32.to_be_bytes());
        payload.extend_from_slice(body);
        let err = Packet::decode(&payload).unwrap_err();
        assert!(matches!(err, WireError::UnknownPacketCode(99)));
    }

    #[test]
    fn unknown_json_fields_are_tolerated() {
        let body = br#"{"name":"Alice","futureField":42}"#;
        let mut payload = Vec::new();
        payload.extend_from_slice(&(8 + body.len() as i32).to_be_bytes());
        payload.extend_from_slice(&(PacketType::RegisterName as i32).to_be_bytes());
        payload.extend_from_slice(body);
        let packet = Packet::decode(&payload).unwrap();
        assert_eq!(
            packet,
            Packet::RegisterName(RegisterName {
                name: "Alice".into()
            })
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let body = br#"{"sender":"Alice"}"#;
        let mut payload = Vec::new();
        payload.extend_from_slice(&(8 + body.len() as i32).to_be_bytes());
        payload.extend_from_slice(&(PacketType::ChatMessage as i32).to_be_bytes());
        payload.extend_from_slice(body);
        let err = Packet::decode(&payload).unwrap_err();
        assert!(matches!(err, WireError::Json(_)));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let packet = Packet::ServerInfo(ServerInfo {
            message: "hi".into(),
        });
        let mut encoded = packet.encode().unwrap().to_vec();
        encoded.push(b' ');
        let err = Packet::decode(&encoded).unwrap_err();
        assert!(matches!(err, WireError::LengthMismatch { .. }));
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = Packet::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }
}
