// src/lib.rs
//
// hubbub - multi-user chat over persistent TCP with binary file relay
//
// One server process accepts many clients. Each client holds a single
// full-duplex TCP session carrying an interleaved mix of JSON control
// packets and binary file chunks; the server broadcasts chat, routes
// whispers by name, and forwards file chunks sender→target without ever
// inspecting or storing their contents.

use std::time::Duration;

pub mod client;
pub mod net;
pub mod server;
pub mod wire;

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════

/// Default server TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Size of the file slices a sending client streams.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Outbound frames buffered per connection before producers start waiting.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// How long a producer waits on a full outbound queue before the enqueue
/// fails with backpressure.
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default directory where received files land on the client.
pub const DOWNLOADS_DIR: &str = "./downloads";
