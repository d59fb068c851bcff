// src/server/registry.rs
//
// Registry - process-wide map of live peers
//
// One coarse lock over one HashMap. Membership changes only on connect,
// disconnect, and rename, so contention is negligible and anything fancier
// (sharding, lock-free) buys nothing. Name uniqueness is checked and
// asserted under the same lock that performs the name write; that is the
// whole reason try_set_name lives here rather than on Peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::net::Connection;

/// Shared view of one connected client: identity, chat counters, and the
/// enqueue side of its connection.
///
/// A session exclusively owns its own Peer's lifecycle; other sessions reach
/// it through the registry only to enqueue frames or bump `received`.
pub struct Peer {
    pub id: String,
    name: Mutex<Option<String>>,
    pub sent: AtomicU64,
    pub received: AtomicU64,
    pub conn: Arc<Connection>,
}

impl Peer {
    pub fn new(id: String, conn: Arc<Connection>) -> Arc<Peer> {
        Arc::new(Peer {
            id,
            name: Mutex::new(None),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            conn,
        })
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    pub fn is_named(&self) -> bool {
        self.name.lock().unwrap().is_some()
    }

    /// Short id prefix for log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

/// Why a name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRejection {
    Blank,
    Duplicate,
}

#[derive(Default)]
pub struct Registry {
    peers: Mutex<HashMap<String, Arc<Peer>>>,
}

impl Registry {
    pub fn new() -> Arc<Registry> {
        Arc::new(Registry::default())
    }

    pub fn add(&self, peer: Arc<Peer>) {
        let mut peers = self.peers.lock().unwrap();
        tracing::debug!("📒 [REGISTRY] add {} ({} live)", peer.short_id(), peers.len() + 1);
        peers.insert(peer.id.clone(), peer);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Peer>> {
        let mut peers = self.peers.lock().unwrap();
        let removed = peers.remove(id);
        if let Some(ref peer) = removed {
            tracing::debug!("📒 [REGISTRY] remove {} ({} live)", peer.short_id(), peers.len());
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.lock().unwrap().get(id).cloned()
    }

    /// Find the peer holding exactly this name. O(n), fine at chat scale.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Peer>> {
        let peers = self.peers.lock().unwrap();
        peers
            .values()
            .find(|p| p.name.lock().unwrap().as_deref() == Some(name))
            .cloned()
    }

    pub fn name_exists_other(&self, name: &str, except_id: &str) -> bool {
        let peers = self.peers.lock().unwrap();
        peers
            .values()
            .any(|p| p.id != except_id && p.name.lock().unwrap().as_deref() == Some(name))
    }

    /// Shallow snapshot of every peer except `except_id`, safe to iterate
    /// without the lock. Writes to the snapshotted peers go through their own
    /// connection queues, so post-snapshot state changes are harmless.
    pub fn snapshot_except(&self, except_id: &str) -> Vec<Arc<Peer>> {
        let peers = self.peers.lock().unwrap();
        peers
            .values()
            .filter(|p| p.id != except_id)
            .cloned()
            .collect()
    }

    /// Validate and set a peer's name in one critical section.
    ///
    /// Returns the previous name on success. The name is stored exactly as
    /// received; blankness is judged on the trimmed string but no other
    /// normalization happens, so the duplicate check is an exact string
    /// comparison.
    pub fn try_set_name(&self, peer: &Peer, name: &str) -> Result<Option<String>, NameRejection> {
        if name.trim().is_empty() {
            return Err(NameRejection::Blank);
        }

        let peers = self.peers.lock().unwrap();
        let duplicate = peers
            .values()
            .any(|p| p.id != peer.id && p.name.lock().unwrap().as_deref() == Some(name));
        if duplicate {
            return Err(NameRejection::Duplicate);
        }

        let old = peer.name.lock().unwrap().replace(name.to_string());
        Ok(old)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().unwrap().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_peer(id: &str) -> Arc<Peer> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let _ = listener.accept().await.unwrap();
        let (conn, _reader) = Connection::spawn(client);
        Peer::new(id.to_string(), conn)
    }

    #[tokio::test]
    async fn membership_is_exact() {
        let registry = Registry::new();
        let a = test_peer("aaaa").await;
        let b = test_peer("bbbb").await;
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("aaaa").is_some());

        registry.remove("aaaa");
        assert!(registry.lookup("aaaa").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn name_uniqueness_is_enforced_under_one_lock() {
        let registry = Registry::new();
        let a = test_peer("aaaa").await;
        let b = test_peer("bbbb").await;
        registry.add(a.clone());
        registry.add(b.clone());

        assert_eq!(registry.try_set_name(&a, "Alice"), Ok(None));
        assert_eq!(
            registry.try_set_name(&b, "Alice"),
            Err(NameRejection::Duplicate)
        );
        assert!(b.name().is_none());

        // Exact-string comparison: a differently-spaced variant is distinct.
        assert_eq!(registry.try_set_name(&b, "Alice "), Ok(None));
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let registry = Registry::new();
        let a = test_peer("aaaa").await;
        registry.add(a.clone());
        assert_eq!(registry.try_set_name(&a, ""), Err(NameRejection::Blank));
        assert_eq!(registry.try_set_name(&a, "   "), Err(NameRejection::Blank));
    }

    #[tokio::test]
    async fn rename_returns_previous_name() {
        let registry = Registry::new();
        let a = test_peer("aaaa").await;
        registry.add(a.clone());
        registry.try_set_name(&a, "Alice").unwrap();
        let old = registry.try_set_name(&a, "Alicia").unwrap();
        assert_eq!(old.as_deref(), Some("Alice"));
        assert_eq!(a.name().as_deref(), Some("Alicia"));

        // Renaming to your own current name is a no-op success, not a
        // duplicate: the scan excludes the caller.
        let old = registry.try_set_name(&a, "Alicia").unwrap();
        assert_eq!(old.as_deref(), Some("Alicia"));
    }

    #[tokio::test]
    async fn snapshot_excludes_the_caller() {
        let registry = Registry::new();
        for id in ["aaaa", "bbbb", "cccc"] {
            registry.add(test_peer(id).await);
        }
        let others = registry.snapshot_except("bbbb");
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|p| p.id != "bbbb"));
    }

    #[tokio::test]
    async fn find_by_name_sees_only_named_peers() {
        let registry = Registry::new();
        let a = test_peer("aaaa").await;
        registry.add(a.clone());
        assert!(registry.find_by_name("Alice").is_none());
        registry.try_set_name(&a, "Alice").unwrap();
        assert_eq!(registry.find_by_name("Alice").unwrap().id, "aaaa");
    }
}
