// src/client/downloads.rs
//
// Incoming-file contexts, keyed by transferId.
//
// A context opens on FILE_SEND_REQUEST and closes on FILE_SEND_COMPLETE or
// as soon as the announced size has arrived, whichever comes first. The
// relay guarantees chunk order per transfer, so writes are sequential
// appends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::wire::packet::FileSendRequest;
use crate::wire::FileChunk;

struct IncomingFile {
    file_name: String,
    path: PathBuf,
    total: u64,
    received: u64,
    file: File,
}

/// A transfer that reached its end, ready to report to the user.
#[derive(Debug)]
pub struct FinishedDownload {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: u64,
    /// False when the sender completed the transfer short of the announced
    /// size (it died or lied); the partial file is kept.
    pub complete: bool,
}

pub struct Downloads {
    dir: PathBuf,
    active: HashMap<String, IncomingFile>,
}

impl Downloads {
    pub fn new(dir: PathBuf) -> Downloads {
        Downloads {
            dir,
            active: HashMap::new(),
        }
    }

    /// Open a context for an announced transfer. The downloads directory is
    /// created on first use; name collisions get a numeric suffix.
    pub async fn begin(&mut self, request: &FileSendRequest) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating downloads dir {:?}", self.dir))?;

        let path = unique_path(&self.dir, &request.file_name).await;
        let file = File::create(&path)
            .await
            .with_context(|| format!("creating {path:?}"))?;

        tracing::info!(
            "📥 [FILE] incoming {} ({} bytes) -> {:?}",
            request.file_name,
            request.file_size,
            path
        );
        self.active.insert(
            request.transfer_id.clone(),
            IncomingFile {
                file_name: request.file_name.clone(),
                path: path.clone(),
                total: request.file_size,
                received: 0,
                file,
            },
        );
        Ok(path)
    }

    /// Append one chunk. Returns a finished record once the announced size
    /// has fully arrived. Chunks for unknown transfers are dropped.
    pub async fn write_chunk(&mut self, chunk: &FileChunk) -> Result<Option<FinishedDownload>> {
        let Some(incoming) = self.active.get_mut(&chunk.transfer_id) else {
            tracing::debug!(
                "📥 [FILE] chunk for unknown transfer {}, dropped",
                chunk.transfer_id
            );
            return Ok(None);
        };

        // Trailing bytes past the announced size are truncated, not written.
        let remaining = incoming.total.saturating_sub(incoming.received);
        let take = (chunk.data.len() as u64).min(remaining) as usize;
        incoming
            .file
            .write_all(&chunk.data[..take])
            .await
            .with_context(|| format!("writing {:?}", incoming.path))?;
        incoming.received += take as u64;

        if incoming.received >= incoming.total {
            return self.finish(&chunk.transfer_id).await;
        }
        Ok(None)
    }

    /// Sender declared the transfer complete. Closes the context whether or
    /// not every announced byte arrived.
    pub async fn complete(&mut self, transfer_id: &str) -> Result<Option<FinishedDownload>> {
        self.finish(transfer_id).await
    }

    pub fn progress(&self, transfer_id: &str) -> Option<(u64, u64)> {
        self.active
            .get(transfer_id)
            .map(|incoming| (incoming.received, incoming.total))
    }

    async fn finish(&mut self, transfer_id: &str) -> Result<Option<FinishedDownload>> {
        let Some(mut incoming) = self.active.remove(transfer_id) else {
            return Ok(None);
        };
        incoming
            .file
            .flush()
            .await
            .with_context(|| format!("flushing {:?}", incoming.path))?;

        let complete = incoming.received >= incoming.total;
        if !complete {
            tracing::warn!(
                "⚠️ [FILE] transfer {} ended at {}/{} bytes",
                transfer_id,
                incoming.received,
                incoming.total
            );
        }
        Ok(Some(FinishedDownload {
            file_name: incoming.file_name,
            path: incoming.path,
            bytes: incoming.received,
            complete,
        }))
    }
}

/// First free variant of `name` in `dir`: `name`, then `stem (1).ext`,
/// `stem (2).ext`, …
async fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !path_exists(&candidate).await {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for n in 1u32.. {
        let variant = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(variant);
        if !path_exists(&candidate).await {
            return candidate;
        }
    }
    unreachable!("u32 suffixes exhausted");
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(transfer_id: &str, file_name: &str, file_size: u64) -> FileSendRequest {
        FileSendRequest {
            target: "me".into(),
            transfer_id: transfer_id.into(),
            file_name: file_name.into(),
            file_size,
        }
    }

    #[tokio::test]
    async fn chunks_assemble_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = Downloads::new(dir.path().to_path_buf());
        downloads.begin(&request("T1", "data.bin", 6)).await.unwrap();

        let first = FileChunk {
            transfer_id: "T1".into(),
            seq: 0,
            data: Bytes::from_static(b"abc"),
        };
        assert!(downloads.write_chunk(&first).await.unwrap().is_none());
        assert_eq!(downloads.progress("T1"), Some((3, 6)));

        let second = FileChunk {
            transfer_id: "T1".into(),
            seq: 1,
            data: Bytes::from_static(b"def"),
        };
        let finished = downloads.write_chunk(&second).await.unwrap().unwrap();
        assert!(finished.complete);
        assert_eq!(finished.bytes, 6);
        assert_eq!(std::fs::read(&finished.path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn complete_closes_a_short_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = Downloads::new(dir.path().to_path_buf());
        downloads.begin(&request("T1", "data.bin", 100)).await.unwrap();

        let chunk = FileChunk {
            transfer_id: "T1".into(),
            seq: 0,
            data: Bytes::from_static(b"only this"),
        };
        downloads.write_chunk(&chunk).await.unwrap();
        let finished = downloads.complete("T1").await.unwrap().unwrap();
        assert!(!finished.complete);
        assert_eq!(finished.bytes, 9);

        // Context is gone: a second complete is a no-op.
        assert!(downloads.complete("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_trailing_bytes_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = Downloads::new(dir.path().to_path_buf());
        downloads.begin(&request("T1", "tiny.bin", 4)).await.unwrap();

        let chunk = FileChunk {
            transfer_id: "T1".into(),
            seq: 0,
            data: Bytes::from_static(b"123456789"),
        };
        let finished = downloads.write_chunk(&chunk).await.unwrap().unwrap();
        assert!(finished.complete);
        assert_eq!(std::fs::read(&finished.path).unwrap(), b"1234");
    }

    #[tokio::test]
    async fn colliding_names_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = Downloads::new(dir.path().to_path_buf());

        let first = downloads.begin(&request("T1", "cat.jpg", 0)).await.unwrap();
        let second = downloads.begin(&request("T2", "cat.jpg", 0)).await.unwrap();
        let third = downloads.begin(&request("T3", "cat.jpg", 0)).await.unwrap();

        assert_eq!(first.file_name().unwrap(), "cat.jpg");
        assert_eq!(second.file_name().unwrap(), "cat (1).jpg");
        assert_eq!(third.file_name().unwrap(), "cat (2).jpg");
    }

    #[tokio::test]
    async fn unknown_transfer_chunks_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = Downloads::new(dir.path().to_path_buf());
        let chunk = FileChunk {
            transfer_id: "ghost".into(),
            seq: 0,
            data: Bytes::from_static(b"x"),
        };
        assert!(downloads.write_chunk(&chunk).await.unwrap().is_none());
    }
}
