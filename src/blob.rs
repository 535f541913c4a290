//!
//! Large-object transfer engine
//! -----------------------------
//! Chunked upload/download of blob payloads out-of-band from row data.
//! Uploads go as a series of `blob_upload/{id}` POSTs with an offset and a
//! base64 chunk body, committed by a final empty chunk flagged `last`;
//! downloads stream the raw `blob_download/{id}` response into the caller's
//! sink. Memory use is bounded by the chunk size regardless of object size.
//!
//! The shared `TransferControl` is the one sanctioned cross-thread sharing
//! point in the driver: a UI thread may poll the progress cell and flip the
//! cancellation flag while the transfer runs elsewhere.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::{self, ClientError, ClientResult, TransportStatus};
use crate::session::Session;

/// Fixed transfer chunk size.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Shared progress/cancellation pair for one in-flight transfer. Progress is
/// a 0-100 percent cell; both members use atomic semantics so a different
/// thread than the one transferring may observe and flip them.
#[derive(Debug, Default)]
pub struct TransferControl {
    progress: AtomicU8,
    cancelled: AtomicBool,
}

impl TransferControl {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn set_progress(&self, pct: u8) {
        self.progress.store(pct, Ordering::Relaxed);
    }
}

/// Client-side identifier for an object to be uploaded. Minted before the
/// owning statement executes and referenced by a BLOB-tagged parameter.
pub fn mint_blob_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Proportional progress, clamped to 99 until the transfer completes.
/// Unknown or zero total length leaves the cell untouched.
fn advance(control: &TransferControl, done: u64, total: Option<u64>) {
    if let Some(total) = total {
        if total > 0 {
            let pct = (done.saturating_mul(100) / total).min(99) as u8;
            control.set_progress(pct);
        }
    }
}

impl Session {
    /// Upload a byte source under a server-issued object identifier.
    ///
    /// The cancellation flag is checked before every chunk; once observed the
    /// transfer aborts with a cancelled error and the partially written
    /// remote object is left in an undefined state. Progress reaches 100
    /// only after the commit chunk succeeded.
    pub async fn upload_blob<R>(
        &mut self,
        id: &str,
        source: &mut R,
        total_len: Option<u64>,
        control: &TransferControl,
    ) -> ClientResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = format!("blob_upload/{id}");
        let mut offset: u64 = 0;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if control.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let n = source.read(&mut buf).await.map_err(ClientError::from)?;
            if n == 0 {
                break;
            }
            let fields = vec![
                ("offset".to_string(), offset.to_string()),
                ("data".to_string(), BASE64.encode(&buf[..n])),
                ("last".to_string(), "false".to_string()),
            ];
            self.call_scalar(&path, fields).await?;
            offset += n as u64;
            advance(control, offset, total_len);
        }
        if control.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        // Empty final chunk commits the object server-side.
        let fields = vec![
            ("offset".to_string(), offset.to_string()),
            ("data".to_string(), String::new()),
            ("last".to_string(), "true".to_string()),
        ];
        self.call_scalar(&path, fields).await?;
        control.set_progress(100);
        debug!(id, bytes = offset, "blob upload complete");
        Ok(())
    }

    /// Download a server object into a byte sink. Returns the byte count.
    ///
    /// Blob bodies are raw bytes and never gzip-compressed, whatever the
    /// session negotiated for tabular payloads.
    pub async fn download_blob<W>(
        &mut self,
        id: &str,
        sink: &mut W,
        control: &TransferControl,
    ) -> ClientResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = format!("blob_download/{id}");
        let fields = vec![("session_id".to_string(), self.token().to_string())];
        let mut resp = self.post_op(&path, fields).await?;
        let status = self
            .last_status()
            .cloned()
            .unwrap_or_else(|| TransportStatus::new(0, ""));
        if !(200..300).contains(&status.code) {
            let body = resp.bytes().await?;
            return Err(error::translate(&status, &body)
                .unwrap_or_else(|| ClientError::protocol("unclassifiable response")));
        }
        let total = resp.content_length();
        let mut received: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            if control.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            sink.write_all(&chunk).await.map_err(ClientError::from)?;
            received += chunk.len() as u64;
            advance(control, received, total);
        }
        sink.flush().await.map_err(ClientError::from)?;
        control.set_progress(100);
        debug!(id, bytes = received, "blob download complete");
        Ok(received)
    }
}
