//! Test doubles shared by the unit tests of this crate.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::StoreError;
use crate::memory::InMemoryObjectStore;
use crate::store::{ObjectStore, PutOutcome, PutRequest, RemoteHash};

/// Observes how much of a [`TrackingReader`] was consumed and whether it was
/// dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReaderProbe {
    read: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ReaderProbe {
    pub(crate) fn bytes_read(&self) -> usize {
        self.read.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory stream that reports consumption and closing through a probe.
#[derive(Debug)]
pub(crate) struct TrackingReader {
    data: Vec<u8>,
    pos: usize,
    probe: ReaderProbe,
}

impl TrackingReader {
    pub(crate) fn new(data: Vec<u8>) -> (Self, ReaderProbe) {
        let probe = ReaderProbe::default();
        let reader = Self {
            data,
            pos: 0,
            probe: probe.clone(),
        };
        (reader, probe)
    }
}

impl AsyncRead for TrackingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let remaining = &this.data[this.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        this.pos += n;
        this.probe.read.fetch_add(n, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl Drop for TrackingReader {
    fn drop(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// Stream that yields its data and then fails instead of reporting EOF.
#[derive(Debug)]
pub(crate) struct FailingReader {
    inner: TrackingReader,
}

impl FailingReader {
    pub(crate) fn new(data: Vec<u8>) -> (Self, ReaderProbe) {
        let (inner, probe) = TrackingReader::new(data);
        (Self { inner }, probe)
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.inner.pos >= self.inner.data.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Store wrapper that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    pub(crate) inner: InMemoryObjectStore,
    pub(crate) fail_head: AtomicBool,
    pub(crate) fail_put: AtomicBool,
    occupy_after_put: Mutex<Option<PathBuf>>,
    heads: AtomicUsize,
    puts: AtomicUsize,
}

impl FaultyStore {
    pub(crate) fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        store.inner.create_bucket(bucket);
        store
    }

    /// After the next successful put, replace the file at `path` with a
    /// non-empty directory so that removing it fails.
    pub(crate) fn occupy_after_put(&self, path: PathBuf) {
        if let Ok(mut slot) = self.occupy_after_put.lock() {
            *slot = Some(path);
        }
    }

    pub(crate) fn head_calls(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub(crate) fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<RemoteHash, StoreError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(StoreError::backend("simulated timeout"));
        }
        self.inner.head(bucket, key).await
    }

    async fn put(&self, request: PutRequest) -> Result<PutOutcome, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::backend("simulated 503 slow down"));
        }
        let outcome = self.inner.put(request).await?;
        let occupied = self.occupy_after_put.lock().ok().and_then(|mut slot| slot.take());
        if let Some(path) = occupied {
            tokio::fs::remove_file(&path).await?;
            tokio::fs::create_dir_all(path.join("occupied")).await?;
        }
        Ok(outcome)
    }
}
