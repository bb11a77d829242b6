//! Artifact store wrapper with failure injection for E2E tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use ironvuln_engine::{ArtifactKind, ArtifactStore, ImageIdentity, MemoryStore, StoreError};

/// In-memory store that counts calls and can be told to fail reads or writes.
#[derive(Clone, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    state: Arc<StoreState>,
}

#[derive(Default)]
struct StoreState {
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
    gets: AtomicUsize,
    puts: AtomicUsize,
    events: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` fail (or succeed again).
    pub fn fail_gets(&self, fail: bool) {
        self.state.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `put` fail (or succeed again).
    pub fn fail_puts(&self, fail: bool) {
        self.state.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.state.puts.load(Ordering::SeqCst)
    }

    /// Appends an entry to the shared event log.
    ///
    /// Successful writes log `put:<kind>`; other test doubles may log their
    /// own calls here to check ordering against writes.
    pub fn record(&self, event: impl Into<String>) {
        self.state.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().unwrap().clone()
    }

    /// Stores an artifact directly, bypassing failure injection.
    pub async fn preload(&self, image: &ImageIdentity, kind: ArtifactKind, content: &[u8]) {
        self.inner
            .put(image, kind, Bytes::copy_from_slice(content))
            .await
            .unwrap();
    }

    /// Reads an artifact directly, bypassing failure injection.
    pub async fn peek(&self, image: &ImageIdentity, kind: ArtifactKind) -> Option<Bytes> {
        self.inner.get(image, kind).await.unwrap()
    }
}

impl ArtifactStore for RecordingStore {
    async fn get(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
    ) -> Result<Option<Bytes>, StoreError> {
        self.state.gets.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_gets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted read failure".to_owned()));
        }
        self.inner.get(image, kind).await
    }

    async fn put(
        &self,
        image: &ImageIdentity,
        kind: ArtifactKind,
        content: Bytes,
    ) -> Result<(), StoreError> {
        self.state.puts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted write failure".to_owned()));
        }
        self.inner.put(image, kind, content).await?;
        self.record(format!("put:{kind}"));
        Ok(())
    }
}
