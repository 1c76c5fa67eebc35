//! Resource Entry - per-asset bookkeeping and load state machine
//!
//! ```text
//! Unloaded ──request──▶ Loading ──ok──▶ Ready
//!     ▲                   │  ▲            │
//!     │                   err └──reload───┤
//!     │                   ▼               │
//!     └─────unload───── Failed ◀──────────┘
//! ```
//!
//! Every transition and every payload read or swap happens under the
//! entry's own lock. The lock is never held while a loader runs.

use crate::asset::{ErasedAsset, TypeTag};
use crate::error::LoadError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Load state of an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadState {
    /// Known, but no payload and no load in flight
    Unloaded = 0,
    /// Exactly one load is in flight
    Loading = 1,
    /// Payload attached
    Ready = 2,
    /// Last load attempt failed
    Failed = 3,
}

impl LoadState {
    /// Whether a load attempt has resolved
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// Dependency requested by a loader through its request context
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub type_name: &'static str,
    pub key: String,
}

/// Proof of having moved an entry into `Loading`.
///
/// Completion with a ticket from an older attempt is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LoadTicket {
    attempt: u64,
}

struct EntryInner {
    state: LoadState,
    payload: Option<ErasedAsset>,
    byte_size: usize,
    last_access: Instant,
    generation: u32,
    attempt: u64,
    failure: Option<LoadError>,
    load_time: Option<Duration>,
    dependencies: Vec<DependencyRef>,
}

/// Bookkeeping record for one logical asset
pub struct ResourceEntry {
    key: String,
    tag: TypeTag,
    inner: Mutex<EntryInner>,
    handles: AtomicUsize,
}

impl ResourceEntry {
    /// Create an entry in the `Unloaded` state
    pub(crate) fn new(key: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            key: key.into(),
            tag,
            inner: Mutex::new(EntryInner {
                state: LoadState::Unloaded,
                payload: None,
                byte_size: 0,
                last_access: Instant::now(),
                generation: 0,
                attempt: 0,
                failure: None,
                load_time: None,
                dependencies: Vec::new(),
            }),
            handles: AtomicUsize::new(0),
        }
    }

    /// Origin key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Type of the payload this entry holds
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        self.inner.lock().state
    }

    /// Typed and untyped handles currently pointing at this entry
    pub fn handle_count(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }

    pub(crate) fn handle_acquired(&self) {
        self.handles.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn handle_released(&self) {
        self.handles.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of completed successful loads
    pub fn generation(&self) -> u32 {
        self.inner.lock().generation
    }

    /// Reason of the last failed attempt, while `Failed`
    pub fn failure(&self) -> Option<LoadError> {
        self.inner.lock().failure.clone()
    }

    /// Bytes held by the attached payload (0 if none)
    pub fn byte_size(&self) -> usize {
        self.inner.lock().byte_size
    }

    /// Last request, retrieve or completed load
    pub fn last_access(&self) -> Instant {
        self.inner.lock().last_access
    }

    /// Duration of the last completed attempt
    pub fn load_time(&self) -> Option<Duration> {
        self.inner.lock().load_time
    }

    /// Dependencies requested during the last completed attempt
    pub fn dependencies(&self) -> Vec<DependencyRef> {
        self.inner.lock().dependencies.clone()
    }

    /// Whether a payload is attached (Ready, or Loading during a reload)
    pub fn is_resident(&self) -> bool {
        self.inner.lock().payload.is_some()
    }

    /// Payload if `Ready`, refreshing the access time
    pub fn retrieve(&self) -> Option<ErasedAsset> {
        let mut inner = self.inner.lock();
        if inner.state != LoadState::Ready {
            return None;
        }
        inner.last_access = Instant::now();
        inner.payload.clone()
    }

    /// Payload of the most recent successful load, even while reloading
    pub fn last_ready(&self) -> Option<ErasedAsset> {
        self.inner.lock().payload.clone()
    }

    /// Mark the entry as used at `now`
    pub(crate) fn touch(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if now > inner.last_access {
            inner.last_access = now;
        }
    }

    /// Move to `Loading` from any state other than `Loading`
    pub(crate) fn begin_load(&self) -> Option<LoadTicket> {
        let mut inner = self.inner.lock();
        if inner.state == LoadState::Loading {
            return None;
        }
        Some(Self::arm(&mut inner))
    }

    /// Move to `Loading` only from `Unloaded`
    pub(crate) fn begin_load_if_unloaded(&self) -> Option<LoadTicket> {
        let mut inner = self.inner.lock();
        if inner.state != LoadState::Unloaded {
            return None;
        }
        Some(Self::arm(&mut inner))
    }

    fn arm(inner: &mut EntryInner) -> LoadTicket {
        inner.state = LoadState::Loading;
        inner.failure = None;
        inner.attempt += 1;
        LoadTicket {
            attempt: inner.attempt,
        }
    }

    /// `Loading -> Ready`. Returns the replaced payload so the caller drops
    /// it outside the lock, or `Err(payload)` if the ticket is stale.
    pub(crate) fn complete_ready(
        &self,
        ticket: LoadTicket,
        payload: ErasedAsset,
        byte_size: usize,
        dependencies: Vec<DependencyRef>,
        load_time: Duration,
    ) -> Result<Option<ErasedAsset>, ErasedAsset> {
        let mut inner = self.inner.lock();
        if !Self::is_current(&inner, ticket) {
            return Err(payload);
        }

        let previous = inner.payload.replace(payload);
        inner.state = LoadState::Ready;
        inner.byte_size = byte_size;
        inner.generation = inner.generation.wrapping_add(1);
        inner.last_access = Instant::now();
        inner.failure = None;
        inner.load_time = Some(load_time);
        inner.dependencies = dependencies;
        Ok(previous)
    }

    /// `Loading -> Failed`. Drops any previous payload. Returns `None` if the
    /// ticket is stale.
    pub(crate) fn complete_failed(
        &self,
        ticket: LoadTicket,
        error: LoadError,
        dependencies: Vec<DependencyRef>,
        load_time: Duration,
    ) -> Option<Option<ErasedAsset>> {
        let mut inner = self.inner.lock();
        if !Self::is_current(&inner, ticket) {
            return None;
        }

        let previous = inner.payload.take();
        inner.state = LoadState::Failed;
        inner.byte_size = 0;
        inner.last_access = Instant::now();
        inner.failure = Some(error);
        inner.load_time = Some(load_time);
        inner.dependencies = dependencies;
        Some(previous)
    }

    fn is_current(inner: &EntryInner, ticket: LoadTicket) -> bool {
        inner.state == LoadState::Loading && inner.attempt == ticket.attempt
    }

    /// `Ready | Failed -> Unloaded`. Returns the dropped payload, or the
    /// current state if the entry cannot be unloaded.
    pub(crate) fn unload(&self) -> Result<Option<ErasedAsset>, LoadState> {
        self.unload_if(|_| true)
    }

    /// Unload a `Ready` entry whose last access is older than `threshold` at `now`.
    ///
    /// `Failed` entries are left alone so the failure stays queryable.
    pub(crate) fn unload_if_idle(
        &self,
        now: Instant,
        threshold: Duration,
    ) -> Result<Option<ErasedAsset>, LoadState> {
        self.unload_if(|inner| {
            inner.state == LoadState::Ready
                && now.saturating_duration_since(inner.last_access) > threshold
        })
    }

    /// Unload only a `Ready` entry
    pub(crate) fn unload_if_ready(&self) -> Result<Option<ErasedAsset>, LoadState> {
        self.unload_if(|inner| inner.state == LoadState::Ready)
    }

    fn unload_if(
        &self,
        predicate: impl FnOnce(&EntryInner) -> bool,
    ) -> Result<Option<ErasedAsset>, LoadState> {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() || !predicate(&inner) {
            return Err(inner.state);
        }

        inner.state = LoadState::Unloaded;
        inner.byte_size = 0;
        inner.failure = None;
        Ok(inner.payload.take())
    }
}

impl core::fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResourceEntry")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("byte_size", &inner.byte_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use std::sync::Arc;

    struct Texture(u32);
    impl Asset for Texture {
        const TYPE_NAME: &'static str = "Texture";
    }

    fn entry() -> ResourceEntry {
        ResourceEntry::new("grass.png", TypeTag::of::<Texture>())
    }

    fn payload(v: u32) -> ErasedAsset {
        Arc::new(Texture(v))
    }

    fn value(asset: &ErasedAsset) -> u32 {
        asset.downcast_ref::<Texture>().unwrap().0
    }

    #[test]
    fn test_initial_state() {
        let entry = entry();
        assert_eq!(entry.state(), LoadState::Unloaded);
        assert_eq!(entry.key(), "grass.png");
        assert_eq!(entry.generation(), 0);
        assert!(entry.retrieve().is_none());
        assert!(!entry.is_resident());
    }

    #[test]
    fn test_load_to_ready() {
        let entry = entry();
        let ticket = entry.begin_load().unwrap();
        assert_eq!(entry.state(), LoadState::Loading);
        assert!(entry.retrieve().is_none());

        let previous = entry
            .complete_ready(ticket, payload(7), 64, Vec::new(), Duration::from_millis(3))
            .unwrap();
        assert!(previous.is_none());

        assert_eq!(entry.state(), LoadState::Ready);
        assert_eq!(entry.generation(), 1);
        assert_eq!(entry.byte_size(), 64);
        assert_eq!(entry.load_time(), Some(Duration::from_millis(3)));
        assert_eq!(value(&entry.retrieve().unwrap()), 7);
    }

    #[test]
    fn test_only_one_loader_wins() {
        let entry = entry();
        assert!(entry.begin_load().is_some());
        assert!(entry.begin_load().is_none());
        assert!(entry.begin_load_if_unloaded().is_none());
    }

    #[test]
    fn test_failure_records_reason() {
        let entry = entry();
        let ticket = entry.begin_load().unwrap();
        entry
            .complete_failed(ticket, LoadError::custom("corrupt"), Vec::new(), Duration::ZERO)
            .unwrap();

        assert_eq!(entry.state(), LoadState::Failed);
        assert_eq!(entry.failure(), Some(LoadError::custom("corrupt")));
        assert!(entry.retrieve().is_none());

        // Failed entries do not re-arm on a plain request
        assert!(entry.begin_load_if_unloaded().is_none());
        // but do on an explicit reload
        assert!(entry.begin_load().is_some());
        assert_eq!(entry.failure(), None);
    }

    #[test]
    fn test_reload_keeps_previous_payload_until_swap() {
        let entry = entry();
        let t1 = entry.begin_load().unwrap();
        entry
            .complete_ready(t1, payload(1), 8, Vec::new(), Duration::ZERO)
            .unwrap();

        let t2 = entry.begin_load().unwrap();
        assert!(entry.retrieve().is_none());
        assert_eq!(value(&entry.last_ready().unwrap()), 1);

        let previous = entry
            .complete_ready(t2, payload(2), 8, Vec::new(), Duration::ZERO)
            .unwrap();
        assert_eq!(value(&previous.unwrap()), 1);
        assert_eq!(value(&entry.retrieve().unwrap()), 2);
        assert_eq!(entry.generation(), 2);
    }

    #[test]
    fn test_failed_reload_drops_payload() {
        let entry = entry();
        let t1 = entry.begin_load().unwrap();
        entry
            .complete_ready(t1, payload(1), 8, Vec::new(), Duration::ZERO)
            .unwrap();

        let t2 = entry.begin_load().unwrap();
        let dropped = entry
            .complete_failed(t2, LoadError::custom("gone"), Vec::new(), Duration::ZERO)
            .unwrap();
        assert!(dropped.is_some());
        assert!(entry.last_ready().is_none());
        assert_eq!(entry.byte_size(), 0);
    }

    #[test]
    fn test_stale_ticket_ignored() {
        let entry = entry();
        let t1 = entry.begin_load().unwrap();
        entry
            .complete_ready(t1, payload(1), 8, Vec::new(), Duration::ZERO)
            .unwrap();

        // Completing twice with the same ticket is rejected
        assert!(entry
            .complete_ready(t1, payload(9), 8, Vec::new(), Duration::ZERO)
            .is_err());
        assert!(entry
            .complete_failed(t1, LoadError::custom("late"), Vec::new(), Duration::ZERO)
            .is_none());
        assert_eq!(value(&entry.retrieve().unwrap()), 1);
    }

    #[test]
    fn test_unload() {
        let entry = entry();
        assert_eq!(entry.unload().unwrap_err(), LoadState::Unloaded);

        let ticket = entry.begin_load().unwrap();
        assert_eq!(entry.unload().unwrap_err(), LoadState::Loading);

        entry
            .complete_ready(ticket, payload(3), 16, Vec::new(), Duration::ZERO)
            .unwrap();
        let dropped = entry.unload().unwrap();
        assert_eq!(value(&dropped.unwrap()), 3);
        assert_eq!(entry.state(), LoadState::Unloaded);
        assert_eq!(entry.byte_size(), 0);

        // An unloaded entry re-arms on the next request
        assert!(entry.begin_load_if_unloaded().is_some());
    }

    #[test]
    fn test_unload_if_idle() {
        let entry = entry();
        let ticket = entry.begin_load().unwrap();
        entry
            .complete_ready(ticket, payload(1), 8, Vec::new(), Duration::ZERO)
            .unwrap();

        let now = entry.last_access();
        let threshold = Duration::from_secs(10);

        assert!(entry.unload_if_idle(now + Duration::from_secs(5), threshold).is_err());
        assert_eq!(entry.state(), LoadState::Ready);

        assert!(entry.unload_if_idle(now + Duration::from_secs(11), threshold).is_ok());
        assert_eq!(entry.state(), LoadState::Unloaded);
    }

    #[test]
    fn test_unload_if_ready_skips_failed() {
        let entry = entry();
        let ticket = entry.begin_load().unwrap();
        entry
            .complete_failed(ticket, LoadError::custom("x"), Vec::new(), Duration::ZERO)
            .unwrap();

        assert_eq!(entry.unload_if_ready().unwrap_err(), LoadState::Failed);
    }

    #[test]
    fn test_unload_if_idle_skips_failed() {
        let entry = entry();
        let ticket = entry.begin_load().unwrap();
        entry
            .complete_failed(ticket, LoadError::custom("x"), Vec::new(), Duration::ZERO)
            .unwrap();

        let later = entry.last_access() + Duration::from_secs(60);
        assert_eq!(
            entry.unload_if_idle(later, Duration::from_secs(1)).unwrap_err(),
            LoadState::Failed
        );
        assert_eq!(entry.failure(), Some(LoadError::custom("x")));
    }
}
