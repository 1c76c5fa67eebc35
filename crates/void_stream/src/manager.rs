//! Streaming Manager - the public façade
//!
//! Owns the loader registry, one resource table per registered type, the
//! scheduler and the optional diagnostic sink. Setup (`register_*`,
//! `set_sink`) needs `&mut self` and is refused once the first request has
//! been issued; everything after that works through `&self` from any thread.

use crate::asset::{Asset, TypeTag};
use crate::config::StreamingConfig;
use crate::context::{LoadMode, RequestContext};
use crate::entry::{DependencyRef, LoadState, LoadTicket, ResourceEntry};
use crate::error::{LoadError, LoadResult, StreamError, StreamResult};
use crate::event::{DiagnosticSink, EvictReason, StreamEvent};
use crate::handle::{Handle, UntypedHandle};
use crate::loader::{AssetLoader, ErasedLoader, FnLoader, LoadedAsset, LoaderRegistry};
use crate::table::ResourceTable;
use core::any::TypeId;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use void_jobs::{panic_message, Job, Scheduler, WorkerPool, WorkerPoolConfig};

/// Counts of entries by state plus load totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Entries across all tables
    pub entries: usize,
    pub unloaded: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
    /// Bytes held by attached payloads
    pub resident_bytes: usize,
    /// Load attempts dispatched
    pub loads_started: u64,
    /// Attempts that ended `Ready`
    pub loads_completed: u64,
    /// Attempts that ended `Failed`
    pub loads_failed: u64,
}

/// What one `tick` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries unloaded for exceeding the idle timeout
    pub idle_evicted: usize,
    /// Entries unloaded to get under the memory budget
    pub budget_evicted: usize,
    /// Unloaded entries removed from their tables
    pub purged: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.idle_evicted == 0 && self.budget_evicted == 0 && self.purged == 0
    }
}

#[derive(Default)]
struct Counters {
    loads_started: AtomicU64,
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
}

/// State shared between the manager, its clones and in-flight loads
pub(crate) struct Shared {
    config: StreamingConfig,
    registry: LoaderRegistry,
    tables: HashMap<TypeId, ResourceTable>,
    scheduler: Arc<dyn Scheduler>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    frozen: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn table(&self, tag: TypeTag) -> Option<&ResourceTable> {
        self.tables.get(&tag.id())
    }

    fn emit(&self, event: impl FnOnce() -> StreamEvent) {
        if let Some(sink) = &self.sink {
            sink.on_event(&event());
        }
    }

    /// Request path shared by callers and loaders resolving dependencies
    pub(crate) fn request<T: Asset>(
        self: &Arc<Self>,
        key: &str,
        mode: LoadMode,
    ) -> StreamResult<Handle<T>> {
        let tag = TypeTag::of::<T>();
        let table = self
            .table(tag)
            .ok_or_else(|| StreamError::UnknownType(T::TYPE_NAME.to_string()))?;
        self.frozen.store(true, Ordering::Release);

        let acquired = table.acquire(key);
        if !acquired.inserted {
            acquired.entry.touch(Instant::now());
        }

        match acquired.ticket {
            Some(ticket) => self.dispatch(&acquired.entry, ticket, mode, false),
            None => log::debug!(
                "{} '{}' already known ({:?})",
                tag,
                key,
                acquired.entry.state()
            ),
        }

        Ok(Handle::new(acquired.entry))
    }

    fn reload_entry(self: &Arc<Self>, entry: &Arc<ResourceEntry>, mode: LoadMode) -> bool {
        let Some(table) = self.table(entry.tag()) else {
            return false;
        };
        self.frozen.store(true, Ordering::Release);

        let Some(ticket) = entry.begin_load() else {
            log::debug!("{} '{}' is already loading, reload ignored", entry.tag(), entry.key());
            return false;
        };

        // A purged entry goes back under its key so later requests share it
        if !table.reinstate(entry) {
            log::debug!(
                "{} '{}' was replaced in its table, reloading detached entry",
                entry.tag(),
                entry.key()
            );
        }

        self.dispatch(entry, ticket, mode, true);
        true
    }

    /// Run or schedule the load for an entry this caller moved to `Loading`
    fn dispatch(
        self: &Arc<Self>,
        entry: &Arc<ResourceEntry>,
        ticket: LoadTicket,
        mode: LoadMode,
        reload: bool,
    ) {
        self.counters.loads_started.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "{} {} '{}' ({:?})",
            if reload { "Reloading" } else { "Loading" },
            entry.tag(),
            entry.key(),
            mode
        );
        self.emit(|| StreamEvent::Requested {
            type_name: entry.tag().name(),
            key: entry.key().to_string(),
            mode,
            reload,
        });

        if mode.runs_inline() {
            self.run_load(entry, ticket, mode);
            return;
        }

        let shared = Arc::clone(self);
        let job_entry = Arc::clone(entry);
        let job: Job = Box::new(move || shared.run_load(&job_entry, ticket, mode));

        if let Err(e) = self.scheduler.schedule(job) {
            log::warn!("Could not schedule load of {} '{}': {}", entry.tag(), entry.key(), e);
            self.finish(
                entry,
                ticket,
                Err(LoadError::Scheduler(e.to_string())),
                Vec::new(),
                Duration::ZERO,
            );
        }
    }

    fn run_load(self: &Arc<Self>, entry: &Arc<ResourceEntry>, ticket: LoadTicket, mode: LoadMode) {
        let tag = entry.tag();
        let Some(loader) = self.registry.get(tag) else {
            self.finish(
                entry,
                ticket,
                Err(LoadError::custom(format!("no loader for {}", tag))),
                Vec::new(),
                Duration::ZERO,
            );
            return;
        };

        let started = Instant::now();
        let mut ctx = RequestContext::new(self, entry.key(), mode);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            loader.load_erased(&mut ctx, entry.key())
        }));
        let dependencies = ctx.into_dependencies();

        let outcome = match result {
            Ok(Ok(loaded)) if loaded.tag() == tag => Ok(loaded),
            Ok(Ok(loaded)) => Err(LoadError::TypeMismatch {
                expected: tag.name(),
                found: loaded.tag().name(),
            }),
            Ok(Err(e)) => Err(e),
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!("Loader for {} '{}' panicked: {}", tag, entry.key(), message);
                Err(LoadError::Panicked(message))
            }
        };

        self.finish(entry, ticket, outcome, dependencies, started.elapsed());
    }

    /// Resolve a load attempt. Replaced payloads are dropped after the
    /// entry lock is released.
    fn finish(
        &self,
        entry: &ResourceEntry,
        ticket: LoadTicket,
        outcome: LoadResult<LoadedAsset>,
        dependencies: Vec<DependencyRef>,
        load_time: Duration,
    ) {
        let tag = entry.tag();
        match outcome {
            Ok(loaded) => {
                let (payload, byte_size) = loaded.into_parts();
                match entry.complete_ready(ticket, payload, byte_size, dependencies, load_time) {
                    Ok(previous) => {
                        drop(previous);
                        self.counters.loads_completed.fetch_add(1, Ordering::Relaxed);
                        let generation = entry.generation();
                        log::info!(
                            "Loaded {} '{}' ({} bytes, {:?})",
                            tag,
                            entry.key(),
                            byte_size,
                            load_time
                        );
                        self.emit(|| StreamEvent::Ready {
                            type_name: tag.name(),
                            key: entry.key().to_string(),
                            byte_size,
                            load_time,
                            generation,
                        });
                    }
                    Err(stale) => {
                        drop(stale);
                        log::debug!("Discarded stale result for {} '{}'", tag, entry.key());
                    }
                }
            }
            Err(error) => {
                match entry.complete_failed(ticket, error.clone(), dependencies, load_time) {
                    Some(previous) => {
                        drop(previous);
                        self.counters.loads_failed.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Failed to load {} '{}': {}", tag, entry.key(), error);
                        self.emit(|| StreamEvent::Failed {
                            type_name: tag.name(),
                            key: entry.key().to_string(),
                            reason: error,
                        });
                    }
                    None => {
                        log::debug!("Discarded stale failure for {} '{}'", tag, entry.key());
                    }
                }
            }
        }
    }

    fn evicted(&self, entry: &ResourceEntry, reason: EvictReason) {
        log::debug!("Unloaded {} '{}' ({:?})", entry.tag(), entry.key(), reason);
        self.emit(|| StreamEvent::Evicted {
            type_name: entry.tag().name(),
            key: entry.key().to_string(),
            reason,
        });
    }

    fn unload_entry(&self, entry: &ResourceEntry) -> bool {
        match entry.unload() {
            Ok(previous) => {
                drop(previous);
                self.evicted(entry, EvictReason::Explicit);
                true
            }
            Err(state) => {
                log::debug!(
                    "Unload of {} '{}' ignored in state {:?}",
                    entry.tag(),
                    entry.key(),
                    state
                );
                false
            }
        }
    }

    fn all_entries(&self) -> Vec<Arc<ResourceEntry>> {
        self.tables
            .values()
            .flat_map(|table| table.snapshot())
            .collect()
    }

    fn evict_idle(&self, now: Instant, threshold: Duration) -> usize {
        let mut evicted = 0;
        for entry in self.all_entries() {
            if self.config.keep_referenced && entry.handle_count() > 0 {
                continue;
            }
            if let Ok(previous) = entry.unload_if_idle(now, threshold) {
                drop(previous);
                self.evicted(&entry, EvictReason::Idle);
                evicted += 1;
            }
        }
        evicted
    }

    fn evict_over_budget(&self, budget: usize) -> usize {
        let mut ready: Vec<_> = self
            .all_entries()
            .into_iter()
            .filter(|entry| entry.state() == LoadState::Ready)
            .map(|entry| (entry.last_access(), entry))
            .collect();

        let mut resident: usize = ready.iter().map(|(_, entry)| entry.byte_size()).sum();
        if resident <= budget {
            return 0;
        }

        ready.sort_by_key(|(last_access, _)| *last_access);

        let mut evicted = 0;
        for (_, entry) in ready {
            if resident <= budget {
                break;
            }
            let size = entry.byte_size();
            if let Ok(previous) = entry.unload_if_ready() {
                drop(previous);
                resident = resident.saturating_sub(size);
                self.evicted(&entry, EvictReason::Budget);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Streaming manager
///
/// Cloning is cheap and shares all state. A clone made before the last
/// `register_*` call makes registration fail with `RegistryFrozen`.
#[derive(Clone)]
pub struct StreamingManager {
    shared: Arc<Shared>,
}

impl StreamingManager {
    /// Create a manager on top of an existing scheduler
    pub fn new(config: StreamingConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry: LoaderRegistry::new(),
                tables: HashMap::new(),
                scheduler,
                sink: None,
                frozen: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a manager with its own worker pool
    pub fn spawn(config: StreamingConfig) -> StreamResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(WorkerPoolConfig::from(&config))?;
        log::info!(
            "Streaming manager started with {} workers",
            pool.worker_count()
        );
        Ok(Self::new(config, Arc::new(pool)))
    }

    fn shared_mut(&mut self) -> StreamResult<&mut Shared> {
        if self.shared.frozen.load(Ordering::Acquire) {
            return Err(StreamError::RegistryFrozen);
        }
        Arc::get_mut(&mut self.shared).ok_or(StreamError::RegistryFrozen)
    }

    /// Install the diagnostic sink
    pub fn set_sink(&mut self, sink: Arc<dyn DiagnosticSink>) -> StreamResult<()> {
        self.shared_mut()?.sink = Some(sink);
        Ok(())
    }

    /// Builder form of `set_sink`
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> StreamResult<Self> {
        self.set_sink(sink)?;
        Ok(self)
    }

    /// Register the loader for `L::Asset`
    pub fn register_loader<L: AssetLoader>(&mut self, loader: L) -> StreamResult<()> {
        self.register_erased(Arc::new(loader))
    }

    /// Register a closure as the loader for `T`
    pub fn register_fn<T, F>(&mut self, f: F) -> StreamResult<()>
    where
        T: Asset,
        F: Fn(&mut RequestContext<'_>, &str) -> LoadResult<T> + Send + Sync + 'static,
    {
        self.register_loader(FnLoader::new(f))
    }

    /// Register a type-erased loader
    pub fn register_erased(&mut self, loader: Arc<dyn ErasedLoader>) -> StreamResult<()> {
        let shared = self.shared_mut()?;
        let tag = loader.asset_tag();
        shared.registry.register_erased(loader)?;
        shared.tables.insert(tag.id(), ResourceTable::new(tag));
        Ok(())
    }

    /// Request an asset.
    ///
    /// Returns immediately with a handle. The first request for a key (or
    /// the first after it was unloaded) starts exactly one load; later ones
    /// share the same entry.
    pub fn request<T: Asset>(&self, key: &str, mode: LoadMode) -> StreamResult<Handle<T>> {
        self.shared.request::<T>(key, mode)
    }

    /// Reload the asset behind a handle.
    ///
    /// Returns `false` if a load is already in flight.
    pub fn reload<T: Asset>(&self, handle: &Handle<T>, mode: LoadMode) -> bool {
        self.shared.reload_entry(handle.entry(), mode)
    }

    /// Reload the asset behind an untyped handle
    pub fn reload_untyped(&self, handle: &UntypedHandle, mode: LoadMode) -> bool {
        self.shared.reload_entry(handle.entry(), mode)
    }

    /// Drop the payload of a ready or failed asset. The entry stays known
    /// and reloads on the next request.
    pub fn unload<T: Asset>(&self, key: &str) -> bool {
        self.shared
            .table(TypeTag::of::<T>())
            .and_then(|table| table.get(key))
            .map(|entry| self.shared.unload_entry(&entry))
            .unwrap_or(false)
    }

    /// Unload the asset behind a handle
    pub fn unload_handle<T: Asset>(&self, handle: &Handle<T>) -> bool {
        self.shared.unload_entry(handle.entry())
    }

    /// Run eviction: idle timeout, then memory budget, then purge of
    /// unreferenced unloaded entries.
    pub fn tick(&self, now: Instant) -> TickReport {
        let config = &self.shared.config;
        let mut report = TickReport::default();

        if let Some(threshold) = config.idle_timeout() {
            report.idle_evicted = self.shared.evict_idle(now, threshold);
        }
        if let Some(budget) = config.memory_budget_bytes {
            report.budget_evicted = self.shared.evict_over_budget(budget);
        }
        if config.purge_unreferenced {
            for table in self.shared.tables.values() {
                for key in table.purge_unreferenced() {
                    log::debug!("Purged {} '{}'", table.tag(), key);
                    report.purged += 1;
                }
            }
        }

        if !report.is_empty() {
            log::debug!("Tick: {:?}", report);
        }
        report
    }

    /// Handle to an existing entry, without requesting a load
    pub fn get_handle<T: Asset>(&self, key: &str) -> Option<Handle<T>> {
        self.shared
            .table(TypeTag::of::<T>())?
            .get(key)
            .map(Handle::new)
    }

    /// Check if an entry exists for `key`
    pub fn contains<T: Asset>(&self, key: &str) -> bool {
        self.shared
            .table(TypeTag::of::<T>())
            .map(|table| table.contains(key))
            .unwrap_or(false)
    }

    /// Load state of the entry for `key`, if any
    pub fn state_of<T: Asset>(&self, key: &str) -> Option<LoadState> {
        self.shared
            .table(TypeTag::of::<T>())?
            .get(key)
            .map(|entry| entry.state())
    }

    /// Number of entries in the table for `T`
    pub fn entry_count<T: Asset>(&self) -> usize {
        self.shared
            .table(TypeTag::of::<T>())
            .map(ResourceTable::len)
            .unwrap_or(0)
    }

    /// Check if a loader is registered for `T`
    pub fn is_registered<T: Asset>(&self) -> bool {
        self.shared.registry.contains::<T>()
    }

    /// Asset types with a registered loader
    pub fn registered_types(&self) -> Vec<TypeTag> {
        self.shared.registry.tags().collect()
    }

    /// Get the config
    pub fn config(&self) -> &StreamingConfig {
        &self.shared.config
    }

    /// Bytes held by attached payloads across all tables
    pub fn resident_bytes(&self) -> usize {
        self.shared
            .all_entries()
            .iter()
            .map(|entry| entry.byte_size())
            .sum()
    }

    /// Snapshot of load counters and entry states
    pub fn stats(&self) -> StreamStats {
        let counters = &self.shared.counters;
        let mut stats = StreamStats {
            loads_started: counters.loads_started.load(Ordering::Relaxed),
            loads_completed: counters.loads_completed.load(Ordering::Relaxed),
            loads_failed: counters.loads_failed.load(Ordering::Relaxed),
            ..Default::default()
        };

        for entry in self.shared.all_entries() {
            stats.entries += 1;
            stats.resident_bytes += entry.byte_size();
            match entry.state() {
                LoadState::Unloaded => stats.unloaded += 1,
                LoadState::Loading => stats.loading += 1,
                LoadState::Ready => stats.ready += 1,
                LoadState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Shut the scheduler down. Queued loads still run to completion.
    pub fn shutdown(&self) {
        self.shared.scheduler.shutdown();
    }
}

impl core::fmt::Debug for StreamingManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamingManager")
            .field("registry", &self.shared.registry)
            .field("config", &self.shared.config)
            .finish()
    }
}
