//! The engine: mutation orchestration over the assembled components.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tessera_broadcast::{BroadcastHub, EntityFilter};
use tessera_core::clock::Clock;
use tessera_core::error::EngineError;
use tessera_core::event::EventRecord;
use tessera_core::principal::Principal;
use tessera_core::record::Record;
use tessera_event_log::EventLog;
use tessera_hooks::{HookInvoker, HookPipeline};
use tessera_schema::{AdmissionPhase, EntityDef, HookPoint, SchemaRegistry};
use tessera_store::RecordStore;

use crate::stream::EventStream;

/// Tunables for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Budget for a synchronous `before_*` hook call.
    pub before_hook_timeout: Duration,
    /// Budget for a detached `after_*` hook call.
    pub after_hook_timeout: Duration,
    /// Bounded queue size per subscription.
    pub subscription_queue_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            before_hook_timeout: Duration::from_secs(5),
            after_hook_timeout: Duration::from_secs(30),
            subscription_queue_capacity: 256,
        }
    }
}

/// The assembled entity engine.
pub struct Engine {
    registry: SchemaRegistry,
    store: RecordStore,
    log: Arc<EventLog>,
    hub: Arc<BroadcastHub>,
    hooks: HookPipeline,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Assembles an engine over the given definitions, hook invoker, and
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if the initial definition set fails
    /// generation validation.
    pub fn new(
        defs: Vec<EntityDef>,
        invoker: Arc<dyn HookInvoker>,
        clock: Arc<dyn Clock>,
        options: &EngineOptions,
    ) -> Result<Self, EngineError> {
        let registry = SchemaRegistry::new(defs)?;
        let hub = Arc::new(BroadcastHub::new(options.subscription_queue_capacity));
        let log = Arc::new(EventLog::with_sink(hub.clone()));
        let store = RecordStore::new(log.clone(), clock.clone());
        let hooks = HookPipeline::with_timeouts(
            invoker,
            options.before_hook_timeout,
            options.after_hook_timeout,
        );
        Ok(Self {
            registry,
            store,
            log,
            hub,
            hooks,
            clock,
        })
    }

    /// Creates a record from raw JSON field values.
    ///
    /// # Errors
    ///
    /// Returns the full taxonomy: `Validation`, `HookRejected`,
    /// `HookTimeout`, or `EntityNotFound`. A rejected create leaves the store
    /// and log exactly as they were.
    #[tracing::instrument(skip(self, raw, principal), fields(principal = %principal))]
    pub async fn create(
        &self,
        entity: &str,
        raw: &serde_json::Map<String, Value>,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let schema = self.registry.current();
        let def = schema.entity(entity)?;

        let fields = def.admit(raw, AdmissionPhase::Create, self.clock.now())?;
        self.hooks
            .run_before(&def, HookPoint::BeforeCreate, None, Some(&fields), &principal)
            .await?;

        let record = self.store.create(&def, fields, principal.clone()).await?;

        drop(self.hooks.run_after(
            &def,
            HookPoint::AfterCreate,
            None,
            Some(&record.fields),
            &principal,
        ));
        Ok(record)
    }

    /// Updates a record, merging the supplied fields over its current values.
    ///
    /// `expected_version` is the version the caller last observed; a
    /// mismatch fails with `Conflict` and the caller must re-read and retry.
    ///
    /// # Errors
    ///
    /// Returns `Validation`, `Conflict`, `HookRejected`, `HookTimeout`,
    /// `EntityNotFound`, or `RecordNotFound`.
    #[tracing::instrument(skip(self, raw, principal), fields(principal = %principal))]
    pub async fn update(
        &self,
        entity: &str,
        id: u64,
        expected_version: u64,
        raw: &serde_json::Map<String, Value>,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let schema = self.registry.current();
        let def = schema.entity(entity)?;

        // Pre-checks keep doomed mutations away from the hook endpoint; the
        // store re-checks the version inside the record's critical section,
        // which is authoritative.
        let current = self.store.get(&def, id)?;
        check_expected_version(&def, &current, expected_version)?;

        let delta = def.admit(raw, AdmissionPhase::Update, self.clock.now())?;
        let mut proposed = current.fields.clone();
        proposed.extend(delta.clone());
        self.hooks
            .run_before(
                &def,
                HookPoint::BeforeUpdate,
                Some(&current.fields),
                Some(&proposed),
                &principal,
            )
            .await?;

        let record = self
            .store
            .update(&def, id, expected_version, delta, principal.clone())
            .await?;

        drop(self.hooks.run_after(
            &def,
            HookPoint::AfterUpdate,
            Some(&current.fields),
            Some(&record.fields),
            &principal,
        ));
        Ok(record)
    }

    /// Soft-deletes a record.
    ///
    /// # Errors
    ///
    /// Returns `Conflict`, `HookRejected`, `HookTimeout`, `EntityNotFound`,
    /// or `RecordNotFound`.
    #[tracing::instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn delete(
        &self,
        entity: &str,
        id: u64,
        expected_version: u64,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let schema = self.registry.current();
        let def = schema.entity(entity)?;

        let current = self.store.get(&def, id)?;
        check_expected_version(&def, &current, expected_version)?;

        self.hooks
            .run_before(
                &def,
                HookPoint::BeforeDelete,
                Some(&current.fields),
                None,
                &principal,
            )
            .await?;

        let record = self
            .store
            .delete(&def, id, expected_version, principal.clone())
            .await?;

        drop(self.hooks.run_after(
            &def,
            HookPoint::AfterDelete,
            Some(&current.fields),
            None,
            &principal,
        ));
        Ok(record)
    }

    /// Snapshot of one active record.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` or `RecordNotFound`.
    pub fn get(&self, entity: &str, id: u64) -> Result<Record, EngineError> {
        let schema = self.registry.current();
        let def = schema.entity(entity)?;
        self.store.get(&def, id)
    }

    /// Full event history of one record, in sequence order. Works for
    /// soft-deleted records too.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound`, or `RecordNotFound` if the identifier never
    /// existed.
    pub fn history(&self, entity: &str, id: u64) -> Result<Vec<EventRecord>, EngineError> {
        let schema = self.registry.current();
        let def = schema.entity(entity)?;
        let events = self.log.read_for_record(def.name(), id);
        if events.is_empty() {
            return Err(EngineError::RecordNotFound {
                entity: def.name().to_owned(),
                id,
            });
        }
        Ok(events)
    }

    /// Opens a resumable event stream.
    ///
    /// Events with `seq > from_seq` matching the filter are delivered exactly
    /// once, replayed history first, then live; the handoff neither skips
    /// nor duplicates. Pass `from_seq = 0` for live-only tailing from the
    /// beginning of the log. A cursor at or past the log head yields nothing
    /// until newer events commit.
    #[must_use]
    pub fn subscribe(&self, filter: EntityFilter, from_seq: u64) -> EventStream {
        // Register for live delivery before reading the replay window: an
        // event committed between the two steps lands in the queue, and the
        // stream's cursor drops whatever the replay already covered. The
        // cursor comes verbatim from clients, so the window start must
        // saturate rather than wrap back to the start of the log.
        let subscription = self.hub.subscribe(filter.clone());
        let replay = self
            .log
            .read_from(from_seq.saturating_add(1), usize::MAX)
            .into_iter()
            .filter(|e| filter.matches(&e.entity))
            .collect();
        EventStream::new(replay, subscription, from_seq, self.hub.clone())
    }

    /// Atomically swaps in a complete new definition set.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if the set fails generation
    /// validation; the active generation is untouched on error.
    pub fn reload_schema(&self, defs: Vec<EntityDef>) -> Result<u64, EngineError> {
        let generation = self.registry.swap(defs)?;
        tracing::info!(generation, "schema generation swapped");
        Ok(generation)
    }

    /// The active schema generation (pinned by the caller for one request).
    #[must_use]
    pub fn schema(&self) -> Arc<tessera_schema::SchemaGeneration> {
        self.registry.current()
    }

    /// Last assigned event sequence number.
    #[must_use]
    pub fn head_seq(&self) -> u64 {
        self.log.head_seq()
    }

    /// After-hook failures recorded since startup (operational metric).
    #[must_use]
    pub fn after_hook_failures(&self) -> u64 {
        self.hooks.after_failures()
    }

    pub(crate) fn store(&self) -> &RecordStore {
        &self.store
    }
}

fn check_expected_version(
    def: &EntityDef,
    current: &Record,
    expected: u64,
) -> Result<(), EngineError> {
    if current.version == expected {
        Ok(())
    } else {
        Err(EngineError::Conflict {
            entity: def.name().to_owned(),
            id: current.id,
            expected,
            actual: current.version,
        })
    }
}
