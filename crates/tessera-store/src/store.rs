//! In-memory record store with per-record write serialization.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tessera_core::clock::Clock;
use tessera_core::error::EngineError;
use tessera_core::event::{EventDraft, Operation};
use tessera_core::principal::Principal;
use tessera_core::record::{FieldMap, FieldValue, LifecycleState, Record};
use tessera_event_log::EventLog;
use tessera_schema::{EntityDef, FieldType};

/// Per-entity table: current records, the id counter, and the per-record
/// write locks.
struct EntityTable {
    records: RwLock<HashMap<u64, Record>>,
    next_id: AtomicU64,
    /// Serializes id assignment and uniqueness checks with the insert that
    /// commits them. Every mutation that can consume a unique value holds
    /// this from its check through its commit, so two writers cannot both
    /// observe a value as free.
    admit_lock: tokio::sync::Mutex<()>,
    /// One async mutex per record id; taken for the whole critical section of
    /// an update or delete so two mutations of the same record cannot
    /// interleave. Always acquired before `admit_lock`.
    record_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityTable {
    fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            admit_lock: tokio::sync::Mutex::new(()),
            record_locks: Mutex::new(HashMap::new()),
        }
    }

    fn record_lock(&self, id: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .record_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }
}

/// The authoritative keyed store for all entities.
///
/// Holds the event log so that the commit of a mutation and the append of its
/// domain event happen while the records write lock is still held: anyone who
/// can observe a committed record observes its event already in the log, so a
/// record's events appear in exactly its commit order.
pub struct RecordStore {
    tables: Mutex<HashMap<String, Arc<EntityTable>>>,
    log: Arc<EventLog>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Creates a store committing its events to `log`.
    #[must_use]
    pub fn new(log: Arc<EventLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            log,
            clock,
        }
    }

    fn table(&self, entity: &str) -> Arc<EntityTable> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(entity.to_owned())
            .or_insert_with(|| Arc::new(EntityTable::new()))
            .clone()
    }

    /// Creates a record: fresh identifier, version 1, one `Create` event.
    ///
    /// `fields` must already be admitted against `def`; the store adds the
    /// checks that need its own state — uniqueness and reference existence.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` on a uniqueness or reference
    /// violation.
    pub async fn create(
        &self,
        def: &EntityDef,
        fields: FieldMap,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let table = self.table(def.name());
        let _admit = table.admit_lock.lock().await;

        self.check_uniqueness(def, &table, &fields, None)?;
        self.check_references(def, &fields)?;

        let id = table.next_id.fetch_add(1, Ordering::SeqCst);
        let record = Record {
            id,
            version: 1,
            state: LifecycleState::Active,
            fields,
        };

        let event = {
            let mut records = table
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            records.insert(id, record.clone());
            // Append before releasing the write lock so no later mutation of
            // this record can slot its event ahead of the `Create`.
            self.log.append(EventDraft {
                entity: def.name().to_owned(),
                record_id: id,
                op: Operation::Create,
                before: None,
                after: Some(record.fields.clone()),
                principal,
                occurred_at: self.clock.now(),
            })
        };
        tracing::debug!(entity = %def.name(), id, seq = event.seq, "record created");

        Ok(record)
    }

    /// Updates a record: merges the admitted `delta` over the current fields,
    /// bumps the version by exactly 1, commits one `Update` event.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` for a missing or deleted record,
    /// `EngineError::Conflict` on a stale `expected_version`, or
    /// `EngineError::Validation` on a uniqueness or reference violation.
    pub async fn update(
        &self,
        def: &EntityDef,
        id: u64,
        expected_version: u64,
        delta: FieldMap,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let table = self.table(def.name());
        let lock = table.record_lock(id);
        let _guard = lock.lock().await;

        let current = self.active_record(def, &table, id)?;
        check_version(def.name(), &current, expected_version)?;

        let mut merged = current.fields.clone();
        merged.extend(delta);
        // Uniqueness is checked against the whole table, so the check and the
        // insert must not interleave with another record's mutation.
        let _admit = table.admit_lock.lock().await;
        self.check_uniqueness(def, &table, &merged, Some(id))?;
        self.check_references(def, &merged)?;

        let updated = Record {
            id,
            version: current.version + 1,
            state: LifecycleState::Active,
            fields: merged,
        };

        let event = {
            let mut records = table
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            records.insert(id, updated.clone());
            self.log.append(EventDraft {
                entity: def.name().to_owned(),
                record_id: id,
                op: Operation::Update,
                before: Some(current.fields),
                after: Some(updated.fields.clone()),
                principal,
                occurred_at: self.clock.now(),
            })
        };
        tracing::debug!(
            entity = %def.name(),
            id,
            version = updated.version,
            seq = event.seq,
            "record updated"
        );

        Ok(updated)
    }

    /// Soft-deletes a record: state becomes `Deleted`, the version bumps, one
    /// `Delete` event commits. The identifier is never reused.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` for a missing or already deleted
    /// record, or `EngineError::Conflict` on a stale `expected_version`.
    pub async fn delete(
        &self,
        def: &EntityDef,
        id: u64,
        expected_version: u64,
        principal: Principal,
    ) -> Result<Record, EngineError> {
        let table = self.table(def.name());
        let lock = table.record_lock(id);
        let _guard = lock.lock().await;

        let current = self.active_record(def, &table, id)?;
        check_version(def.name(), &current, expected_version)?;

        let deleted = Record {
            id,
            version: current.version + 1,
            state: LifecycleState::Deleted,
            fields: current.fields.clone(),
        };

        let event = {
            let mut records = table
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            records.insert(id, deleted.clone());
            self.log.append(EventDraft {
                entity: def.name().to_owned(),
                record_id: id,
                op: Operation::Delete,
                before: Some(current.fields),
                after: None,
                principal,
                occurred_at: self.clock.now(),
            })
        };
        tracing::debug!(entity = %def.name(), id, seq = event.seq, "record deleted");

        Ok(deleted)
    }

    /// Snapshot of one active record.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RecordNotFound` for a missing or deleted record.
    pub fn get(&self, def: &EntityDef, id: u64) -> Result<Record, EngineError> {
        let table = self.table(def.name());
        self.active_record(def, &table, id)
    }

    /// Snapshot of all active records, in id order.
    #[must_use]
    pub fn snapshot(&self, def: &EntityDef) -> Vec<Record> {
        let table = self.table(def.name());
        let records = table.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<Record> = records
            .values()
            .filter(|r| r.state.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.id);
        active
    }

    fn active_record(
        &self,
        def: &EntityDef,
        table: &EntityTable,
        id: u64,
    ) -> Result<Record, EngineError> {
        let records = table.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&id)
            .filter(|r| r.state.is_active())
            .cloned()
            .ok_or_else(|| EngineError::RecordNotFound {
                entity: def.name().to_owned(),
                id,
            })
    }

    fn check_uniqueness(
        &self,
        def: &EntityDef,
        table: &EntityTable,
        fields: &FieldMap,
        exclude_id: Option<u64>,
    ) -> Result<(), EngineError> {
        let records = table.records.read().unwrap_or_else(PoisonError::into_inner);
        for field in def.fields().iter().filter(|f| f.unique) {
            let Some(candidate) = fields.get(&field.name) else {
                continue;
            };
            let taken = records.values().any(|r| {
                r.state.is_active()
                    && Some(r.id) != exclude_id
                    && r.fields.get(&field.name) == Some(candidate)
            });
            if taken {
                return Err(EngineError::Validation(format!(
                    "value for unique field '{}' is already taken",
                    field.name
                )));
            }
        }
        Ok(())
    }

    fn check_references(&self, def: &EntityDef, fields: &FieldMap) -> Result<(), EngineError> {
        for field in def.fields() {
            let FieldType::Reference { entity } = &field.field_type else {
                continue;
            };
            let Some(FieldValue::Reference(target_id)) = fields.get(&field.name) else {
                continue;
            };
            let target_table = self.table(entity);
            let records = target_table
                .records
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let exists = records
                .get(target_id)
                .is_some_and(|r| r.state.is_active());
            if !exists {
                return Err(EngineError::Validation(format!(
                    "field '{}' references missing record {}/{}",
                    field.name, entity, target_id
                )));
            }
        }
        Ok(())
    }
}

fn check_version(entity: &str, current: &Record, expected: u64) -> Result<(), EngineError> {
    if current.version == expected {
        Ok(())
    } else {
        Err(EngineError::Conflict {
            entity: entity.to_owned(),
            id: current.id,
            expected,
            actual: current.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::clock::SystemClock;
    use tessera_schema::FieldDef;

    fn users() -> EntityDef {
        EntityDef::builder("users")
            .field(FieldDef::string("name").required().unique())
            .field(FieldDef::integer("age"))
            .build()
            .unwrap()
    }

    fn store() -> (Arc<EventLog>, RecordStore) {
        let log = Arc::new(EventLog::new());
        let store = RecordStore::new(log.clone(), Arc::new(SystemClock));
        (log, store)
    }

    fn name_fields(name: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::String(name.into()));
        fields
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_id_and_version_one() {
        let (log, store) = store();
        let def = users();

        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();
        let grace = store
            .create(&def, name_fields("Grace"), Principal::anonymous())
            .await
            .unwrap();

        assert_eq!((ada.id, ada.version), (1, 1));
        assert_eq!((grace.id, grace.version), (2, 1));
        assert_eq!(log.head_seq(), 2);
    }

    #[tokio::test]
    async fn test_update_bumps_version_by_exactly_one() {
        let (log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();

        let mut delta = FieldMap::new();
        delta.insert("age".into(), FieldValue::Integer(36));
        let updated = store
            .update(&def, ada.id, 1, delta, Principal::anonymous())
            .await
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.fields["name"], FieldValue::String("Ada".into()));
        assert_eq!(updated.fields["age"], FieldValue::Integer(36));
        assert_eq!(log.head_seq(), 2);
    }

    #[tokio::test]
    async fn test_stale_version_fails_with_conflict_and_leaves_record_unchanged() {
        let (log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();
        store
            .update(&def, ada.id, 1, name_fields("Lovelace"), Principal::anonymous())
            .await
            .unwrap();

        let err = store
            .update(&def, ada.id, 1, name_fields("Byron"), Principal::anonymous())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::Conflict {
                entity: "users".into(),
                id: 1,
                expected: 1,
                actual: 2,
            }
        );
        let current = store.get(&def, ada.id).unwrap();
        assert_eq!(current.fields["name"], FieldValue::String("Lovelace".into()));
        // The rejected mutation produced no event.
        assert_eq!(log.head_seq(), 2);
    }

    #[tokio::test]
    async fn test_delete_is_soft_and_hides_the_record() {
        let (log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();

        let deleted = store
            .delete(&def, ada.id, 1, Principal::anonymous())
            .await
            .unwrap();
        assert_eq!(deleted.version, 2);
        assert_eq!(deleted.state, LifecycleState::Deleted);

        assert!(matches!(
            store.get(&def, ada.id),
            Err(EngineError::RecordNotFound { .. })
        ));
        assert!(store.snapshot(&def).is_empty());
        assert_eq!(log.head_seq(), 2);
    }

    #[tokio::test]
    async fn test_identifiers_are_never_reused_after_delete() {
        let (_log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();
        store
            .delete(&def, ada.id, 1, Principal::anonymous())
            .await
            .unwrap();

        let grace = store
            .create(&def, name_fields("Grace"), Principal::anonymous())
            .await
            .unwrap();
        assert_eq!(grace.id, 2);
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_duplicates_but_ignores_deleted() {
        let (_log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();

        let err = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("name")));

        // Soft-deleted records no longer occupy the value.
        store
            .delete(&def, ada.id, 1, Principal::anonymous())
            .await
            .unwrap();
        assert!(
            store
                .create(&def, name_fields("Ada"), Principal::anonymous())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_update_keeps_own_unique_value() {
        let (_log, store) = store();
        let def = users();
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();

        // Re-submitting the same name must not collide with itself.
        let mut delta = FieldMap::new();
        delta.insert("age".into(), FieldValue::Integer(36));
        delta.insert("name".into(), FieldValue::String("Ada".into()));
        assert!(
            store
                .update(&def, ada.id, 1, delta, Principal::anonymous())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_reference_must_point_at_an_active_record() {
        let (_log, store) = store();
        let customers = EntityDef::builder("customers")
            .field(FieldDef::string("name").required())
            .build()
            .unwrap();
        let orders = EntityDef::builder("orders")
            .field(FieldDef::reference("customer", "customers").required())
            .build()
            .unwrap();

        let mut fields = FieldMap::new();
        fields.insert("customer".into(), FieldValue::Reference(1));
        let err = store
            .create(&orders, fields.clone(), Principal::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        store
            .create(&customers, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();
        assert!(
            store
                .create(&orders, fields, Principal::anonymous())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_one_record_serialize_via_version_check() {
        let (log, store) = store();
        let store = Arc::new(store);
        let def = Arc::new(users());
        let ada = store
            .create(&def, name_fields("Ada"), Principal::anonymous())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let def = def.clone();
            let id = ada.id;
            handles.push(tokio::spawn(async move {
                let mut delta = FieldMap::new();
                delta.insert("age".into(), FieldValue::Integer(i));
                store.update(&def, id, 1, delta, Principal::anonymous()).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // Exactly one writer observed version 1; the rest must re-read.
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.get(&def, ada.id).unwrap().version, 2);
        assert_eq!(log.head_seq(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_updates_of_distinct_records_cannot_share_a_unique_value() {
        let (_log, store) = store();
        let store = Arc::new(store);
        let def = Arc::new(users());
        for i in 0..8 {
            store
                .create(&def, name_fields(&format!("user-{i}")), Principal::anonymous())
                .await
                .unwrap();
        }

        // Every record races to claim the same unique name.
        let mut handles = Vec::new();
        for id in 1..=8 {
            let store = store.clone();
            let def = def.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&def, id, 1, name_fields("Hopper"), Principal::anonymous())
                    .await
            }));
        }

        let mut ok = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::Validation(ref m)) if m.contains("name") => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(rejected, 7);
        let holders = store
            .snapshot(&def)
            .into_iter()
            .filter(|r| r.fields["name"] == FieldValue::String("Hopper".into()))
            .count();
        assert_eq!(holders, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_history_always_begins_with_its_create_event() {
        let (log, store) = store();
        let store = Arc::new(store);
        let def = Arc::new(users());

        // Writers create a record and immediately update it, concurrently.
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let def = def.clone();
            handles.push(tokio::spawn(async move {
                let record = store
                    .create(&def, name_fields(&format!("user-{i}")), Principal::anonymous())
                    .await
                    .unwrap();
                let mut delta = FieldMap::new();
                delta.insert("age".into(), FieldValue::Integer(i));
                store
                    .update(&def, record.id, 1, delta, Principal::anonymous())
                    .await
                    .unwrap();
                record.id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let events = log.read_for_record("users", id);
            assert_eq!(events.len(), 2);
            assert_eq!(events[0].op, Operation::Create);
            assert_eq!(events[1].op, Operation::Update);
            assert!(events[0].seq < events[1].seq);
        }
    }
}
