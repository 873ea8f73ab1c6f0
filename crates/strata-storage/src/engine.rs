//! StorageEngine: owns the database manager and the engine components, and
//! implements [`EntityStore`] over them.
//!
//! Every mutation runs in one BEGIN IMMEDIATE transaction: processors read the
//! stored state, the executor writes the batch, and the result is read back
//! before commit. Any error rolls the whole call back.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use strata_core::config::StrataConfig;
use strata_core::errors::{ConfigError, PersistenceResult, SchemaError, StatementError};
use strata_core::graph::InstanceGraph;
use strata_core::mapping::SchemaMapping;
use strata_core::model::{AttributeKind, EntityTypeId, Model, ReferenceId};
use strata_core::payload::{Id, Payload};
use strata_core::query::{AttributeMask, Filter, Page, QueryCustomizer};
use strata_core::traits::EntityStore;
use tracing::{info, info_span, warn};

use crate::connection::writer::with_immediate_transaction;
use crate::connection::DatabaseManager;
use crate::executor::{ExecutionContext, ExecutionOutcome, StatementExecutor};
use crate::graph::InstanceGraphCollector;
use crate::parameters::{Dialect, ParameterMapper};
use crate::queries::{PayloadAssembler, QueryFactory};
use crate::rules::ReferenceRuleClassifier;
use crate::schema::{SchemaResolver, SchemaResolverConfig};
use crate::statements::{
    ClientReferences, DeleteProcessor, IdRef, InsertProcessor, PendingKey, ReferenceProcessor, StatementBatch,
    StatementContext, UpdateProcessor,
};

/// The DAO facade over one loaded model and its externally owned schema.
pub struct StorageEngine {
    db: DatabaseManager,
    collector: InstanceGraphCollector,
    queries: QueryFactory,
    executor: StatementExecutor,
    optimistic_locking: bool,
    stateful: bool,
}

impl Drop for StorageEngine {
    /// File-backed engines fold the WAL back into the database file on close.
    fn drop(&mut self) {
        if self.db.path().is_none() {
            return;
        }
        if let Err(e) = self.db.checkpoint() {
            warn!(error = %e, "wal checkpoint on close failed");
        }
    }
}

/// What a write closure hands to the read-back step.
struct Written<T> {
    value: T,
    outcome: ExecutionOutcome,
    tokens: Vec<(PendingKey, String)>,
}

impl StorageEngine {
    /// Open an engine over a database file. The schema must already exist.
    pub fn open(path: &Path, model: Arc<Model>, mapping: SchemaMapping, config: &StrataConfig) -> PersistenceResult<Self> {
        let db = DatabaseManager::open(path, &config.storage)?;
        Self::build(db, model, mapping, config)
    }

    /// Open an in-memory engine; install the schema with [`DatabaseManager::execute_ddl`].
    pub fn open_in_memory(model: Arc<Model>, mapping: SchemaMapping, config: &StrataConfig) -> PersistenceResult<Self> {
        let db = DatabaseManager::open_in_memory(&config.storage)?;
        Self::build(db, model, mapping, config)
    }

    fn build(db: DatabaseManager, model: Arc<Model>, mapping: SchemaMapping, config: &StrataConfig) -> PersistenceResult<Self> {
        let dialect_name = config.storage.effective_dialect();
        let dialect = Dialect::parse(dialect_name).ok_or_else(|| ConfigError::ValidationFailed {
            field: "storage.dialect".to_string(),
            message: format!("unknown dialect '{dialect_name}'"),
        })?;
        let statements = &config.statements;
        let max_in_list = statements.effective_max_in_list();

        let resolver = Arc::new(SchemaResolver::new(SchemaResolverConfig { model, mapping })?);
        let mapper = Arc::new(ParameterMapper::new(dialect, statements.effective_varchar_length()));
        let classifier = Arc::new(ReferenceRuleClassifier::new(Arc::clone(&resolver)));
        let collector = InstanceGraphCollector::new(
            classifier,
            Arc::clone(&mapper),
            config.collector.effective_plan_cache_capacity(),
            max_in_list,
        );
        let queries = QueryFactory::new(Arc::clone(&resolver), Arc::clone(&mapper), max_in_list);
        let executor = StatementExecutor::new(resolver, mapper, max_in_list);
        info!(
            file = ?db.path(),
            readers = db.reader_count(),
            dialect = dialect_name,
            "storage engine opened"
        );

        Ok(Self {
            db,
            collector,
            queries,
            executor,
            optimistic_locking: statements.effective_optimistic_locking(),
            stateful: statements.effective_stateful(),
        })
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn model(&self) -> &Arc<Model> {
        self.collector.resolver().model()
    }

    pub fn collector(&self) -> &InstanceGraphCollector {
        &self.collector
    }

    pub fn queries(&self) -> &QueryFactory {
        &self.queries
    }

    fn entity_id(&self, name: &str) -> PersistenceResult<EntityTypeId> {
        Ok(self.model().entity_by_name(name)?.id)
    }

    fn reference_id(&self, entity: EntityTypeId, name: &str) -> PersistenceResult<ReferenceId> {
        let model = self.model();
        model.find_reference(entity, name).ok_or_else(|| {
            SchemaError::UnknownElement {
                kind: "reference",
                name: format!("{}.{name}", model.entity(entity).name),
            }
            .into()
        })
    }

    /// Build a batch with `build`, execute it, then run `finish` in the same transaction.
    ///
    /// A stateless engine rejects `operation` before anything is read or built.
    fn write<T, R>(
        &self,
        operation: &str,
        build: impl FnOnce(&StatementContext<'_>, &mut StatementBatch) -> PersistenceResult<T>,
        finish: impl FnOnce(&Connection, Written<T>) -> PersistenceResult<R>,
    ) -> PersistenceResult<R> {
        if !self.stateful {
            return Err(StatementError::StatelessOperation {
                operation: operation.to_string(),
            }
            .into());
        }
        self.db.with_writer(|conn| {
            with_immediate_transaction(conn, |tx| {
                let conn: &Connection = tx;
                let ctx = StatementContext {
                    conn,
                    collector: &self.collector,
                    queries: &self.queries,
                    optimistic_locking: self.optimistic_locking,
                };
                let mut batch = StatementBatch::new();
                let value = build(&ctx, &mut batch)?;
                let tokens = std::mem::take(&mut batch.client_references);
                let context = ExecutionContext { stateful: self.stateful };
                let outcome = self.executor.execute(conn, &context, batch)?;
                finish(conn, Written { value, outcome, tokens })
            })
        })
    }

    /// Mark every instance the batch inserted, with its correlation token if any.
    fn created_references(&self, written: &Written<IdRef>, references: &mut ClientReferences) {
        let model = self.model();
        for (key, (entity, id)) in &written.outcome.generated {
            let token = written
                .tokens
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, token)| token.clone());
            references.created(model, *entity, id, token);
        }
    }

    fn resolve_root(&self, written: &Written<IdRef>) -> PersistenceResult<Id> {
        match &written.value {
            IdRef::Existing(id) => Ok(id.clone()),
            IdRef::Pending(key) => written
                .outcome
                .id_of(*key)
                .cloned()
                .ok_or_else(|| StatementError::UnresolvedPending { key: *key }.into()),
        }
    }

    /// Read payloads for `ids` in request order; missing ids are skipped.
    fn read_payloads(
        &self,
        conn: &Connection,
        entity: EntityTypeId,
        ids: &[Id],
        mask: Option<&AttributeMask>,
    ) -> PersistenceResult<Vec<Payload>> {
        let graph = self.collector.collect_graph(conn, entity, ids)?;
        let mut assembler = PayloadAssembler::new(&self.queries, mask);
        assembler.load(conn, &graph)?;
        let model = self.model();
        Ok(graph
            .roots
            .iter()
            .filter_map(|key| assembler.root_payload(model, &graph, key))
            .map(|mut payload| {
                self.enrich_static(&mut payload);
                payload
            })
            .collect())
    }

    fn read_one(&self, conn: &Connection, entity: EntityTypeId, id: &Id) -> PersistenceResult<Payload> {
        self.read_payloads(conn, entity, std::slice::from_ref(id), None)?
            .pop()
            .ok_or_else(|| {
                StatementError::ConstraintNotFound {
                    entity: self.model().entity(entity).name.clone(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    /// Inject static feature values into every node of an output tree.
    fn enrich_static(&self, payload: &mut Payload) {
        let model = self.model();
        payload.walk_mut(&mut |node| {
            let Some(entity) = node.type_name().and_then(|name| model.entity_by_name(name).ok()) else {
                return;
            };
            for attribute_id in model.all_attributes(entity.id) {
                let attribute = model.attribute(attribute_id);
                if let AttributeKind::Static { value } = &attribute.kind {
                    node.insert(&attribute.name, value.clone());
                }
            }
        });
    }

    fn page_of(
        &self,
        conn: &Connection,
        entity: EntityTypeId,
        filter: Option<&Filter>,
        customizer: &QueryCustomizer,
    ) -> PersistenceResult<Page<Payload>> {
        let ids = self.queries.search_ids(
            conn,
            entity,
            filter,
            customizer.order_by.as_ref(),
            customizer.seek.as_ref(),
        )?;
        let items = self.read_payloads(conn, entity, &ids.items, customizer.mask.as_ref())?;
        Ok(Page {
            items,
            has_more: ids.has_more,
            next_cursor: ids.next_cursor,
        })
    }

    /// Candidate filter of a reference range: the declared range AND `filter`.
    fn range_filter(&self, reference: ReferenceId, filter: Option<&Filter>) -> Option<Filter> {
        Filter::both(self.model().reference(reference).range.clone(), filter.cloned())
    }
}

impl EntityStore for StorageEngine {
    fn get_by_identifier(
        &self,
        entity: &str,
        id: &Id,
        customizer: Option<&QueryCustomizer>,
    ) -> PersistenceResult<Option<Payload>> {
        let _span = info_span!("strata.dao", op = "get_by_identifier", entity).entered();
        let e = self.entity_id(entity)?;
        let mask = customizer.and_then(|c| c.mask.as_ref());
        self.db.with_reader(|conn| {
            Ok(self
                .read_payloads(conn, e, std::slice::from_ref(id), mask)?
                .pop())
        })
    }

    fn search(&self, entity: &str, customizer: &QueryCustomizer) -> PersistenceResult<Page<Payload>> {
        let _span = info_span!("strata.dao", op = "search", entity).entered();
        let e = self.entity_id(entity)?;
        self.db
            .with_reader(|conn| self.page_of(conn, e, customizer.filter.as_ref(), customizer))
    }

    fn count(&self, entity: &str, filter: Option<&Filter>) -> PersistenceResult<u64> {
        let _span = info_span!("strata.dao", op = "count", entity).entered();
        let e = self.entity_id(entity)?;
        self.db.with_reader(|conn| self.queries.count(conn, e, filter))
    }

    fn create(&self, entity: &str, payload: Payload) -> PersistenceResult<Payload> {
        let _span = info_span!("strata.dao", op = "create", entity).entered();
        let e = self.entity_id(entity)?;
        self.write(
            "create",
            |ctx, batch| InsertProcessor::new(ctx).insert(batch, e, &payload, None),
            |conn, written| {
                let id = self.resolve_root(&written)?;
                let mut references = ClientReferences::new();
                self.created_references(&written, &mut references);
                let mut result = self.read_one(conn, e, &id)?;
                references.apply(self.model(), &mut result);
                Ok(result)
            },
        )
    }

    fn update(&self, entity: &str, payload: Payload) -> PersistenceResult<Payload> {
        let _span = info_span!("strata.dao", op = "update", entity).entered();
        let e = self.entity_id(entity)?;
        let mut references = ClientReferences::new();
        references.collect_existing(self.model(), e, &payload);
        self.write(
            "update",
            |ctx, batch| UpdateProcessor::new(ctx).update(batch, e, &payload).map(IdRef::Existing),
            |conn, written| {
                let id = self.resolve_root(&written)?;
                self.created_references(&written, &mut references);
                let mut result = self.read_one(conn, e, &id)?;
                references.apply(self.model(), &mut result);
                Ok(result)
            },
        )
    }

    fn delete(&self, entity: &str, ids: &[Id]) -> PersistenceResult<usize> {
        let _span = info_span!("strata.dao", op = "delete", entity).entered();
        let e = self.entity_id(entity)?;
        self.write(
            "delete",
            |ctx, batch| DeleteProcessor::new(ctx).delete(batch, e, ids),
            |_, written| Ok(written.value),
        )
    }

    fn set_reference(&self, entity: &str, reference: &str, owner: &Id, targets: &[Id]) -> PersistenceResult<()> {
        let _span = info_span!("strata.dao", op = "set_reference", entity, reference).entered();
        let r = self.reference_id(self.entity_id(entity)?, reference)?;
        self.write(
            "set_reference",
            |ctx, batch| ReferenceProcessor::new(ctx).set(batch, r, owner, targets),
            |_, _| Ok(()),
        )
    }

    fn add_references(&self, entity: &str, reference: &str, owner: &Id, targets: &[Id]) -> PersistenceResult<()> {
        let _span = info_span!("strata.dao", op = "add_references", entity, reference).entered();
        let r = self.reference_id(self.entity_id(entity)?, reference)?;
        self.write(
            "add_references",
            |ctx, batch| ReferenceProcessor::new(ctx).add(batch, r, owner, targets),
            |_, _| Ok(()),
        )
    }

    fn remove_references(&self, entity: &str, reference: &str, owner: &Id, targets: &[Id]) -> PersistenceResult<()> {
        let _span = info_span!("strata.dao", op = "remove_references", entity, reference).entered();
        let r = self.reference_id(self.entity_id(entity)?, reference)?;
        self.write(
            "remove_references",
            |ctx, batch| ReferenceProcessor::new(ctx).remove(batch, r, owner, targets),
            |_, _| Ok(()),
        )
    }

    fn get_range_of(&self, entity: &str, reference: &str, customizer: &QueryCustomizer) -> PersistenceResult<Page<Payload>> {
        let _span = info_span!("strata.dao", op = "get_range_of", entity, reference).entered();
        let r = self.reference_id(self.entity_id(entity)?, reference)?;
        let target = self.model().reference(r).target;
        let filter = self.range_filter(r, customizer.filter.as_ref());
        self.db
            .with_reader(|conn| self.page_of(conn, target, filter.as_ref(), customizer))
    }

    fn count_range_of(&self, entity: &str, reference: &str, filter: Option<&Filter>) -> PersistenceResult<u64> {
        let _span = info_span!("strata.dao", op = "count_range_of", entity, reference).entered();
        let r = self.reference_id(self.entity_id(entity)?, reference)?;
        let target = self.model().reference(r).target;
        let filter = self.range_filter(r, filter);
        self.db
            .with_reader(|conn| self.queries.count(conn, target, filter.as_ref()))
    }

    fn template(&self, entity: &str) -> PersistenceResult<Payload> {
        let e = self.entity_id(entity)?;
        let model = self.model();
        let mut payload = Payload::of_type(&model.entity(e).name);
        for attribute_id in model.all_attributes(e) {
            let attribute = model.attribute(attribute_id);
            match (&attribute.kind, &attribute.default) {
                (AttributeKind::Static { value }, _) => {
                    payload.insert(&attribute.name, value.clone());
                }
                (AttributeKind::Stored, Some(default)) => {
                    payload.insert(&attribute.name, default.clone());
                }
                _ => {}
            }
        }
        Ok(payload)
    }

    fn collect_graph(&self, entity: &str, ids: &[Id]) -> PersistenceResult<InstanceGraph> {
        let _span = info_span!("strata.dao", op = "collect_graph", entity).entered();
        let e = self.entity_id(entity)?;
        self.db.with_reader(|conn| self.collector.collect_graph(conn, e, ids))
    }
}
