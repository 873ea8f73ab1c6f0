//! Statement executor: runs an ordered batch inside the caller's transaction.
//!
//! Pending identifiers are resolved as inserts run. Any failure aborts the batch
//! and leaves rollback to the enclosing transaction.

pub mod ordering;

pub use ordering::order_statements;

use std::sync::Arc;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use strata_core::errors::{PersistenceResult, SchemaError, StatementError};
use strata_core::mapping::IdType;
use strata_core::model::{DataType, EntityTypeId};
use strata_core::payload::{Id, Value};
use tracing::{debug, trace};

use crate::parameters::source::chunked;
use crate::parameters::{Parameter, ParameterMapper, ParameterSource};
use crate::rules::StorageRule;
use crate::schema::{SchemaResolver, TableInfo};
use crate::statements::{
    DeleteRows, IdRef, InsertRow, PendingKey, ReferenceLink, Statement, StatementBatch, UpdateRow,
};
use crate::to_storage_err;

/// Per-call execution switches.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    /// Stateless contexts reject every mutation.
    pub stateful: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self { stateful: true }
    }
}

/// What a batch did.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// Identifiers assigned to pending inserts, with the inserted concrete type.
    pub generated: FxHashMap<PendingKey, (EntityTypeId, Id)>,
    pub rows_affected: usize,
}

impl ExecutionOutcome {
    pub fn id_of(&self, key: PendingKey) -> Option<&Id> {
        self.generated.get(&key).map(|(_, id)| id)
    }
}

pub struct StatementExecutor {
    resolver: Arc<SchemaResolver>,
    mapper: Arc<ParameterMapper>,
    max_in_list: usize,
}

impl StatementExecutor {
    pub fn new(resolver: Arc<SchemaResolver>, mapper: Arc<ParameterMapper>, max_in_list: usize) -> Self {
        Self {
            resolver,
            mapper,
            max_in_list,
        }
    }

    /// Order and run `batch` on `conn`, which must be inside a transaction.
    pub fn execute(
        &self,
        conn: &Connection,
        context: &ExecutionContext,
        batch: StatementBatch,
    ) -> PersistenceResult<ExecutionOutcome> {
        if !context.stateful {
            if let Some(first) = batch.statements.first() {
                return Err(StatementError::StatelessOperation {
                    operation: first.kind_name().to_string(),
                }
                .into());
            }
        }
        let statements = order_statements(batch.statements)?;
        debug!(statements = statements.len(), "executing statement batch");

        let mut outcome = ExecutionOutcome::default();
        for statement in &statements {
            trace!(kind = statement.kind_name(), "statement");
            let affected = match statement {
                Statement::Insert(row) => self.insert(conn, row, &mut outcome)?,
                Statement::Update(row) => self.update(conn, row)?,
                Statement::Delete(rows) => self.delete(conn, rows)?,
                Statement::SetReference(link) => self.set_reference(conn, link, &outcome)?,
                Statement::AddReference(link) => self.add_reference(conn, link, &outcome)?,
                Statement::RemoveReference(link) => self.remove_reference(conn, link, &outcome)?,
            };
            outcome.rows_affected += affected;
        }
        Ok(outcome)
    }

    fn resolve(&self, id: &IdRef, outcome: &ExecutionOutcome) -> Result<Id, StatementError> {
        match id {
            IdRef::Existing(id) => Ok(id.clone()),
            IdRef::Pending(key) => outcome
                .id_of(*key)
                .cloned()
                .ok_or(StatementError::UnresolvedPending { key: *key }),
        }
    }

    fn id_parameter(&self, entity: EntityTypeId, id: &Id, name: &str) -> PersistenceResult<Parameter> {
        let id_type = self.resolver.identifier_type(entity)?;
        Ok(self.mapper.create_id_parameter(id_type, id, name))
    }

    fn version_parameter(&self, version: i64, name: &str) -> PersistenceResult<Parameter> {
        Ok(self
            .mapper
            .create_parameter(&Value::Integer(version), Some(&DataType::Integer), name)?)
    }

    fn run(&self, conn: &Connection, sql: &str, source: &ParameterSource) -> PersistenceResult<usize> {
        let mut stmt = conn.prepare_cached(sql).map_err(to_storage_err)?;
        let affected = stmt.execute(source.as_named().as_slice()).map_err(to_storage_err)?;
        Ok(affected)
    }

    fn table_of(&self, chain: &[TableInfo], table: &str, entity: EntityTypeId) -> Result<usize, SchemaError> {
        chain.iter().position(|info| info.table == table).ok_or_else(|| {
            SchemaError::invalid_model(format!(
                "table '{table}' is not in the table chain of {}",
                self.resolver.model().entity(entity).name
            ))
        })
    }

    fn insert(&self, conn: &Connection, row: &InsertRow, outcome: &mut ExecutionOutcome) -> PersistenceResult<usize> {
        let chain = self.resolver.table_chain(row.entity)?;
        let Some(root) = chain.first() else {
            return Err(SchemaError::SchemaMapping {
                element: self.resolver.model().entity(row.entity).name.clone(),
                count: 0,
            }
            .into());
        };

        // Per-table (column, parameter) lists, chain order.
        let mut sources: Vec<ParameterSource> = vec![ParameterSource::new(); chain.len()];
        let mut columns: Vec<Vec<(String, String)>> = vec![Vec::new(); chain.len()];
        for (i, write) in row.columns.iter().enumerate() {
            let slot = self.table_of(&chain, &write.table, row.entity)?;
            let name = format!("c_{i}");
            sources[slot].add(self.mapper.create_parameter(&write.value, Some(&write.data_type), &name)?);
            columns[slot].push((write.column.clone(), name));
        }
        for (i, fk) in row.foreign_keys.iter().enumerate() {
            let slot = self.table_of(&chain, &fk.table, row.entity)?;
            let target = self.resolve(&fk.target, outcome)?;
            let name = format!("fk_{i}");
            sources[slot].add(self.id_parameter(fk.target_entity, &target, &name)?);
            columns[slot].push((fk.column.clone(), name));
        }
        for (slot, info) in chain.iter().enumerate() {
            if let Some(version) = &info.version_column {
                sources[slot].add(self.version_parameter(1, "version")?);
                columns[slot].push((version.clone(), "version".to_string()));
            }
        }

        let mut assigned = match (&row.id, root.id_type) {
            (Some(id), _) => Some(id.clone()),
            (None, IdType::Text) => Some(Id::Text(uuid::Uuid::new_v4().to_string())),
            (None, IdType::Integer) => None,
        };

        let mut affected = 0;
        for (slot, info) in chain.iter().enumerate() {
            let mut source = std::mem::take(&mut sources[slot]);
            let mut names = std::mem::take(&mut columns[slot]);
            if let Some(id) = &assigned {
                source.add(self.mapper.create_id_parameter(info.id_type, id, "id"));
                names.insert(0, (info.id_column.clone(), "id".to_string()));
            }
            affected += self.run(conn, &insert_sql(&info.table, &names), &source)?;
            if assigned.is_none() {
                assigned = Some(Id::Int(conn.last_insert_rowid()));
            }
        }

        let id = assigned.ok_or(StatementError::UnresolvedPending { key: row.key })?;
        debug!(
            entity = %self.resolver.model().entity(row.entity).name,
            id = %id,
            key = row.key,
            "inserted"
        );
        outcome.generated.insert(row.key, (row.entity, id));
        Ok(affected)
    }

    fn update(&self, conn: &Connection, row: &UpdateRow) -> PersistenceResult<usize> {
        let chain = self.resolver.table_chain(row.entity)?;
        let entity_name = || self.resolver.model().entity(row.entity).name.clone();

        let mut assignments: Vec<Vec<String>> = vec![Vec::new(); chain.len()];
        let mut sources: Vec<ParameterSource> = vec![ParameterSource::new(); chain.len()];
        for (i, write) in row.columns.iter().enumerate() {
            let slot = self.table_of(&chain, &write.table, row.entity)?;
            let name = format!("c_{i}");
            sources[slot].add(self.mapper.create_parameter(&write.value, Some(&write.data_type), &name)?);
            assignments[slot].push(format!("{} = :{name}", write.column));
        }

        let version_slot = match &row.version {
            Some(check) => Some(self.table_of(&chain, &check.table, row.entity)?),
            None => None,
        };

        // The version table goes first so a stale version fails before other writes.
        let mut order: Vec<usize> = (0..chain.len()).collect();
        if let Some(v) = version_slot {
            order.retain(|slot| *slot != v);
            order.insert(0, v);
        }

        let mut affected = 0;
        for slot in order {
            let info = &chain[slot];
            let mut sets = std::mem::take(&mut assignments[slot]);
            let mut source = std::mem::take(&mut sources[slot]);
            let mut predicate = format!("{} = :id", info.id_column);
            let mut expected = None;
            if version_slot == Some(slot) {
                if let Some(check) = &row.version {
                    sets.push(format!("{col} = {col} + 1", col = check.column));
                    if let Some(version) = check.expected {
                        source.add(self.version_parameter(version, "expected_version")?);
                        predicate.push_str(&format!(" AND {} = :expected_version", check.column));
                        expected = Some(version);
                    }
                }
            }
            if sets.is_empty() {
                continue;
            }
            source.add(self.mapper.create_id_parameter(info.id_type, &row.id, "id"));
            let sql = format!("UPDATE {} SET {} WHERE {predicate}", info.table, sets.join(", "));
            let n = self.run(conn, &sql, &source)?;
            if n == 0 {
                return Err(match expected {
                    Some(version) => StatementError::OptimisticLock {
                        entity: entity_name(),
                        id: row.id.to_string(),
                        version,
                    },
                    None => StatementError::ConstraintNotFound {
                        entity: entity_name(),
                        id: row.id.to_string(),
                    },
                }
                .into());
            }
            affected += n;
        }
        Ok(affected)
    }

    fn delete(&self, conn: &Connection, rows: &DeleteRows) -> PersistenceResult<usize> {
        let chain = self.resolver.table_chain(rows.entity)?;
        let mut deleted = 0;
        // Most specific table first; the root row goes last.
        for (slot, info) in chain.iter().enumerate().rev() {
            for chunk in chunked(&rows.ids, self.max_in_list) {
                let mut source = ParameterSource::new();
                let params = chunk
                    .iter()
                    .enumerate()
                    .map(|(i, id)| self.mapper.create_id_parameter(info.id_type, id, &format!("p_{i}")))
                    .collect();
                let placeholders = source.add_list(params);
                let sql = format!("DELETE FROM {} WHERE {} IN {placeholders}", info.table, info.id_column);
                let n = self.run(conn, &sql, &source)?;
                if slot == 0 {
                    deleted += n;
                }
            }
        }
        Ok(deleted)
    }

    fn set_reference(&self, conn: &Connection, link: &ReferenceLink, outcome: &ExecutionOutcome) -> PersistenceResult<usize> {
        let StorageRule::ForeignKey { table, column } = &link.rule else {
            return Err(SchemaError::invalid_model(format!(
                "{} link cannot be overwritten in place",
                link.rule.kind_name()
            ))
            .into());
        };
        let owner = self.resolve(&link.owner, outcome)?;
        let target = link.target.as_ref().map(|t| self.resolve(t, outcome)).transpose()?;
        self.write_column(conn, table, column, link.owner_entity, &owner, target.as_ref().map(|t| (link.target_entity, t)))
    }

    fn add_reference(&self, conn: &Connection, link: &ReferenceLink, outcome: &ExecutionOutcome) -> PersistenceResult<usize> {
        let owner = self.resolve(&link.owner, outcome)?;
        let target = self.require_target(link, outcome)?;
        match &link.rule {
            StorageRule::ForeignKey { table, column } => {
                self.write_column(conn, table, column, link.owner_entity, &owner, Some((link.target_entity, &target)))
            }
            StorageRule::InverseForeignKey { table, column } => {
                self.write_column(conn, table, column, link.target_entity, &target, Some((link.owner_entity, &owner)))
            }
            StorageRule::JoinTable {
                table,
                source_column,
                target_column,
            } => {
                let mut source = ParameterSource::new();
                source.add(self.id_parameter(link.owner_entity, &owner, "owner")?);
                source.add(self.id_parameter(link.target_entity, &target, "target")?);
                let sql = format!("INSERT INTO {table} ({source_column}, {target_column}) VALUES (:owner, :target)");
                self.run(conn, &sql, &source)
            }
        }
    }

    fn remove_reference(&self, conn: &Connection, link: &ReferenceLink, outcome: &ExecutionOutcome) -> PersistenceResult<usize> {
        let owner = self.resolve(&link.owner, outcome)?;
        let target = self.require_target(link, outcome)?;
        let mut source = ParameterSource::new();
        source.add(self.id_parameter(link.owner_entity, &owner, "owner")?);
        source.add(self.id_parameter(link.target_entity, &target, "target")?);
        let sql = match &link.rule {
            StorageRule::ForeignKey { table, column } => {
                let id_column = self.resolver.table_by_name(table)?.id_column;
                format!("UPDATE {table} SET {column} = NULL WHERE {id_column} = :owner AND {column} = :target")
            }
            StorageRule::InverseForeignKey { table, column } => {
                let id_column = self.resolver.table_by_name(table)?.id_column;
                format!("UPDATE {table} SET {column} = NULL WHERE {id_column} = :target AND {column} = :owner")
            }
            StorageRule::JoinTable {
                table,
                source_column,
                target_column,
            } => format!("DELETE FROM {table} WHERE {source_column} = :owner AND {target_column} = :target"),
        };
        self.run(conn, &sql, &source)
    }

    fn require_target(&self, link: &ReferenceLink, outcome: &ExecutionOutcome) -> PersistenceResult<Id> {
        let target = link.target.as_ref().ok_or_else(|| {
            SchemaError::invalid_model(format!(
                "{} link of '{}' has no target",
                link.rule.kind_name(),
                self.resolver.model().qualified_name(link.reference)
            ))
        })?;
        Ok(self.resolve(target, outcome)?)
    }

    /// `UPDATE table SET column = value WHERE id = row`; `None` writes NULL.
    fn write_column(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
        row_entity: EntityTypeId,
        row: &Id,
        value: Option<(EntityTypeId, &Id)>,
    ) -> PersistenceResult<usize> {
        let id_column = self.resolver.table_by_name(table)?.id_column;
        let mut source = ParameterSource::new();
        source.add(self.id_parameter(row_entity, row, "row_id")?);
        let assigned = match value {
            Some((entity, id)) => {
                source.add(self.id_parameter(entity, id, "value")?);
                ":value"
            }
            None => "NULL",
        };
        let sql = format!("UPDATE {table} SET {column} = {assigned} WHERE {id_column} = :row_id");
        let n = self.run(conn, &sql, &source)?;
        if n == 0 {
            return Err(StatementError::ConstraintNotFound {
                entity: self.resolver.model().entity(row_entity).name.clone(),
                id: row.to_string(),
            }
            .into());
        }
        Ok(n)
    }
}

fn insert_sql(table: &str, columns: &[(String, String)]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES");
    }
    let (names, params): (Vec<&str>, Vec<String>) = columns
        .iter()
        .map(|(column, param)| (column.as_str(), format!(":{param}")))
        .unzip();
    format!("INSERT INTO {table} ({}) VALUES ({})", names.join(", "), params.join(", "))
}
