//! SQL synthesis for attribute reads, filtered searches and counts.
//!
//! Every statement reads an entity through its table chain (root table first,
//! subtype tables inner-joined on the shared id). Filter values are always bound
//! as named parameters.

use std::sync::Arc;

use rusqlite::Connection;
use rustc_hash::FxHashMap;
use strata_core::constants::keys;
use strata_core::errors::{PersistenceResult, SchemaError, StatementError};
use strata_core::model::{AttributeKind, DataType, EntityTypeId};
use strata_core::payload::json::{json_to_value, value_to_json};
use strata_core::payload::{Id, Payload, Value};
use strata_core::query::{AttributeMask, Condition, Filter, Operator, OrderBy, Page, Seek, SeekCursor};

use crate::graph::links::read_id;
use crate::parameters::codec::{from_sql_value, raw_value};
use crate::parameters::source::chunked;
use crate::parameters::{ParameterMapper, ParameterSource};
use crate::schema::SchemaResolver;
use crate::to_storage_err;

/// `FROM` clause over an entity's table chain.
#[derive(Debug, Clone)]
pub struct FromClause {
    pub entity: EntityTypeId,
    pub sql: String,
    /// Table → alias.
    pub aliases: FxHashMap<String, String>,
    /// Alias of the most specific mapped table.
    pub anchor_alias: String,
    /// Qualified identifier column of the root table.
    pub id_expr: String,
}

/// A selectable expression with the datatype used to bind and decode it.
#[derive(Debug, Clone)]
struct Expr {
    sql: String,
    /// `None` for the identifier.
    data_type: Option<DataType>,
}

pub struct QueryFactory {
    resolver: Arc<SchemaResolver>,
    mapper: Arc<ParameterMapper>,
    max_in_list: usize,
}

impl QueryFactory {
    pub fn new(resolver: Arc<SchemaResolver>, mapper: Arc<ParameterMapper>, max_in_list: usize) -> Self {
        Self {
            resolver,
            mapper,
            max_in_list: max_in_list.max(1),
        }
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn from_clause(&self, entity: EntityTypeId) -> Result<FromClause, SchemaError> {
        let chain = self.resolver.table_chain(entity)?;
        let Some(root) = chain.first() else {
            return Err(SchemaError::SchemaMapping {
                element: self.resolver.model().entity(entity).name.clone(),
                count: 0,
            });
        };
        let mut sql = format!("FROM {} r0", root.table);
        let mut aliases = FxHashMap::default();
        aliases.insert(root.table.clone(), "r0".to_string());
        let mut anchor_alias = "r0".to_string();
        for (i, info) in chain.iter().enumerate().skip(1) {
            let alias = format!("r{i}");
            sql.push_str(&format!(
                " JOIN {} {alias} ON {alias}.{} = r0.{}",
                info.table, info.id_column, root.id_column
            ));
            aliases.insert(info.table.clone(), alias.clone());
            anchor_alias = alias;
        }
        Ok(FromClause {
            entity,
            sql,
            aliases,
            anchor_alias,
            id_expr: format!("r0.{}", root.id_column),
        })
    }

    /// Resolve `{self}` in a derived expression to the alias of the declaring type's table.
    fn derived_expr(&self, from: &FromClause, owner: EntityTypeId, template: &str) -> String {
        let alias = self
            .resolver
            .table(owner)
            .ok()
            .and_then(|info| from.aliases.get(&info.table).cloned())
            .unwrap_or_else(|| from.anchor_alias.clone());
        format!("({})", template.replace("{self}", &alias))
    }

    fn attribute_expr(&self, from: &FromClause, name: &str) -> PersistenceResult<Expr> {
        if name == keys::ID {
            return Ok(Expr {
                sql: from.id_expr.clone(),
                data_type: None,
            });
        }
        let model = self.resolver.model();
        let attribute_id = model.find_attribute(from.entity, name).ok_or_else(|| {
            SchemaError::UnknownElement {
                kind: "attribute",
                name: format!("{}.{name}", model.entity(from.entity).name),
            }
        })?;
        let attribute = model.attribute(attribute_id);
        let sql = match &attribute.kind {
            AttributeKind::Stored => {
                let column = self.resolver.attribute_column(from.entity, attribute_id)?;
                let alias = from.aliases.get(&column.table).ok_or_else(|| {
                    SchemaError::invalid_model(format!(
                        "column table '{}' is outside the chain of {}",
                        column.table,
                        model.entity(from.entity).name
                    ))
                })?;
                format!("{alias}.{}", column.column)
            }
            AttributeKind::Derived { expression } => self.derived_expr(from, attribute.owner, expression),
            AttributeKind::Static { .. } => {
                return Err(SchemaError::UnknownElement {
                    kind: "queryable attribute",
                    name: model.qualified_attribute_name(attribute_id),
                }
                .into())
            }
        };
        Ok(Expr {
            sql,
            data_type: Some(attribute.data_type.clone()),
        })
    }

    /// Render a filter into SQL, adding its values to `source`.
    pub fn render_filter(
        &self,
        from: &FromClause,
        filter: &Filter,
        source: &mut ParameterSource,
    ) -> PersistenceResult<String> {
        let mut counter = 0;
        self.render(from, filter, source, &mut counter)
    }

    fn render(
        &self,
        from: &FromClause,
        filter: &Filter,
        source: &mut ParameterSource,
        counter: &mut usize,
    ) -> PersistenceResult<String> {
        Ok(match filter {
            Filter::And(items) if items.is_empty() => "1 = 1".to_string(),
            Filter::Or(items) if items.is_empty() => "1 = 0".to_string(),
            Filter::And(items) | Filter::Or(items) => {
                let joiner = if matches!(filter, Filter::And(_)) { " AND " } else { " OR " };
                let parts = items
                    .iter()
                    .map(|item| self.render(from, item, source, counter).map(|s| format!("({s})")))
                    .collect::<PersistenceResult<Vec<_>>>()?;
                parts.join(joiner)
            }
            Filter::Not(inner) => format!("NOT ({})", self.render(from, inner, source, counter)?),
            Filter::Condition(condition) => self.render_condition(from, condition, source, counter)?,
        })
    }

    fn render_condition(
        &self,
        from: &FromClause,
        condition: &Condition,
        source: &mut ParameterSource,
        counter: &mut usize,
    ) -> PersistenceResult<String> {
        let expr = self.attribute_expr(from, &condition.attribute)?;
        if condition.op.is_unary() {
            return Ok(format!("{} {}", expr.sql, condition.op.sql()));
        }
        let entity_name = &self.resolver.model().entity(from.entity).name;
        let invalid = |reason: String| StatementError::InvalidPayload {
            entity: entity_name.clone(),
            reason,
        };
        let json = condition
            .value
            .as_ref()
            .ok_or_else(|| invalid(format!("condition on '{}' has no value", condition.attribute)))?;

        if condition.op == Operator::In {
            let serde_json::Value::Array(items) = json else {
                return Err(invalid(format!("IN on '{}' needs a list", condition.attribute)).into());
            };
            if items.is_empty() {
                return Ok("1 = 0".to_string());
            }
            let params = items
                .iter()
                .map(|item| self.bind(from, &expr, item, counter))
                .collect::<PersistenceResult<Vec<_>>>()?;
            let group = source.add_list(params);
            return Ok(format!("{} IN {group}", expr.sql));
        }

        let param = self.bind(from, &expr, json, counter)?;
        let name = param.name.clone();
        source.add(param);
        Ok(format!("{} {} :{name}", expr.sql, condition.op.sql()))
    }

    fn bind(
        &self,
        from: &FromClause,
        expr: &Expr,
        json: &serde_json::Value,
        counter: &mut usize,
    ) -> PersistenceResult<crate::parameters::Parameter> {
        let name = format!("f_{counter}");
        *counter += 1;
        let value = json_to_value(json).filter(Value::is_scalar).ok_or_else(|| {
            StatementError::InvalidPayload {
                entity: self.resolver.model().entity(from.entity).name.clone(),
                reason: format!("filter value {json} is not a scalar"),
            }
        })?;
        match &expr.data_type {
            Some(dt) => Ok(self.mapper.create_parameter(&value, Some(dt), &name)?),
            None => {
                let id = Id::from_value(&value).ok_or_else(|| StatementError::InvalidPayload {
                    entity: self.resolver.model().entity(from.entity).name.clone(),
                    reason: format!("{json} is not an identifier"),
                })?;
                let id_type = self.resolver.identifier_type(from.entity)?;
                Ok(self.mapper.create_id_parameter(id_type, &id, &name))
            }
        }
    }

    /// Count instances of `entity` matching `filter`.
    pub fn count(&self, conn: &Connection, entity: EntityTypeId, filter: Option<&Filter>) -> PersistenceResult<u64> {
        let from = self.from_clause(entity)?;
        let mut source = ParameterSource::new();
        let mut sql = format!("SELECT COUNT(*) {}", from.sql);
        if let Some(filter) = filter {
            let clause = self.render_filter(&from, filter, &mut source)?;
            sql.push_str(&format!(" WHERE {clause}"));
        }
        let count: i64 = conn
            .query_row(&sql, source.as_named().as_slice(), |row| row.get(0))
            .map_err(to_storage_err)?;
        Ok(count.max(0) as u64)
    }

    /// Ids of `entity` matching `filter`, in keyset order. Without `seek` every match is returned.
    pub fn search_ids(
        &self,
        conn: &Connection,
        entity: EntityTypeId,
        filter: Option<&Filter>,
        order_by: Option<&OrderBy>,
        seek: Option<&Seek>,
    ) -> PersistenceResult<Page<Id>> {
        let from = self.from_clause(entity)?;
        let mut source = ParameterSource::new();
        let mut clauses = Vec::new();
        if let Some(filter) = filter {
            clauses.push(self.render_filter(&from, filter, &mut source)?);
        }

        let sort = order_by
            .map(|o| self.attribute_expr(&from, &o.attribute).map(|e| (e.sql, o.descending)))
            .transpose()?;

        if let Some(encoded) = seek.and_then(|s| s.after.as_deref()) {
            let cursor = SeekCursor::decode(encoded).ok_or_else(|| StatementError::InvalidPayload {
                entity: self.resolver.model().entity(entity).name.clone(),
                reason: "malformed seek cursor".to_string(),
            })?;
            clauses.push(self.seek_clause(&from, sort.as_ref(), &cursor, &mut source)?);
        }

        let mut select = vec![from.id_expr.clone()];
        let mut order = Vec::new();
        if let Some((expr, descending)) = &sort {
            select.push(expr.clone());
            order.push(format!("{expr}{}", if *descending { " DESC" } else { "" }));
        }
        order.push(from.id_expr.clone());

        let mut sql = format!("SELECT {} {}", select.join(", "), from.sql);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        if let Some(seek) = seek {
            let limit = self.mapper.create_parameter(
                &Value::Integer(seek.limit as i64 + 1),
                Some(&DataType::Integer),
                "seek_limit",
            )?;
            source.add(limit);
            sql.push_str(" LIMIT :seek_limit");
        }

        let mut stmt = conn.prepare(&sql).map_err(to_storage_err)?;
        let mut rows = stmt.query(source.as_named().as_slice()).map_err(to_storage_err)?;
        let mut hits: Vec<(Id, Option<serde_json::Value>)> = Vec::new();
        while let Some(row) = rows.next().map_err(to_storage_err)? {
            let Some(id) = read_id(row, 0)? else {
                continue;
            };
            let sort_value = if sort.is_some() {
                let raw = row.get_ref(1).map_err(to_storage_err)?;
                Some(value_to_json(&raw_value(raw).map_err(to_storage_err)?))
            } else {
                None
            };
            hits.push((id, sort_value));
        }

        let Some(seek) = seek else {
            return Ok(Page {
                items: hits.into_iter().map(|(id, _)| id).collect(),
                has_more: false,
                next_cursor: None,
            });
        };
        let has_more = hits.len() > seek.limit;
        hits.truncate(seek.limit);
        let next_cursor = if has_more {
            hits.last().map(|(id, sort_value)| {
                SeekCursor {
                    last_sort_value: sort_value.clone(),
                    last_id: id.clone(),
                }
                .encode()
            })
        } else {
            None
        };
        Ok(Page {
            items: hits.into_iter().map(|(id, _)| id).collect(),
            has_more,
            next_cursor,
        })
    }

    /// Keyset predicate for rows after `cursor` under `ORDER BY sort, id`.
    /// SQLite sorts NULL first ascending and last descending.
    fn seek_clause(
        &self,
        from: &FromClause,
        sort: Option<&(String, bool)>,
        cursor: &SeekCursor,
        source: &mut ParameterSource,
    ) -> PersistenceResult<String> {
        let id_type = self.resolver.identifier_type(from.entity)?;
        source.add(self.mapper.create_id_parameter(id_type, &cursor.last_id, "seek_id"));
        let id = &from.id_expr;
        let Some((expr, descending)) = sort else {
            return Ok(format!("{id} > :seek_id"));
        };
        let last = cursor
            .last_sort_value
            .as_ref()
            .and_then(json_to_value)
            .filter(|v| !v.is_null() && v.is_scalar());
        let Some(last) = last else {
            return Ok(if *descending {
                format!("({expr} IS NULL AND {id} > :seek_id)")
            } else {
                format!("(({expr} IS NULL AND {id} > :seek_id) OR {expr} IS NOT NULL)")
            });
        };
        source.add(self.mapper.create_parameter(&last, None, "seek_value")?);
        Ok(if *descending {
            format!("({expr} < :seek_value OR ({expr} = :seek_value AND {id} > :seek_id) OR {expr} IS NULL)")
        } else {
            format!("({expr} > :seek_value OR ({expr} = :seek_value AND {id} > :seek_id))")
        })
    }

    /// Attribute rows for `ids`, keyed by id. Static attributes are left to the caller.
    pub fn load_attributes(
        &self,
        conn: &Connection,
        entity: EntityTypeId,
        ids: &[Id],
        mask: Option<&AttributeMask>,
    ) -> PersistenceResult<FxHashMap<Id, Payload>> {
        let model = self.resolver.model();
        let from = self.from_clause(entity)?;
        let version = self.resolver.version_column(entity)?;

        let mut columns = vec![from.id_expr.clone()];
        if let Some(version) = &version {
            let alias = from.aliases.get(&version.table).cloned().unwrap_or_else(|| "r0".to_string());
            columns.push(format!("{alias}.{}", version.column));
        }
        let mut selected = Vec::new();
        for attribute_id in model.all_attributes(entity) {
            let attribute = model.attribute(attribute_id);
            if matches!(attribute.kind, AttributeKind::Static { .. }) {
                continue;
            }
            if mask.is_some_and(|m| !m.admits(&attribute.name)) {
                continue;
            }
            let expr = self.attribute_expr(&from, &attribute.name)?;
            columns.push(expr.sql);
            selected.push(attribute_id);
        }

        let offset = 1 + usize::from(version.is_some());
        let id_type = self.resolver.identifier_type(entity)?;
        let mut out = FxHashMap::default();
        for chunk in chunked(ids, self.max_in_list) {
            let mut source = ParameterSource::new();
            let params = chunk
                .iter()
                .enumerate()
                .map(|(i, id)| self.mapper.create_id_parameter(id_type, id, &format!("id_{i}")))
                .collect();
            let group = source.add_list(params);
            let sql = format!(
                "SELECT {} {} WHERE {} IN {group}",
                columns.join(", "),
                from.sql,
                from.id_expr
            );
            let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
            let mut rows = stmt.query(source.as_named().as_slice()).map_err(to_storage_err)?;
            while let Some(row) = rows.next().map_err(to_storage_err)? {
                let Some(id) = read_id(row, 0)? else {
                    continue;
                };
                let mut payload = Payload::stub(&id);
                if version.is_some() {
                    let v: Option<i64> = row.get(1).map_err(to_storage_err)?;
                    payload.set_version(v.unwrap_or(0));
                }
                payload.insert(keys::TYPE, Value::Text(model.entity(entity).name.clone()));
                for (i, attribute_id) in selected.iter().enumerate() {
                    let attribute = model.attribute(*attribute_id);
                    let raw = row.get_ref(offset + i).map_err(to_storage_err)?;
                    let value = from_sql_value(raw, &attribute.data_type).map_err(|message| {
                        strata_core::errors::StorageError::ValueConversion {
                            column: model.qualified_attribute_name(*attribute_id),
                            message,
                        }
                    })?;
                    payload.insert(&attribute.name, value);
                }
                out.insert(id, payload);
            }
        }
        Ok(out)
    }

    /// Ids among `ids` that exist as `entity`.
    pub fn existing_ids(&self, conn: &Connection, entity: EntityTypeId, ids: &[Id]) -> PersistenceResult<Vec<Id>> {
        let from = self.from_clause(entity)?;
        let id_type = self.resolver.identifier_type(entity)?;
        let mut found = Vec::new();
        for chunk in chunked(ids, self.max_in_list) {
            let mut source = ParameterSource::new();
            let params = chunk
                .iter()
                .enumerate()
                .map(|(i, id)| self.mapper.create_id_parameter(id_type, id, &format!("id_{i}")))
                .collect();
            let group = source.add_list(params);
            let sql = format!("SELECT {} {} WHERE {} IN {group}", from.id_expr, from.sql, from.id_expr);
            let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
            let mut rows = stmt.query(source.as_named().as_slice()).map_err(to_storage_err)?;
            while let Some(row) = rows.next().map_err(to_storage_err)? {
                if let Some(id) = read_id(row, 0)? {
                    found.push(id);
                }
            }
        }
        Ok(found)
    }
}
