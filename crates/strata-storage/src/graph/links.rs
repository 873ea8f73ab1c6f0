//! Direct parent → child id lookups along one storage link.

use rusqlite::Connection;
use strata_core::errors::PersistenceResult;
use strata_core::model::EntityTypeId;
use strata_core::payload::Id;

use crate::parameters::source::chunked;
use crate::parameters::{ParameterMapper, ParameterSource};
use crate::rules::EdgeLink;
use crate::schema::SchemaResolver;
use crate::to_storage_err;

/// `(parent id, child id)` pairs linked through `link`, for the given parent ids.
pub fn linked_pairs(
    conn: &Connection,
    resolver: &SchemaResolver,
    mapper: &ParameterMapper,
    max_in_list: usize,
    link: &EdgeLink,
    parent_entity: EntityTypeId,
    parent_ids: &[Id],
) -> PersistenceResult<Vec<(Id, Id)>> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let (parent_col, child_col, table, extra) = match link {
        EdgeLink::OnParent { table, column } => {
            let info = resolver.table_by_name(table)?;
            (info.id_column, column.clone(), table.clone(), format!(" AND {column} IS NOT NULL"))
        }
        EdgeLink::OnChild { table, column } => {
            let info = resolver.table_by_name(table)?;
            (column.clone(), info.id_column, table.clone(), String::new())
        }
        EdgeLink::Junction {
            table,
            parent_column,
            child_column,
        } => (parent_column.clone(), child_column.clone(), table.clone(), String::new()),
    };
    let id_type = resolver.identifier_type(parent_entity)?;

    let mut pairs = Vec::new();
    for chunk in chunked(parent_ids, max_in_list) {
        let mut source = ParameterSource::new();
        let params = chunk
            .iter()
            .enumerate()
            .map(|(i, id)| mapper.create_id_parameter(id_type, id, &format!("p_{i}")))
            .collect();
        let placeholders = source.add_list(params);
        let sql = format!(
            "SELECT {parent_col}, {child_col} FROM {table} WHERE {parent_col} IN {placeholders}{extra} ORDER BY 1, 2"
        );
        let mut stmt = conn.prepare_cached(&sql).map_err(to_storage_err)?;
        let mut rows = stmt.query(source.as_named().as_slice()).map_err(to_storage_err)?;
        while let Some(row) = rows.next().map_err(to_storage_err)? {
            let parent = read_id(row, 0)?;
            let child = read_id(row, 1)?;
            if let (Some(parent), Some(child)) = (parent, child) {
                pairs.push((parent, child));
            }
        }
    }
    Ok(pairs)
}

/// Read an identifier column; NULL yields `None`.
pub fn read_id(row: &rusqlite::Row<'_>, index: usize) -> PersistenceResult<Option<Id>> {
    let raw = row.get_ref(index).map_err(to_storage_err)?;
    let value = crate::parameters::codec::raw_value(raw).map_err(to_storage_err)?;
    Ok(Id::from_value(&value))
}
