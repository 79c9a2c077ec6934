use std::collections::HashSet;

use rusqlite::{params, params_from_iter, Connection, Params, Row};

use super::placeholders;
use crate::db::DatabaseError;
use crate::models::*;

/// A reference-data table with enable flag and manual ordering.
///
/// Implementors name their table and column list and map a row; the generic
/// functions below provide listing, lookup, deletion and reordering.
pub trait ReferenceEntity: Sized {
    const KIND: CatalogKind;
    const TABLE: &'static str;
    /// Column list matching the order `from_row` reads.
    const COLUMNS: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Attach related rows after loading (doctors load their services).
    fn hydrate(_conn: &Connection, _items: &mut [Self]) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Reference entities that carry only a name (aspects, sources, reasons).
pub trait NamedEntity: ReferenceEntity {}

impl ReferenceEntity for Service {
    const KIND: CatalogKind = CatalogKind::Service;
    const TABLE: &'static str = "services";
    const COLUMNS: &'static str = "id, name, category, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            is_enabled: row.get(3)?,
            position: row.get(4)?,
        })
    }
}

impl ReferenceEntity for Aspect {
    const KIND: CatalogKind = CatalogKind::Aspect;
    const TABLE: &'static str = "aspects";
    const COLUMNS: &'static str = "id, name, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Aspect {
            id: row.get(0)?,
            name: row.get(1)?,
            is_enabled: row.get(2)?,
            position: row.get(3)?,
        })
    }
}

impl NamedEntity for Aspect {}

impl ReferenceEntity for Source {
    const KIND: CatalogKind = CatalogKind::Source;
    const TABLE: &'static str = "sources";
    const COLUMNS: &'static str = "id, name, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Source {
            id: row.get(0)?,
            name: row.get(1)?,
            is_enabled: row.get(2)?,
            position: row.get(3)?,
        })
    }
}

impl NamedEntity for Source {}

impl ReferenceEntity for Reason {
    const KIND: CatalogKind = CatalogKind::Reason;
    const TABLE: &'static str = "reasons";
    const COLUMNS: &'static str = "id, name, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Reason {
            id: row.get(0)?,
            name: row.get(1)?,
            is_enabled: row.get(2)?,
            position: row.get(3)?,
        })
    }
}

impl NamedEntity for Reason {}

impl ReferenceEntity for Reward {
    const KIND: CatalogKind = CatalogKind::Reward;
    const TABLE: &'static str = "rewards";
    const COLUMNS: &'static str = "id, name, image_url, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Reward {
            id: row.get(0)?,
            name: row.get(1)?,
            image_url: row.get(2)?,
            is_enabled: row.get(3)?,
            position: row.get(4)?,
        })
    }
}

impl ReferenceEntity for Platform {
    const KIND: CatalogKind = CatalogKind::Platform;
    const TABLE: &'static str = "platforms";
    const COLUMNS: &'static str = "id, name, url, image_url, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Platform {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            image_url: row.get(3)?,
            is_enabled: row.get(4)?,
            position: row.get(5)?,
        })
    }
}

fn query<T: ReferenceEntity, P: Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> Result<Vec<T>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM {} {} ORDER BY position, id",
        T::COLUMNS,
        T::TABLE,
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, T::from_row)?;
    let mut items = rows.collect::<Result<Vec<_>, _>>()?;
    T::hydrate(conn, &mut items)?;
    Ok(items)
}

/// Every row, enabled or not (admin view).
pub fn list_all<T: ReferenceEntity>(conn: &Connection) -> Result<Vec<T>, DatabaseError> {
    query(conn, "", [])
}

/// Enabled rows only (patient-facing view).
pub fn list_enabled<T: ReferenceEntity>(conn: &Connection) -> Result<Vec<T>, DatabaseError> {
    query(conn, "WHERE is_enabled = 1", [])
}

pub fn get_by_id<T: ReferenceEntity>(conn: &Connection, id: i64) -> Result<Option<T>, DatabaseError> {
    let mut items = query(conn, "WHERE id = ?1", [id])?;
    Ok(items.pop())
}

/// Rows matching `ids`, ordered by position. Unknown ids are skipped.
pub fn get_by_ids<T: ReferenceEntity>(
    conn: &Connection,
    ids: &[i64],
    enabled_only: bool,
) -> Result<Vec<T>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut filter = format!("WHERE id IN ({})", placeholders(ids.len()));
    if enabled_only {
        filter.push_str(" AND is_enabled = 1");
    }
    query(conn, &filter, params_from_iter(ids.iter()))
}

/// Delete a row. Returns `false` when it did not exist.
pub fn delete_entity<T: ReferenceEntity>(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", T::TABLE);
    let changed = conn.execute(&sql, [id])?;
    Ok(changed > 0)
}

/// Position for a newly inserted row (after every existing one).
pub fn next_position<T: ReferenceEntity>(conn: &Connection) -> Result<i64, DatabaseError> {
    let sql = format!("SELECT COALESCE(MAX(position) + 1, 0) FROM {}", T::TABLE);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Apply a manual ordering.
///
/// `ordered_ids` come first in the given order; rows not mentioned keep their
/// relative order after them. Positions are rewritten as `0..n`.
pub fn reorder<T: ReferenceEntity>(conn: &Connection, ordered_ids: &[i64]) -> Result<(), DatabaseError> {
    let mut seen = HashSet::with_capacity(ordered_ids.len());
    if let Some(dup) = ordered_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "duplicate id {dup} in {} ordering",
            T::KIND
        )));
    }

    let current: Vec<i64> = {
        let sql = format!("SELECT id FROM {} ORDER BY position, id", T::TABLE);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };
    let existing: HashSet<i64> = current.iter().copied().collect();
    if let Some(missing) = ordered_ids.iter().find(|id| !existing.contains(id)) {
        return Err(DatabaseError::not_found(T::KIND.label(), missing));
    }

    let order = ordered_ids
        .iter()
        .copied()
        .chain(current.into_iter().filter(|id| !seen.contains(id)));

    let tx = conn.unchecked_transaction()?;
    {
        let sql = format!("UPDATE {} SET position = ?1 WHERE id = ?2", T::TABLE);
        let mut stmt = tx.prepare(&sql)?;
        for (position, id) in order.enumerate() {
            stmt.execute(params![position as i64, id])?;
        }
    }
    tx.commit()?;
    Ok(())
}
