use rusqlite::{params, Connection};

use super::reference::{get_by_id, next_position, NamedEntity, ReferenceEntity};
use crate::db::DatabaseError;
use crate::models::*;

fn reload<T: ReferenceEntity>(conn: &Connection, id: i64) -> Result<T, DatabaseError> {
    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found(T::KIND.label(), id))
}

fn ensure_updated<T: ReferenceEntity>(changed: usize, id: i64) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::not_found(T::KIND.label(), id));
    }
    Ok(())
}

// ── Services ────────────────────────────────────────────

pub fn insert_service(conn: &Connection, input: &ServiceInput) -> Result<Service, DatabaseError> {
    let position = next_position::<Service>(conn)?;
    conn.execute(
        "INSERT INTO services (name, category, is_enabled, position) VALUES (?1, ?2, ?3, ?4)",
        params![input.name, input.category, input.is_enabled, position],
    )?;
    reload(conn, conn.last_insert_rowid())
}

pub fn update_service(conn: &Connection, id: i64, input: &ServiceInput) -> Result<Service, DatabaseError> {
    let changed = conn.execute(
        "UPDATE services SET name = ?1, category = ?2, is_enabled = ?3 WHERE id = ?4",
        params![input.name, input.category, input.is_enabled, id],
    )?;
    ensure_updated::<Service>(changed, id)?;
    reload(conn, id)
}

// ── Name-only entities ──────────────────────────────────

pub fn insert_named<T: NamedEntity>(conn: &Connection, input: &NamedInput) -> Result<T, DatabaseError> {
    let position = next_position::<T>(conn)?;
    let sql = format!(
        "INSERT INTO {} (name, is_enabled, position) VALUES (?1, ?2, ?3)",
        T::TABLE
    );
    conn.execute(&sql, params![input.name, input.is_enabled, position])?;
    reload(conn, conn.last_insert_rowid())
}

pub fn update_named<T: NamedEntity>(conn: &Connection, id: i64, input: &NamedInput) -> Result<T, DatabaseError> {
    let sql = format!("UPDATE {} SET name = ?1, is_enabled = ?2 WHERE id = ?3", T::TABLE);
    let changed = conn.execute(&sql, params![input.name, input.is_enabled, id])?;
    ensure_updated::<T>(changed, id)?;
    reload(conn, id)
}

// ── Rewards ─────────────────────────────────────────────

pub fn insert_reward(conn: &Connection, input: &RewardInput) -> Result<Reward, DatabaseError> {
    let position = next_position::<Reward>(conn)?;
    conn.execute(
        "INSERT INTO rewards (name, image_url, is_enabled, position) VALUES (?1, ?2, ?3, ?4)",
        params![input.name, input.image_url, input.is_enabled, position],
    )?;
    reload(conn, conn.last_insert_rowid())
}

pub fn update_reward(conn: &Connection, id: i64, input: &RewardInput) -> Result<Reward, DatabaseError> {
    let changed = conn.execute(
        "UPDATE rewards SET name = ?1, image_url = ?2, is_enabled = ?3 WHERE id = ?4",
        params![input.name, input.image_url, input.is_enabled, id],
    )?;
    ensure_updated::<Reward>(changed, id)?;
    reload(conn, id)
}

// ── Platforms ───────────────────────────────────────────

pub fn insert_platform(conn: &Connection, input: &PlatformInput) -> Result<Platform, DatabaseError> {
    let position = next_position::<Platform>(conn)?;
    conn.execute(
        "INSERT INTO platforms (name, url, image_url, is_enabled, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![input.name, input.url, input.image_url, input.is_enabled, position],
    )?;
    reload(conn, conn.last_insert_rowid())
}

pub fn update_platform(conn: &Connection, id: i64, input: &PlatformInput) -> Result<Platform, DatabaseError> {
    let changed = conn.execute(
        "UPDATE platforms SET name = ?1, url = ?2, image_url = ?3, is_enabled = ?4 WHERE id = ?5",
        params![input.name, input.url, input.image_url, input.is_enabled, id],
    )?;
    ensure_updated::<Platform>(changed, id)?;
    reload(conn, id)
}
