use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

const USER_COLUMNS: &str = "id, name, username, password_hash, is_admin, avatar_url,
     telegram_id, telegram_name, max_id, max_name";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        is_admin: row.get(4)?,
        avatar_url: row.get(5)?,
        telegram_id: row.get(6)?,
        telegram_name: row.get(7)?,
        max_id: row.get(8)?,
        max_name: row.get(9)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn map_username_conflict(err: rusqlite::Error, username: &str) -> DatabaseError {
    if is_unique_violation(&err) {
        DatabaseError::ConstraintViolation(format!("username '{username}' is already taken"))
    } else {
        DatabaseError::Sqlite(err)
    }
}

/// Insert a user with an already-hashed password.
pub fn insert_user(
    conn: &Connection,
    input: &UserInput,
    password_hash: &str,
) -> Result<User, DatabaseError> {
    conn.execute(
        "INSERT INTO users (name, username, password_hash, is_admin, avatar_url)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![input.name, input.username, password_hash, input.is_admin, input.avatar_url],
    )
    .map_err(|e| map_username_conflict(e, &input.username))?;

    let id = conn.last_insert_rowid();
    get_user(conn, id)?.ok_or_else(|| DatabaseError::not_found("User", id))
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
    Ok(conn.query_row(&sql, [username], user_from_row).optional()?)
}

/// User whose chat on `channel` is `chat_id`.
pub fn get_user_by_chat(conn: &Connection, channel: Channel, chat_id: i64) -> Result<Option<User>, DatabaseError> {
    let (id_col, _) = link_columns(channel);
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {id_col} = ?1");
    Ok(conn.query_row(&sql, [chat_id], user_from_row).optional()?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], user_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Update profile fields. `password_hash` of `None` keeps the current one.
pub fn update_user(
    conn: &Connection,
    id: i64,
    input: &UserInput,
    password_hash: Option<&str>,
) -> Result<User, DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE users SET name = ?1, username = ?2, is_admin = ?3, avatar_url = ?4,
             password_hash = COALESCE(?5, password_hash)
             WHERE id = ?6",
            params![input.name, input.username, input.is_admin, input.avatar_url, password_hash, id],
        )
        .map_err(|e| map_username_conflict(e, &input.username))?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    get_user(conn, id)?.ok_or_else(|| DatabaseError::not_found("User", id))
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0)
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

pub fn count_admins(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM users WHERE is_admin = 1",
        [],
        |row| row.get(0),
    )?)
}

fn link_columns(channel: Channel) -> (&'static str, &'static str) {
    match channel {
        Channel::Telegram => ("telegram_id", "telegram_name"),
        Channel::Max => ("max_id", "max_name"),
    }
}

/// Attach a messenger chat to a user. A chat belongs to at most one user, so
/// any previous owner of `chat_id` on this channel is unlinked first.
pub fn set_messenger_link(
    conn: &Connection,
    user_id: i64,
    channel: Channel,
    chat_id: i64,
    display_name: Option<&str>,
) -> Result<(), DatabaseError> {
    let (id_col, name_col) = link_columns(channel);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        &format!("UPDATE users SET {id_col} = NULL, {name_col} = NULL WHERE {id_col} = ?1 AND id != ?2"),
        params![chat_id, user_id],
    )?;
    let changed = tx.execute(
        &format!("UPDATE users SET {id_col} = ?1, {name_col} = ?2 WHERE id = ?3"),
        params![chat_id, display_name, user_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", user_id));
    }
    tx.commit()?;
    Ok(())
}

pub fn clear_messenger_link(conn: &Connection, user_id: i64, channel: Channel) -> Result<bool, DatabaseError> {
    let (id_col, name_col) = link_columns(channel);
    let changed = conn.execute(
        &format!("UPDATE users SET {id_col} = NULL, {name_col} = NULL WHERE id = ?1 AND {id_col} IS NOT NULL"),
        [user_id],
    )?;
    Ok(changed > 0)
}

/// Unlink only if `chat_id` is still the chat linked to the user. Used by the
/// bots so one chat cannot unlink somebody else.
pub fn unlink_chat(
    conn: &Connection,
    user_id: i64,
    channel: Channel,
    chat_id: i64,
) -> Result<bool, DatabaseError> {
    let (id_col, name_col) = link_columns(channel);
    let changed = conn.execute(
        &format!("UPDATE users SET {id_col} = NULL, {name_col} = NULL WHERE id = ?1 AND {id_col} = ?2"),
        params![user_id, chat_id],
    )?;
    Ok(changed > 0)
}

/// Every linked chat across both channels.
pub fn list_recipients(conn: &Connection) -> Result<Vec<Recipient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, telegram_id, max_id FROM users
         WHERE telegram_id IS NOT NULL OR max_id IS NOT NULL
         ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<i64>>(1)?,
            row.get::<_, Option<i64>>(2)?,
        ))
    })?;

    let mut recipients = Vec::new();
    for row in rows {
        let (user_id, telegram, max) = row?;
        if let Some(chat_id) = telegram {
            recipients.push(Recipient { user_id, channel: Channel::Telegram, chat_id });
        }
        if let Some(chat_id) = max {
            recipients.push(Recipient { user_id, channel: Channel::Max, chat_id });
        }
    }
    Ok(recipients)
}
