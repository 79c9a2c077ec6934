use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::Owner;

pub fn get_owner(conn: &Connection) -> Result<Option<Owner>, DatabaseError> {
    Ok(conn
        .query_row("SELECT name, avatar_url FROM owner WHERE id = 1", [], |row| {
            Ok(Owner {
                name: row.get(0)?,
                avatar_url: row.get(1)?,
            })
        })
        .optional()?)
}

pub fn set_owner(conn: &Connection, owner: &Owner) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO owner (id, name, avatar_url) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, avatar_url = excluded.avatar_url",
        params![owner.name, owner.avatar_url],
    )?;
    Ok(())
}
