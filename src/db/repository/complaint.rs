use rusqlite::{params, Connection, OptionalExtension};

use super::now_utc;
use super::review::linked;
use crate::db::DatabaseError;
use crate::models::*;

/// Store a complaint together with its reasons. Unknown reason ids are
/// skipped.
pub fn create_complaint(
    conn: &Connection,
    contact_name: Option<&str>,
    contact_phone: Option<&str>,
    complaint_text: &str,
    reason_ids: &[i64],
) -> Result<i64, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO complaints (created_at, contact_name, contact_phone, complaint_text)
         VALUES (?1, ?2, ?3, ?4)",
        params![now_utc(), contact_name, contact_phone, complaint_text],
    )?;
    let id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO complaint_reasons (complaint_id, reason_id)
             SELECT ?1, id FROM reasons WHERE id = ?2",
        )?;
        for reason_id in reason_ids {
            stmt.execute(params![id, reason_id])?;
        }
    }
    tx.commit()?;
    Ok(id)
}

pub fn get_complaint(conn: &Connection, id: i64) -> Result<Option<Complaint>, DatabaseError> {
    let complaint = conn
        .query_row(
            "SELECT id, created_at, contact_name, contact_phone, complaint_text
             FROM complaints WHERE id = ?1",
            [id],
            |row| {
                Ok(Complaint {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    contact_name: row.get(2)?,
                    contact_phone: row.get(3)?,
                    complaint_text: row.get(4)?,
                    selected_reasons: Vec::new(),
                })
            },
        )
        .optional()?;

    match complaint {
        Some(mut complaint) => {
            complaint.selected_reasons =
                linked(conn, "complaint_reasons", "complaint_id", "reason_id", id)?;
            Ok(Some(complaint))
        }
        None => Ok(None),
    }
}

/// Complaints created inside `range`, newest first.
pub fn list_complaints(conn: &Connection, range: &DateRange) -> Result<Vec<Complaint>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM complaints
         WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at <= ?2)
         ORDER BY created_at DESC, id DESC",
    )?;
    let ids = stmt
        .query_map(params![range.after, range.before], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut complaints = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(complaint) = get_complaint(conn, id)? {
            complaints.push(complaint);
        }
    }
    Ok(complaints)
}
