use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::Prompt;

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        prompt_text: row.get(1)?,
        temperature: row.get(2)?,
        frequency_penalty: row.get(3)?,
    })
}

pub fn get_prompt(conn: &Connection, id: &str) -> Result<Option<Prompt>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, prompt_text, temperature, frequency_penalty FROM prompts WHERE id = ?1",
            [id],
            prompt_from_row,
        )
        .optional()?)
}

pub fn list_prompts(conn: &Connection) -> Result<Vec<Prompt>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, prompt_text, temperature, frequency_penalty FROM prompts ORDER BY id")?;
    let rows = stmt.query_map([], prompt_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn upsert_prompt(conn: &Connection, prompt: &Prompt) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prompts (id, prompt_text, temperature, frequency_penalty, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            prompt_text = excluded.prompt_text,
            temperature = excluded.temperature,
            frequency_penalty = excluded.frequency_penalty,
            updated_at = excluded.updated_at",
        params![prompt.id, prompt.prompt_text, prompt.temperature, prompt.frequency_penalty],
    )?;
    Ok(())
}
