use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, Row};

use super::placeholders;
use super::reference::{get_by_id, next_position, ReferenceEntity};
use crate::db::DatabaseError;
use crate::models::*;

impl ReferenceEntity for Doctor {
    const KIND: CatalogKind = CatalogKind::Doctor;
    const TABLE: &'static str = "doctors";
    const COLUMNS: &'static str = "id, name, role, avatar_url, is_enabled, position";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Doctor {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            avatar_url: row.get(3)?,
            is_enabled: row.get(4)?,
            position: row.get(5)?,
            services: Vec::new(),
        })
    }

    fn hydrate(conn: &Connection, items: &mut [Self]) -> Result<(), DatabaseError> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = items.iter().map(|d| d.id).collect();
        let sql = format!(
            "SELECT ds.doctor_id, s.id, s.name, s.category, s.is_enabled, s.position
             FROM doctor_services ds JOIN services s ON s.id = ds.service_id
             WHERE ds.doctor_id IN ({})
             ORDER BY s.position, s.id",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            let doctor_id: i64 = row.get(0)?;
            let service = Service {
                id: row.get(1)?,
                name: row.get(2)?,
                category: row.get(3)?,
                is_enabled: row.get(4)?,
                position: row.get(5)?,
            };
            Ok((doctor_id, service))
        })?;

        let mut by_doctor: HashMap<i64, Vec<Service>> = HashMap::new();
        for row in rows {
            let (doctor_id, service) = row?;
            by_doctor.entry(doctor_id).or_default().push(service);
        }
        for doctor in items.iter_mut() {
            doctor.services = by_doctor.remove(&doctor.id).unwrap_or_default();
        }
        Ok(())
    }
}

fn replace_services(conn: &Connection, doctor_id: i64, service_ids: &[i64]) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM doctor_services WHERE doctor_id = ?1", [doctor_id])?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO doctor_services (doctor_id, service_id)
         SELECT ?1, id FROM services WHERE id = ?2",
    )?;
    for service_id in service_ids {
        stmt.execute(params![doctor_id, service_id])?;
    }
    Ok(())
}

/// Insert a doctor and link the given services. Unknown service ids are
/// ignored.
pub fn insert_doctor(conn: &Connection, input: &DoctorInput) -> Result<Doctor, DatabaseError> {
    let position = next_position::<Doctor>(conn)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO doctors (name, role, avatar_url, is_enabled, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![input.name, input.role, input.avatar_url, input.is_enabled, position],
    )?;
    let id = tx.last_insert_rowid();
    replace_services(&tx, id, &input.service_ids)?;
    tx.commit()?;

    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("Doctor", id))
}

/// Update a doctor and replace its service links.
pub fn update_doctor(conn: &Connection, id: i64, input: &DoctorInput) -> Result<Doctor, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE doctors SET name = ?1, role = ?2, avatar_url = ?3, is_enabled = ?4 WHERE id = ?5",
        params![input.name, input.role, input.avatar_url, input.is_enabled, id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Doctor", id));
    }
    replace_services(&tx, id, &input.service_ids)?;
    tx.commit()?;

    get_by_id(conn, id)?.ok_or_else(|| DatabaseError::not_found("Doctor", id))
}

/// Distinct enabled services offered by any of the given doctors, ordered by
/// position.
pub fn services_for_doctors(conn: &Connection, doctor_ids: &[i64]) -> Result<Vec<Service>, DatabaseError> {
    if doctor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT s.id, s.name, s.category, s.is_enabled, s.position
         FROM services s JOIN doctor_services ds ON ds.service_id = s.id
         WHERE ds.doctor_id IN ({}) AND s.is_enabled = 1
         ORDER BY s.position, s.id",
        placeholders(doctor_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(doctor_ids.iter()), Service::from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
