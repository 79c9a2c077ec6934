use rusqlite::{params, Connection, OptionalExtension};

use super::now_utc;
use super::reference::{get_by_id, get_by_ids, ReferenceEntity};
use crate::db::DatabaseError;
use crate::models::*;

/// Load the reference rows attached to `owner_id` through a link table.
pub(crate) fn linked<T: ReferenceEntity>(
    conn: &Connection,
    link_table: &str,
    owner_column: &str,
    entity_column: &str,
    owner_id: i64,
) -> Result<Vec<T>, DatabaseError> {
    let sql = format!("SELECT {entity_column} FROM {link_table} WHERE {owner_column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([owner_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    get_by_ids(conn, &ids, false)
}

fn replace_links(
    conn: &Connection,
    link_table: &str,
    entity_column: &str,
    review_id: i64,
    ids: &[i64],
) -> Result<(), DatabaseError> {
    ensure_review(conn, review_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        &format!("DELETE FROM {link_table} WHERE review_id = ?1"),
        [review_id],
    )?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT OR IGNORE INTO {link_table} (review_id, {entity_column}) VALUES (?1, ?2)"
        ))?;
        for id in ids {
            stmt.execute(params![review_id, id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn ensure_review(conn: &Connection, review_id: i64) -> Result<(), DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM reviews WHERE id = ?1)",
        [review_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(DatabaseError::not_found("Review", review_id))
    }
}

fn update_review(conn: &Connection, review_id: i64, sql: &str, value: impl rusqlite::ToSql) -> Result<(), DatabaseError> {
    let changed = conn.execute(sql, params![value, review_id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Review", review_id));
    }
    Ok(())
}

/// Start an empty review. Returns its id.
pub fn create_review(conn: &Connection) -> Result<i64, DatabaseError> {
    conn.execute("INSERT INTO reviews (created_at) VALUES (?1)", [now_utc()])?;
    Ok(conn.last_insert_rowid())
}

/// Load a review with every selection resolved.
pub fn get_review(conn: &Connection, id: i64) -> Result<Option<Review>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, created_at, contact_name, contact_phone, review_text, source_id, reward_id,
                    notified_at IS NOT NULL
             FROM reviews WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    Review {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        contact_name: row.get(2)?,
                        contact_phone: row.get(3)?,
                        review_text: row.get(4)?,
                        selected_doctors: Vec::new(),
                        selected_services: Vec::new(),
                        selected_aspects: Vec::new(),
                        selected_source: None,
                        selected_reward: None,
                        published_platforms: Vec::new(),
                        notified: row.get(7)?,
                    },
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((mut review, source_id, reward_id)) = row else {
        return Ok(None);
    };
    review.selected_doctors = linked(conn, "review_doctors", "review_id", "doctor_id", id)?;
    review.selected_services = linked(conn, "review_services", "review_id", "service_id", id)?;
    review.selected_aspects = linked(conn, "review_aspects", "review_id", "aspect_id", id)?;
    review.published_platforms = linked(conn, "review_platforms", "review_id", "platform_id", id)?;
    review.selected_source = match source_id {
        Some(sid) => get_by_id(conn, sid)?,
        None => None,
    };
    review.selected_reward = match reward_id {
        Some(rid) => get_by_id(conn, rid)?,
        None => None,
    };
    Ok(Some(review))
}

/// Reviews created inside `range`, newest first.
pub fn list_reviews(conn: &Connection, range: &DateRange) -> Result<Vec<Review>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM reviews
         WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at <= ?2)
         ORDER BY created_at DESC, id DESC",
    )?;
    let ids = stmt
        .query_map(params![range.after, range.before], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut reviews = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(review) = get_review(conn, id)? {
            reviews.push(review);
        }
    }
    Ok(reviews)
}

pub fn set_review_doctors(conn: &Connection, review_id: i64, doctor_ids: &[i64]) -> Result<(), DatabaseError> {
    replace_links(conn, "review_doctors", "doctor_id", review_id, doctor_ids)
}

pub fn set_review_services(conn: &Connection, review_id: i64, service_ids: &[i64]) -> Result<(), DatabaseError> {
    replace_links(conn, "review_services", "service_id", review_id, service_ids)
}

pub fn set_review_aspects(conn: &Connection, review_id: i64, aspect_ids: &[i64]) -> Result<(), DatabaseError> {
    replace_links(conn, "review_aspects", "aspect_id", review_id, aspect_ids)
}

pub fn set_review_source(conn: &Connection, review_id: i64, source_id: i64) -> Result<(), DatabaseError> {
    update_review(conn, review_id, "UPDATE reviews SET source_id = ?1 WHERE id = ?2", source_id)
}

pub fn set_review_reward(conn: &Connection, review_id: i64, reward_id: i64) -> Result<(), DatabaseError> {
    update_review(conn, review_id, "UPDATE reviews SET reward_id = ?1 WHERE id = ?2", reward_id)
}

pub fn set_review_text(conn: &Connection, review_id: i64, text: &str) -> Result<(), DatabaseError> {
    update_review(conn, review_id, "UPDATE reviews SET review_text = ?1 WHERE id = ?2", text)
}

pub fn set_review_contacts(
    conn: &Connection,
    review_id: i64,
    contact_name: Option<&str>,
    contact_phone: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE reviews SET contact_name = ?1, contact_phone = ?2 WHERE id = ?3",
        params![contact_name, contact_phone, review_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Review", review_id));
    }
    Ok(())
}

/// Record a publish to `platform_id`. Returns `false` if it was already
/// recorded.
pub fn add_published_platform(
    conn: &Connection,
    review_id: i64,
    platform_id: i64,
) -> Result<bool, DatabaseError> {
    ensure_review(conn, review_id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO review_platforms (review_id, platform_id, published_at)
         VALUES (?1, ?2, ?3)",
        params![review_id, platform_id, now_utc()],
    )?;
    Ok(inserted > 0)
}

/// Flag the review as announced to staff. Returns `true` only for the call
/// that flipped the flag.
pub fn mark_review_notified(conn: &Connection, review_id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE reviews SET notified_at = ?1 WHERE id = ?2 AND notified_at IS NULL",
        params![now_utc(), review_id],
    )?;
    Ok(changed > 0)
}

/// Release a claim taken by [`mark_review_notified`] when the announcement
/// could not be sent.
pub fn clear_review_notified(conn: &Connection, review_id: i64) -> Result<(), DatabaseError> {
    conn.execute("UPDATE reviews SET notified_at = NULL WHERE id = ?1", params![review_id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{delete_entity, insert_doctor, insert_named, insert_platform, insert_service};
    use crate::db::sqlite::open_memory_database;
    use chrono::{NaiveDate, NaiveDateTime};

    fn named<T: crate::db::repository::NamedEntity>(conn: &Connection, name: &str) -> T {
        insert_named(conn, &NamedInput { name: name.into(), is_enabled: true }).unwrap()
    }

    fn platform(conn: &Connection, name: &str) -> Platform {
        insert_platform(
            conn,
            &PlatformInput {
                name: name.into(),
                url: format!("https://{name}.example"),
                image_url: None,
                is_enabled: true,
            },
        )
        .unwrap()
    }

    fn backdate(conn: &Connection, id: i64, at: &str) {
        let at = NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").unwrap();
        conn.execute("UPDATE reviews SET created_at = ?1 WHERE id = ?2", params![at, id])
            .unwrap();
    }

    #[test]
    fn new_review_is_empty() {
        let conn = open_memory_database().unwrap();
        let id = create_review(&conn).unwrap();
        let review = get_review(&conn, id).unwrap().unwrap();
        assert!(review.selected_doctors.is_empty());
        assert!(review.review_text.is_none());
        assert!(!review.notified);
        assert!(!review.ready_for_generation());
        assert!(get_review(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn selections_are_hydrated() {
        let conn = open_memory_database().unwrap();
        let svc = insert_service(
            &conn,
            &ServiceInput { name: "Filling".into(), category: String::new(), is_enabled: true },
        )
        .unwrap();
        let doc = insert_doctor(
            &conn,
            &DoctorInput {
                name: "Orlova".into(),
                role: "Therapist".into(),
                avatar_url: None,
                is_enabled: true,
                service_ids: vec![svc.id],
            },
        )
        .unwrap();
        let aspect: Aspect = named(&conn, "Painless");
        let source: Source = named(&conn, "Friends");

        let id = create_review(&conn).unwrap();
        set_review_doctors(&conn, id, &[doc.id]).unwrap();
        set_review_services(&conn, id, &[svc.id]).unwrap();
        set_review_aspects(&conn, id, &[aspect.id]).unwrap();
        set_review_source(&conn, id, source.id).unwrap();
        set_review_contacts(&conn, id, Some("Olga"), None).unwrap();
        set_review_text(&conn, id, "Great clinic").unwrap();

        let review = get_review(&conn, id).unwrap().unwrap();
        assert_eq!(review.selected_doctors[0].name, "Orlova");
        assert_eq!(review.selected_doctors[0].services, vec![svc.clone()]);
        assert_eq!(review.selected_services, vec![svc]);
        assert_eq!(review.selected_aspects, vec![aspect]);
        assert_eq!(review.selected_source, Some(source));
        assert_eq!(review.contact_name.as_deref(), Some("Olga"));
        assert!(review.ready_for_generation());
        assert!(review.is_generated());
    }

    #[test]
    fn replacing_links_drops_previous_selection() {
        let conn = open_memory_database().unwrap();
        let a: Aspect = named(&conn, "A");
        let b: Aspect = named(&conn, "B");
        let id = create_review(&conn).unwrap();

        set_review_aspects(&conn, id, &[a.id, b.id]).unwrap();
        set_review_aspects(&conn, id, &[b.id]).unwrap();
        let review = get_review(&conn, id).unwrap().unwrap();
        assert_eq!(review.selected_aspects, vec![b]);

        let err = set_review_aspects(&conn, 999, &[a.id]).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn deleted_source_is_cleared_from_review() {
        let conn = open_memory_database().unwrap();
        let source: Source = named(&conn, "Ads");
        let id = create_review(&conn).unwrap();
        set_review_source(&conn, id, source.id).unwrap();

        delete_entity::<Source>(&conn, source.id).unwrap();
        assert!(get_review(&conn, id).unwrap().unwrap().selected_source.is_none());
    }

    #[test]
    fn publishing_is_idempotent_and_notification_flag_flips_once() {
        let conn = open_memory_database().unwrap();
        let p = platform(&conn, "yandex");
        let id = create_review(&conn).unwrap();

        assert!(add_published_platform(&conn, id, p.id).unwrap());
        assert!(!add_published_platform(&conn, id, p.id).unwrap());
        let review = get_review(&conn, id).unwrap().unwrap();
        assert_eq!(review.published_platforms, vec![p]);
        assert!(review.is_published());

        assert!(mark_review_notified(&conn, id).unwrap());
        assert!(!mark_review_notified(&conn, id).unwrap());
        assert!(get_review(&conn, id).unwrap().unwrap().notified);

        clear_review_notified(&conn, id).unwrap();
        assert!(!get_review(&conn, id).unwrap().unwrap().notified);
        assert!(mark_review_notified(&conn, id).unwrap());
    }

    #[test]
    fn list_filters_by_date_range_newest_first() {
        let conn = open_memory_database().unwrap();
        let old = create_review(&conn).unwrap();
        let mid = create_review(&conn).unwrap();
        let new = create_review(&conn).unwrap();
        backdate(&conn, old, "2024-01-10 09:00:00");
        backdate(&conn, mid, "2024-02-15 12:30:00");
        backdate(&conn, new, "2024-03-20 18:00:00");

        let all = list_reviews(&conn, &DateRange::default()).unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new, mid, old]);

        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let range = DateRange::new(
            day(2024, 2, 1).and_hms_opt(0, 0, 0),
            day(2024, 2, 15).and_hms_opt(23, 59, 59),
        );
        let ids: Vec<i64> = list_reviews(&conn, &range).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![mid]);
    }
}
