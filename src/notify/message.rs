//! HTML bodies for staff notifications. Patient-provided text is escaped.

use std::fmt::Write;

use crate::models::{Complaint, Review};

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn field(out: &mut String, label: &str, value: Option<&str>) {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("—");
    let _ = writeln!(out, "{label}: {}", escape_html(value));
}

fn joined<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let list: Vec<&str> = names.collect();
    if list.is_empty() {
        None
    } else {
        Some(list.join(", "))
    }
}

pub fn review_message(review: &Review) -> String {
    let mut out = format!("⭐ <b>Новый отзыв #{}</b>\n\n", review.id);
    field(&mut out, "Пациент", review.contact_name.as_deref());
    field(&mut out, "Телефон", review.contact_phone.as_deref());
    field(
        &mut out,
        "Врач",
        joined(review.selected_doctors.iter().map(|d| d.name.as_str())).as_deref(),
    );
    field(
        &mut out,
        "Услуга",
        joined(review.selected_services.iter().map(|s| s.name.as_str())).as_deref(),
    );
    field(
        &mut out,
        "Подарок",
        review.selected_reward.as_ref().map(|r| r.name.as_str()),
    );
    field(
        &mut out,
        "Платформы",
        joined(review.published_platforms.iter().map(|p| p.name.as_str())).as_deref(),
    );
    if let Some(text) = review.review_text.as_deref().filter(|t| !t.trim().is_empty()) {
        let _ = write!(out, "\n<i>{}</i>", escape_html(text.trim()));
    }
    out.trim_end().to_string()
}

pub fn complaint_message(complaint: &Complaint) -> String {
    let mut out = format!("⚠️ <b>Новая жалоба #{}</b>\n\n", complaint.id);
    field(&mut out, "Пациент", complaint.contact_name.as_deref());
    field(&mut out, "Телефон", complaint.contact_phone.as_deref());
    field(
        &mut out,
        "Причины",
        joined(complaint.selected_reasons.iter().map(|r| r.name.as_str())).as_deref(),
    );
    if let Some(text) = complaint.complaint_text.as_deref().filter(|t| !t.trim().is_empty()) {
        let _ = write!(out, "\n<i>{}</i>", escape_html(text.trim()));
    }
    out.trim_end().to_string()
}
