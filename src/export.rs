//! Spreadsheet export of reviews and complaints for the staff dashboard.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::models::{Complaint, Review};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MAX_COLUMN_WIDTH: f64 = 40.0;
const WIDTH_PADDING_RATIO: f64 = 0.15;

const REVIEW_HEADERS: [&str; 7] = [
    "Пациент",
    "Телефон",
    "Врач",
    "Услуга",
    "Подарок",
    "Платформы",
    "Текст отзыва",
];

const COMPLAINT_HEADERS: [&str; 4] = ["Пациент", "Телефон", "Причины", "Текст жалобы"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Column width for the longest text in a column: padded, capped at 40.
pub fn column_width(max_chars: usize) -> f64 {
    (max_chars as f64 * (1.0 + WIDTH_PADDING_RATIO)).min(MAX_COLUMN_WIDTH)
}

/// Build a single-sheet workbook with a bold header row. `None` cells stay
/// empty.
pub fn export_rows(headers: &[&str], rows: &[Vec<Option<String>>]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (row_index, row) in rows.iter().enumerate() {
        let row_number = row_index as u32 + 1;
        for (col, cell) in row.iter().enumerate().take(headers.len()) {
            if let Some(value) = cell {
                sheet.write_string(row_number, col as u16, value)?;
                widths[col] = widths[col].max(value.chars().count());
            }
        }
    }
    for (col, chars) in widths.into_iter().enumerate() {
        sheet.set_column_width(col as u16, column_width(chars))?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let list: Vec<&str> = names.collect();
    (!list.is_empty()).then(|| list.join(", "))
}

pub fn review_row(review: &Review) -> Vec<Option<String>> {
    vec![
        review.contact_name.clone(),
        review.contact_phone.clone(),
        join_names(review.selected_doctors.iter().map(|d| d.name.as_str())),
        join_names(review.selected_services.iter().map(|s| s.name.as_str())),
        review.selected_reward.as_ref().map(|r| r.name.clone()),
        join_names(review.published_platforms.iter().map(|p| p.name.as_str())),
        review.review_text.clone(),
    ]
}

pub fn complaint_row(complaint: &Complaint) -> Vec<Option<String>> {
    vec![
        complaint.contact_name.clone(),
        complaint.contact_phone.clone(),
        join_names(complaint.selected_reasons.iter().map(|r| r.name.as_str())),
        complaint.complaint_text.clone(),
    ]
}

pub fn reviews_workbook(reviews: &[Review]) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<_> = reviews.iter().map(review_row).collect();
    export_rows(&REVIEW_HEADERS, &rows)
}

pub fn complaints_workbook(complaints: &[Complaint]) -> Result<Vec<u8>, ExportError> {
    let rows: Vec<_> = complaints.iter().map(complaint_row).collect();
    export_rows(&COMPLAINT_HEADERS, &rows)
}
