//! CSV ingestion for recipient lists.
//!
//! Expected headers: `phone,message[,name]`, any order, case-insensitive.
//! Quoting is the reader's problem; ours is normalization (phones become
//! digits-only) and row-level validation: a bad row is rejected with a
//! reason while the rest of the file goes through.

use crate::core::types::Recipient;
use csv::ReaderBuilder;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Post-normalization sanity bound on a dialable number.
fn phone_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{6,15}$").expect("valid phone pattern"))
}

fn non_digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9]").expect("valid strip pattern"))
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("no valid rows in input ({rejected} rejected)")]
    Empty { rejected: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ParsedRows {
    pub rows: Vec<Recipient>,
    pub rejected: Vec<RejectedRow>,
}

/// Strip everything that isn't a digit. `"+49 155 (500) 01-02"` → `"491555000102"`.
pub fn normalize_phone(raw: &str) -> String {
    non_digits().replace_all(raw, "").into_owned()
}

fn validate_row(index: usize, phone_raw: &str, message: &str, name: Option<String>) -> Result<Recipient, RejectedRow> {
    let phone = normalize_phone(phone_raw);
    if phone.is_empty() {
        return Err(RejectedRow {
            row: index,
            reason: "empty phone".to_string(),
        });
    }
    if !phone_shape().is_match(&phone) {
        return Err(RejectedRow {
            row: index,
            reason: format!("phone '{}' is not a 6-15 digit number", phone),
        });
    }
    let message = message.trim();
    if message.is_empty() {
        return Err(RejectedRow {
            row: index,
            reason: "empty message".to_string(),
        });
    }
    Ok(Recipient {
        phone,
        message: message.to_string(),
        name: name.filter(|n| !n.trim().is_empty()),
    })
}

/// Parse and validate a whole CSV document.
///
/// Returns the accepted rows plus per-row rejections; errors only when the
/// document itself is unreadable, a required column is missing, or nothing
/// at all survived validation.
pub fn parse_rows(input: &str) -> Result<ParsedRows, IngestError> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let phone_col = find("phone").ok_or(IngestError::MissingColumn("phone"))?;
    let message_col = find("message").ok_or(IngestError::MissingColumn("message"))?;
    let name_col = find("name");

    let mut parsed = ParsedRows::default();
    for (i, record) in reader.records().enumerate() {
        let row_no = i + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                parsed.rejected.push(RejectedRow {
                    row: row_no,
                    reason: format!("unreadable row: {}", e),
                });
                continue;
            }
        };
        let phone_raw = record.get(phone_col).unwrap_or("");
        let message = record.get(message_col).unwrap_or("");
        let name = name_col
            .and_then(|c| record.get(c))
            .map(|s| s.to_string());

        match validate_row(row_no, phone_raw, message, name) {
            Ok(recipient) => parsed.rows.push(recipient),
            Err(rejected) => parsed.rejected.push(rejected),
        }
    }

    if parsed.rows.is_empty() {
        return Err(IngestError::Empty {
            rejected: parsed.rejected.len(),
        });
    }
    Ok(parsed)
}

/// Validate rows that arrived as JSON rather than CSV. Same normalization
/// and per-row rejection rules as [`parse_rows`].
pub fn sanitize_rows(input: Vec<Recipient>) -> Result<ParsedRows, IngestError> {
    let mut parsed = ParsedRows::default();
    for (i, row) in input.into_iter().enumerate() {
        match validate_row(i + 1, &row.phone, &row.message, row.name) {
            Ok(recipient) => parsed.rows.push(recipient),
            Err(rejected) => parsed.rejected.push(rejected),
        }
    }
    if parsed.rows.is_empty() {
        return Err(IngestError::Empty {
            rejected: parsed.rejected.len(),
        });
    }
    Ok(parsed)
}
