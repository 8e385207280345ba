//! CSV export of every record.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::Subscription;

pub const CSV_HEADER: &str =
    "id,description,buyer_id,purchase_date,duration_days,expires_at,is_active,created_at,updated_at";

/// Render records as CSV, header first, one line per record.
pub fn to_csv(records: &[Subscription]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for r in records {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            r.id,
            escape(&r.description),
            escape(r.buyer_ref.as_deref().unwrap_or("")),
            r.purchase_date.format("%Y-%m-%d"),
            r.duration_days,
            iso(r.expires_at),
            u8::from(r.active),
            iso(r.created_at),
            iso(r.updated_at),
        );
    }
    out
}

/// Write the export file into `dir` and return its path.
pub fn write_export(dir: &Path, records: &[Subscription], at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("subscriptions-{}.csv", at.format("%Y%m%d-%H%M%S")));
    std::fs::write(&path, to_csv(records))?;
    tracing::info!(path = %path.display(), rows = records.len(), "export written");
    Ok(path)
}

fn iso(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Quote a field when it holds a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
