//! CSV rendering of audit rows.

use std::io::{self, Write};

use crate::types::AuditRecord;

/// Column order of the export.
pub const AUDIT_COLUMNS: [&str; 16] = [
    "id",
    "item_id",
    "item_name",
    "action",
    "tier",
    "mode",
    "model_used",
    "similarity_score",
    "similarity_zone",
    "word_count_long",
    "word_count_short",
    "safety_passed",
    "rejection_reason",
    "response_time_ms",
    "timestamp",
    "actor_id",
];

/// Write a header row followed by one line per record.
pub fn write_audit_csv<W: Write>(records: &[AuditRecord], mut out: W) -> io::Result<()> {
    writeln!(out, "{}", AUDIT_COLUMNS.join(","))?;

    for record in records {
        let event = &record.event;
        let fields = [
            record.id.to_string(),
            event.item_id.to_string(),
            event.item_name.clone(),
            event.action.as_str().to_string(),
            event.tier.as_str().to_string(),
            event.mode.as_str().to_string(),
            event.model_used.clone().unwrap_or_default(),
            event
                .similarity_score
                .map(|score| format!("{:.4}", score))
                .unwrap_or_default(),
            event
                .similarity_zone
                .map(|zone| zone.as_str().to_string())
                .unwrap_or_default(),
            event.word_count_long.to_string(),
            event.word_count_short.to_string(),
            u8::from(event.safety_passed).to_string(),
            event.rejection_reason.clone().unwrap_or_default(),
            event
                .response_time_ms
                .map(|ms| ms.to_string())
                .unwrap_or_default(),
            event.timestamp.clone().unwrap_or_default(),
            event.actor_id.clone().unwrap_or_default(),
        ];
        let line: Vec<String> = fields.iter().map(|field| escape_field(field)).collect();
        writeln!(out, "{}", line.join(","))?;
    }

    out.flush()
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
