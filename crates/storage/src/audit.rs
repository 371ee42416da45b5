//! Audit log export

use agent_hub_common::AuditLogEntry;

const HEADER: &str = "id,created_at,action,actor,task_id,detail";

/// Render entries as RFC 4180 CSV with a header row
pub fn export_csv(entries: &[AuditLogEntry]) -> String {
    let mut out = String::with_capacity(64 * (entries.len() + 1));
    out.push_str(HEADER);
    out.push_str("\r\n");

    for entry in entries {
        let created_at = entry.created_at.to_rfc3339();
        let fields = [
            entry.id.as_str(),
            created_at.as_str(),
            entry.action.as_ref(),
            entry.actor.as_str(),
            entry.task_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            entry.detail.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
