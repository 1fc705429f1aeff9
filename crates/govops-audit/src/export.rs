//! Audit export formats: JSON, CSV (RFC 4180), and CEF (ArcSight).
//!
//! Bit-level stable for SIEM/analytics interoperability — re-exporting an
//! unchanged record set must yield byte-identical output.

use govops_storage::AuditRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Cef,
}

pub fn export(records: &[AuditRecord], format: ExportFormat) -> String {
    match format {
        ExportFormat::Json => export_json(records),
        ExportFormat::Csv => export_csv(records),
        ExportFormat::Cef => export_cef(records),
    }
}

fn export_json(records: &[AuditRecord]) -> String {
    serde_json::to_string_pretty(records).expect("AuditRecord is always serializable")
}

const CSV_HEADER: &str = "id,timestamp,agentId,action,permitted,trustLevel,requiredLevel,budgetUsed,budgetRemaining,reason,metadata,previousHash,recordHash";

fn export_csv(records: &[AuditRecord]) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for r in records {
        let metadata = r
            .metadata
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();

        let fields = [
            r.id.to_string(),
            r.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            r.agent_id.clone(),
            r.action.clone(),
            r.permitted.to_string(),
            r.trust_level.map(|v| v.to_string()).unwrap_or_default(),
            r.required_level.map(|v| v.to_string()).unwrap_or_default(),
            r.budget_used.map(|v| v.to_string()).unwrap_or_default(),
            r.budget_remaining.map(|v| v.to_string()).unwrap_or_default(),
            r.reason.clone().unwrap_or_default(),
            metadata,
            r.previous_hash.clone(),
            r.record_hash.clone(),
        ];

        let line = fields
            .iter()
            .map(|f| csv_escape(f))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push_str("\r\n");
    }

    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn export_cef(records: &[AuditRecord]) -> String {
    records
        .iter()
        .map(cef_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn cef_line(r: &AuditRecord) -> String {
    let severity = if r.permitted { 3 } else { 7 };
    let name = format!("Governance Decision: {}", cef_header_escape(&r.action));
    let signature_id = cef_header_escape(&r.action);

    let mut ext = vec![
        format!("rt={}", cef_ext_escape(&r.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))),
        format!("src={}", cef_ext_escape(&r.agent_id)),
        format!("act={}", cef_ext_escape(&r.action)),
        format!("outcome={}", if r.permitted { "permitted" } else { "denied" }),
        "cs1Label=recordId".to_string(),
        format!("cs1={}", cef_ext_escape(&r.id.to_string())),
        "cs2Label=previousHash".to_string(),
        format!("cs2={}", cef_ext_escape(&r.previous_hash)),
        "cs3Label=recordHash".to_string(),
        format!("cs3={}", cef_ext_escape(&r.record_hash)),
    ];

    if let Some(v) = r.trust_level {
        ext.push(format!("cn1={v}"));
    }
    if let Some(v) = r.required_level {
        ext.push(format!("cn2={v}"));
    }
    if let Some(v) = r.budget_used {
        ext.push(format!("cn3={v}"));
    }
    if let Some(v) = r.budget_remaining {
        ext.push(format!("cn4={v}"));
    }

    format!(
        "CEF:0|RedClaw Systems|GovOps|1.0|{signature_id}|{name}|{severity}|{}",
        ext.join(" ")
    )
}

fn cef_header_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('|', "\\|")
}

fn cef_ext_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('=', "\\=")
}
