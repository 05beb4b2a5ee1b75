use serde::Serialize;

use crate::controller::WidgetState;

/// One-shot view of the watched document.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub document: String,
    pub exists: bool,
    pub total: usize,
    /// Identifiers carrying the configured marker.
    pub valid_format: usize,
    pub identifiers: Vec<String>,
}

impl StatusReport {
    pub fn new(document: String, identifiers: Option<Vec<String>>, marker: &str) -> Self {
        let exists = identifiers.is_some();
        let identifiers = identifiers.unwrap_or_default();
        let valid_format = identifiers.iter().filter(|id| id.contains(marker)).count();
        Self {
            document,
            exists,
            total: identifiers.len(),
            valid_format,
            identifiers,
        }
    }
}

/// Print a status report.
///
/// - `json = true`: emit a pretty-printed JSON object to stdout.
/// - `json = false`: emit a numbered human-readable listing to stdout.
pub fn print_status(report: &StatusReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising status: {}", e),
        }
        return;
    }

    if !report.exists {
        println!("{}: no identifier list found", report.document);
        return;
    }
    println!(
        "{}: {} identifiers ({} valid format)",
        report.document, report.total, report.valid_format
    );
    for (index, id) in report.identifiers.iter().enumerate() {
        println!("  #{:<4} {}", index + 1, id);
    }
}

/// One-line summary of the live widget state.
pub fn describe_state(state: &WidgetState, marker: &str) -> String {
    let mut line = format!(
        "total={} valid={} new={} sound={} background={} ringing={}",
        state.total(),
        state.valid_format_count(marker),
        state.alert_count,
        on_off(state.sound_enabled),
        on_off(state.background_mode),
        state.ringing,
    );
    if let Some(pending) = &state.pending_alert {
        line.push_str(&format!(" latest={pending}"));
    }
    if let Some(error) = &state.error {
        line.push_str(&format!(" error={error:?}"));
    }
    line
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
