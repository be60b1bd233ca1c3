//! Output formatting for CLI commands.
//!
//! Every formatter returns a `String` in the selected format; the binary
//! decides where it is printed.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::listing::Listing;
use crate::planner::{ActionType, ApplyPlan, ExecutionResult};
use crate::reconciler::{ReconciliationResult, Severity};
use crate::resource::{FieldMap, RemoteState};
use crate::state::{LockInfo, ReconcileState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Recorded resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Resource")]
    key: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Execution result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an apply or destroy plan.
    #[must_use]
    pub fn format_plan(&self, plan: &ApplyPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &ApplyPlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes. The cluster matches the manifest.\n", "✓".green());
        }

        let mut output = String::from("\nPlan\n\n");

        let rows: Vec<PlanActionRow> = plan
            .changes()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                resource: format!("{}.{}", a.kind, a.handle),
                identity: a.identity.clone().unwrap_or_else(|| String::from("(new)")),
                reason: truncate(&a.reason, 48),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to delete",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Replace).to_string().magenta(),
            plan.count(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats the outcome of executing a plan.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ExecutionJson::from(result)),
            OutputFormat::Text => {
                let mut output = String::new();
                if !result.results.is_empty() {
                    let rows: Vec<ResultRow> = result.results.iter().map(ResultRow::from).collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                for r in &result.results {
                    Self::write_diagnostics(&mut output, r);
                }

                let status = if result.all_successful() {
                    format!("{} {result}", "✓".green())
                } else {
                    format!("{} {result}", "✗".red())
                };
                let _ = writeln!(output, "\n{status}");
                output
            }
        }
    }

    fn write_diagnostics(output: &mut String, result: &ReconciliationResult) {
        for diagnostic in &result.diagnostics {
            let marker = match diagnostic.severity {
                Severity::Info => "i".blue(),
                Severity::Warning => "⚠".yellow(),
                Severity::Error => "✗".red(),
            };
            let _ = writeln!(
                output,
                "{marker} {} {}: {}",
                result.kind,
                result.identity.as_deref().unwrap_or("?"),
                diagnostic.summary
            );
            if !diagnostic.detail.is_empty() && diagnostic.detail != diagnostic.summary {
                let _ = writeln!(output, "    {}", diagnostic.detail.dimmed());
            }
        }
    }

    /// Formats the recorded state. Sensitive attributes are masked unless
    /// `show_sensitive` is set.
    #[must_use]
    pub fn format_state(&self, state: &ReconcileState, show_sensitive: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let resources: Vec<ResourceJson> = state
                    .resources
                    .iter()
                    .map(|(key, record)| ResourceJson {
                        key: key.clone(),
                        identity: record.identity.clone(),
                        attributes: shown_fields(&record.to_remote(), show_sensitive),
                    })
                    .collect();
                to_json(&StateJson {
                    version: &state.version,
                    cluster: &state.cluster,
                    last_updated: state.last_updated.to_rfc3339(),
                    resources,
                })
            }
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\nState for {}\n", state.cluster.bold());
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}\n", state.resources.len());

                if !state.is_empty() {
                    let rows: Vec<ResourceRow> = state
                        .resources
                        .iter()
                        .map(|(key, record)| ResourceRow {
                            key: key.clone(),
                            identity: record.identity.clone(),
                            updated: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resources.join(", ")
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats snapshots read back from the cluster.
    #[must_use]
    pub fn format_remote(&self, snapshots: &[(String, Option<RemoteState>)], show_sensitive: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<RemoteJson> = snapshots
                    .iter()
                    .map(|(key, remote)| RemoteJson {
                        key: key.clone(),
                        exists: remote.is_some(),
                        identity: remote.as_ref().map(|r| r.identity.clone()),
                        fields: remote.as_ref().map(|r| shown_fields(r, show_sensitive)),
                    })
                    .collect();
                to_json(&entries)
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for (key, remote) in snapshots {
                    match remote {
                        Some(remote) => {
                            let _ = writeln!(output, "{} ({})", key.bold(), remote.identity);
                            for (name, value) in shown_fields(remote, show_sensitive) {
                                let _ = writeln!(output, "  {name} = {value}");
                            }
                        }
                        None => {
                            let _ = writeln!(output, "{} {}", key.bold(), "(missing from cluster)".red());
                        }
                    }
                }
                if output.is_empty() {
                    output.push_str("No resources recorded.\n");
                }
                output
            }
        }
    }

    /// Formats a cluster listing.
    #[must_use]
    pub fn format_listing(&self, listing: &Listing) -> String {
        match self.format {
            OutputFormat::Json => to_json(listing),
            OutputFormat::Text => {
                let mut output = format!("{}\n", listing.id.bold());
                let Some(first) = listing.records.first() else {
                    output.push_str("(empty)\n");
                    return output;
                };

                let mut builder = tabled::builder::Builder::default();
                let columns: Vec<&String> = first.keys().collect();
                builder.push_record(columns.iter().map(|c| (*c).clone()));
                for record in &listing.records {
                    builder.push_record(
                        columns
                            .iter()
                            .map(|c| record.get(*c).cloned().unwrap_or_default()),
                    );
                }
                output.push_str(&builder.build().to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
                to_json(&serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": errors,
                    "warnings": result.warnings,
                }))
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Manifest has {} error(s):",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the current lock holder.
    #[must_use]
    pub fn format_lock(&self, lock: Option<&LockInfo>) -> String {
        match (self.format, lock) {
            (OutputFormat::Json, lock) => to_json(&lock),
            (OutputFormat::Text, Some(lock)) => format!("{lock}\n"),
            (OutputFormat::Text, None) => String::from("State is not locked.\n"),
        }
    }

    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Replace => "-/+replace".magenta().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::Noop => "noop".dimmed().to_string(),
        }
    }

    /// Prints a success message.
    pub fn success(&self, message: &str) {
        self.message("success", &format!("{} {message}", "✓".green()), message);
    }

    /// Prints an error message.
    pub fn error(&self, message: &str) {
        self.message("error", &format!("{} {message}", "✗".red()), message);
    }

    /// Prints a warning message.
    pub fn warning(&self, message: &str) {
        self.message("warning", &format!("{} {message}", "⚠".yellow()), message);
    }

    fn message(&self, status: &str, text: &str, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", to_json(&serde_json::json!({ "status": status, "message": message })));
            }
            OutputFormat::Text => eprintln!("{text}"),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn shown_fields(remote: &RemoteState, show_sensitive: bool) -> FieldMap {
    if show_sensitive {
        remote.fields.clone()
    } else {
        remote.masked()
    }
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

impl From<&ReconciliationResult> for ResultRow {
    fn from(result: &ReconciliationResult) -> Self {
        Self {
            status: if result.success {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            },
            operation: result.operation.to_string(),
            resource: format!(
                "{} {}",
                result.kind,
                result.identity.as_deref().unwrap_or("?")
            ),
            attempts: result.attempts,
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    created_at: String,
    creates: usize,
    updates: usize,
    replaces: usize,
    deletes: usize,
    actions: Vec<ActionJson>,
}

#[derive(Serialize)]
struct ActionJson {
    action_type: String,
    kind: String,
    handle: String,
    identity: Option<String>,
    reason: String,
}

impl From<&ApplyPlan> for PlanJson {
    fn from(plan: &ApplyPlan) -> Self {
        Self {
            created_at: plan.created_at.to_rfc3339(),
            creates: plan.count(ActionType::Create),
            updates: plan.count(ActionType::Update),
            replaces: plan.count(ActionType::Replace),
            deletes: plan.count(ActionType::Delete),
            actions: plan
                .changes()
                .map(|a| ActionJson {
                    action_type: a.action_type.to_string(),
                    kind: a.kind.to_string(),
                    handle: a.handle.clone(),
                    identity: a.identity.clone(),
                    reason: a.reason.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ExecutionJson<'a> {
    success: bool,
    successful: usize,
    failed: usize,
    skipped: usize,
    unchanged: usize,
    results: &'a [ReconciliationResult],
}

impl<'a> From<&'a ExecutionResult> for ExecutionJson<'a> {
    fn from(result: &'a ExecutionResult) -> Self {
        Self {
            success: result.all_successful(),
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            unchanged: result.unchanged,
            results: &result.results,
        }
    }
}

#[derive(Serialize)]
struct StateJson<'a> {
    version: &'a str,
    cluster: &'a str,
    last_updated: String,
    resources: Vec<ResourceJson>,
}

#[derive(Serialize)]
struct ResourceJson {
    key: String,
    identity: String,
    attributes: FieldMap,
}

#[derive(Serialize)]
struct RemoteJson {
    key: String,
    exists: bool,
    identity: Option<String>,
    fields: Option<FieldMap>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn token_state() -> ReconcileState {
        let mut fields = FieldMap::new();
        fields.insert("accessor_id".into(), "a-1".into());
        fields.insert("secret_id".into(), "s3cr3t".into());
        let mut state = ReconcileState::new("http://127.0.0.1:4646");
        state.record("ci", &RemoteState::new(ResourceKind::AclToken, "a-1", fields));
        state
    }

    #[test]
    fn test_state_masks_secrets_by_default() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let masked = formatter.format_state(&token_state(), false);
        assert!(!masked.contains("s3cr3t"));
        assert!(masked.contains("acl_token.ci"));

        let shown = formatter.format_state(&token_state(), true);
        assert!(shown.contains("s3cr3t"));
    }

    #[test]
    fn test_remote_text_marks_missing() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_remote(&[(String::from("namespace.batch"), None)], false);
        assert!(output.contains("missing from cluster"));
    }

    #[test]
    fn test_empty_plan_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let plan = ApplyPlan::destroy(&ReconcileState::new("x"));
        assert!(formatter.format_plan(&plan).contains("No changes"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer reason", 8), "a lon...");
    }
}
