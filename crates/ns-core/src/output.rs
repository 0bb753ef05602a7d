//! Command payload rendering.
//!
//! Every payload goes to stdout in the selected [`OutputFormat`]; `exitcode`
//! prints nothing. Logs and errors go to stderr.

use ns_common::error::{format_error_human, StructuredError};
use ns_common::{Error, OutputFormat};
use serde::Serialize;
use std::fmt::Write as _;

use crate::commands::{CheckReport, CheckStatus, PatchReport, RenderPreview};
use crate::orchestrator::{InstallReport, PipelineError, StageStatus};
use crate::service::{Lifecycle, LaunchPlan};

/// Pretty JSON of any payload.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","reason":"{}"}}"#, e))
}

fn short_digest(sha256: &str) -> &str {
    sha256.get(..12).unwrap_or(sha256)
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n## {}\n", title);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

fn push_lifecycle(out: &mut String, lifecycle: &Lifecycle) {
    let commands = [
        ("start", &lifecycle.start),
        ("stop", &lifecycle.stop),
        ("status", &lifecycle.status),
        ("logs", &lifecycle.logs),
    ];
    for (name, command) in commands {
        if let Some(command) = command {
            let _ = writeln!(out, "- {}: `{}`", name, command);
        }
    }
}

fn push_launch(out: &mut String, launch: &LaunchPlan) {
    let _ = writeln!(
        out,
        "\n## Service\n\n{} via `{}` ({})\n",
        launch.plan.kind(),
        launch.manager,
        launch.architecture
    );
    push_lifecycle(out, &launch.lifecycle);
    let ports = launch.published_ports();
    if !ports.is_empty() {
        let ports: Vec<String> = ports.iter().map(u16::to_string).collect();
        let _ = writeln!(out, "- published ports: {}", ports.join(", "));
    }
}

// ============================================================================
// install
// ============================================================================

pub fn install_report(report: &InstallReport, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(to_json(report)),
        OutputFormat::Summary => Some(install_summary(report)),
        OutputFormat::Md => Some(install_markdown(report)),
        OutputFormat::Exitcode => None,
    }
}

fn install_summary(report: &InstallReport) -> String {
    let status = if report.manual_action_required {
        "manual action required"
    } else {
        "ok"
    };
    format!(
        "[{}] install{}: {}, {} artifacts, {}, {} warnings",
        report.run_id,
        if report.dry_run { " (dry run)" } else { "" },
        status,
        report.artifacts.len(),
        report.launch.plan.kind(),
        report.warnings.len()
    )
}

fn install_markdown(report: &InstallReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# {} install for {}{}\n",
        report.daemon_name,
        report.chain_id,
        if report.dry_run { " (dry run)" } else { "" }
    );
    let o = &report.options;
    let _ = writeln!(out, "| option | value |\n|---|---|");
    let _ = writeln!(out, "| home | `{}` |", o.home().display());
    let _ = writeln!(out, "| moniker | {} |", o.moniker());
    let _ = writeln!(out, "| architecture | {} |", o.architecture());
    let _ = writeln!(out, "| node type | {} |", o.node_type());
    let _ = writeln!(out, "| sync mode | {} |", o.sync_mode());
    let _ = writeln!(out, "| service manager | {} |", o.service_manager());
    if !o.external_address().is_empty() {
        let _ = writeln!(out, "| external address | {} |", o.external_address());
    }
    if let Some(ref address) = report.validator_address {
        let _ = writeln!(out, "| validator address | {} |", address);
    }

    let _ = writeln!(out, "\n## Stages\n");
    for stage in &report.stages {
        let status = match stage.status {
            StageStatus::Finished => "done",
            StageStatus::Skipped => "skipped",
        };
        match stage.detail {
            Some(ref detail) => {
                let _ = writeln!(out, "- {}: {} ({})", stage.stage, status, detail);
            }
            None => {
                let _ = writeln!(out, "- {}: {}", stage.stage, status);
            }
        }
    }

    if !report.artifacts.is_empty() {
        let _ = writeln!(out, "\n## Artifacts\n\n| path | mode | sha256 |\n|---|---|---|");
        for artifact in &report.artifacts {
            let _ = writeln!(
                out,
                "| `{}` | {:04o} | {} |",
                artifact.path.display(),
                artifact.mode,
                short_digest(&artifact.sha256)
            );
        }
    }

    push_launch(&mut out, &report.launch);
    push_list(&mut out, "Warnings", &report.warnings);
    push_list(&mut out, "Next steps", &report.notices);

    if let Some(ref docs) = report.documents {
        let _ = writeln!(out, "\n## config.toml\n\n```toml\n{}```", docs.config_toml);
        let _ = writeln!(out, "\n## app.toml\n\n```toml\n{}```", docs.app_toml);
    }
    out
}

// ============================================================================
// render / patch / check
// ============================================================================

pub fn render_preview(preview: &RenderPreview, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(to_json(preview)),
        OutputFormat::Summary => Some(format!(
            "render: {} node, {} keys patched, {}{}",
            preview.options.node_type(),
            preview.applied.len(),
            preview.launch.plan.kind(),
            if preview.manual_edit_required {
                ", manual edit required"
            } else {
                ""
            }
        )),
        OutputFormat::Md => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "# Rendered configuration for {} ({} node)",
                preview.chain_id,
                preview.options.node_type()
            );
            let _ = writeln!(
                out,
                "\n## config.toml\n\n```toml\n{}```",
                preview.documents.config_toml
            );
            let _ = writeln!(out, "\n## app.toml\n\n```toml\n{}```", preview.documents.app_toml);
            push_launch(&mut out, &preview.launch);
            for artifact in &preview.launch.artifacts {
                let _ = writeln!(
                    out,
                    "\n### {}\n\n```\n{}```",
                    artifact.path.display(),
                    artifact.contents
                );
            }
            push_list(&mut out, "Next steps", &preview.notices);
            Some(out)
        }
        OutputFormat::Exitcode => None,
    }
}

pub fn patch_report(report: &PatchReport, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(to_json(report)),
        OutputFormat::Summary => Some(format!(
            "patch: {} profile, {} keys, {} files written",
            report.node_type,
            report.applied.len(),
            report.artifacts.len()
        )),
        OutputFormat::Md => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "# {} profile applied to {}\n",
                report.node_type,
                report.home.display()
            );
            for key in &report.applied {
                let _ = writeln!(out, "- `{}`", key);
            }
            push_list(&mut out, "Next steps", &report.notices);
            Some(out)
        }
        OutputFormat::Exitcode => None,
    }
}

pub fn check_report(report: &CheckReport, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => Some(to_json(report)),
        OutputFormat::Summary => Some(format!(
            "check: {} ({})",
            if report.ok() { "OK" } else { "FAILED" },
            report.detection.capabilities.summary()
        )),
        OutputFormat::Md => {
            let mut out = String::new();
            let _ = writeln!(out, "# Host check for {}\n", report.chain_id);
            for item in &report.checks {
                let mark = match item.status {
                    CheckStatus::Ok => "ok",
                    CheckStatus::Warning => "warn",
                    CheckStatus::Error => "FAIL",
                };
                let _ = writeln!(out, "- [{}] {}: {}", mark, item.check, item.message);
            }
            let managers: Vec<&str> =
                report.available_managers.iter().map(|m| m.as_str()).collect();
            let _ = writeln!(out, "\nAvailable service managers: {}", managers.join(", "));
            Some(out)
        }
        OutputFormat::Exitcode => None,
    }
}

// ============================================================================
// errors
// ============================================================================

/// Error text for stderr (human formats) or stdout (JSON).
pub fn error_payload(err: &Error, format: OutputFormat, use_color: bool) -> Option<String> {
    match format {
        OutputFormat::Json => Some(StructuredError::from(err).to_json_pretty()),
        OutputFormat::Exitcode => None,
        _ => Some(format_error_human(err, use_color)),
    }
}

pub fn pipeline_error_payload(
    err: &PipelineError,
    format: OutputFormat,
    use_color: bool,
) -> Option<String> {
    match format {
        OutputFormat::Json => {
            let written: Vec<String> = err
                .written
                .iter()
                .map(|a| a.path.display().to_string())
                .collect();
            Some(
                StructuredError::from(&err.source)
                    .with_context("stage", err.stage)
                    .with_context("written", written)
                    .to_json_pretty(),
            )
        }
        OutputFormat::Exitcode => None,
        _ => {
            let mut out = format!("{} stage\n", err.stage);
            out.push_str(&format_error_human(&err.source, use_color));
            if !err.written.is_empty() {
                out.push_str("\n  Already written:");
                for artifact in &err.written {
                    let _ = write!(out, "\n    {}", artifact.path.display());
                }
            }
            Some(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Stage;

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn test_pipeline_error_json_has_stage() {
        let err = PipelineError {
            stage: Stage::Patch,
            source: Error::StateSyncIncomplete("trust hash is empty".to_string()),
            written: Vec::new(),
        };
        let json = pipeline_error_payload(&err, OutputFormat::Json, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["context"]["stage"], "patch");
        assert_eq!(value["code"], 31);
    }

    #[test]
    fn test_exitcode_format_prints_nothing() {
        let err = Error::InputClosed;
        assert!(error_payload(&err, OutputFormat::Exitcode, false).is_none());
        assert!(error_payload(&err, OutputFormat::Md, false)
            .unwrap()
            .contains("Reason:"));
    }
}
