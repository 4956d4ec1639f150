//! Append-only diagnostics ledger for one supervision run.
//!
//! Every credential attempt, liveness check, and gateway probe is appended as
//! `category:identity:icon:reason`. The engine never re-reads its own ledger;
//! the line file is consumed by boot-report readers, which use
//! [`read_ledger_file`] and [`render_boot_report`].

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::warn;

pub const ICON_PASS: &str = "✅";
pub const ICON_FAIL: &str = "❌";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    Platform,
    Provider,
    Network,
}

impl DiagnosticCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCategory::Platform => "platform",
            DiagnosticCategory::Provider => "provider",
            DiagnosticCategory::Network => "network",
        }
    }

    fn from_str_label(label: &str) -> Option<Self> {
        match label {
            "platform" => Some(DiagnosticCategory::Platform),
            "provider" => Some(DiagnosticCategory::Provider),
            "network" => Some(DiagnosticCategory::Network),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticOutcome {
    Pass,
    Fail,
}

impl DiagnosticOutcome {
    pub fn icon(self) -> &'static str {
        match self {
            DiagnosticOutcome::Pass => ICON_PASS,
            DiagnosticOutcome::Fail => ICON_FAIL,
        }
    }

    pub fn from_passed(passed: bool) -> Self {
        if passed {
            DiagnosticOutcome::Pass
        } else {
            DiagnosticOutcome::Fail
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub category: DiagnosticCategory,
    pub identity: String,
    pub outcome: DiagnosticOutcome,
    pub reason: String,
}

impl DiagnosticRecord {
    pub fn render_line(&self) -> String {
        self.to_string()
    }

    /// Parses one ledger line; the reason is the remainder and may itself contain `:`.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, ':');
        let (Some(category), Some(identity), Some(icon), Some(reason)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            bail!("ledger line '{line}' does not have four ':' separated fields");
        };
        let Some(category) = DiagnosticCategory::from_str_label(category) else {
            bail!("ledger line '{line}' has unknown category '{category}'");
        };
        let outcome = match icon {
            ICON_PASS => DiagnosticOutcome::Pass,
            ICON_FAIL => DiagnosticOutcome::Fail,
            other => bail!("ledger line '{line}' has unknown outcome icon '{other}'"),
        };
        Ok(Self {
            category,
            identity: identity.to_string(),
            outcome,
            reason: reason.to_string(),
        })
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.category.as_str(),
            self.identity,
            self.outcome.icon(),
            self.reason
        )
    }
}

fn sanitize_identity(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| if ch == ':' || ch.is_control() { '_' } else { ch })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

fn sanitize_reason(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

#[derive(Debug)]
struct LedgerSink {
    path: PathBuf,
    file: File,
}

#[derive(Debug, Default)]
/// One ledger per supervision run. Records are never mutated after append.
pub struct DiagnosticsLedger {
    records: Vec<DiagnosticRecord>,
    sink: Option<LedgerSink>,
}

impl DiagnosticsLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Starts a fresh per-run ledger file, truncating any previous run's lines.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create diagnostics ledger {}", path.display()))?;
        Ok(Self {
            records: Vec::new(),
            sink: Some(LedgerSink {
                path: path.to_path_buf(),
                file,
            }),
        })
    }

    /// Appends a record. A failing file sink is logged but never fails the caller.
    pub fn record(
        &mut self,
        category: DiagnosticCategory,
        identity: &str,
        outcome: DiagnosticOutcome,
        reason: &str,
    ) {
        let record = DiagnosticRecord {
            category,
            identity: sanitize_identity(identity),
            outcome,
            reason: sanitize_reason(reason),
        };
        if let Some(sink) = self.sink.as_mut() {
            if let Err(error) = writeln!(sink.file, "{record}") {
                warn!(
                    path = %sink.path.display(),
                    %error,
                    "failed to append diagnostics ledger line"
                );
            }
        }
        self.records.push(record);
    }

    pub fn pass(&mut self, category: DiagnosticCategory, identity: &str, reason: &str) {
        self.record(category, identity, DiagnosticOutcome::Pass, reason);
    }

    pub fn fail(&mut self, category: DiagnosticCategory, identity: &str, reason: &str) {
        self.record(category, identity, DiagnosticOutcome::Fail, reason);
    }

    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.records
    }

    pub fn lines(&self) -> Vec<String> {
        self.records.iter().map(DiagnosticRecord::render_line).collect()
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn read_ledger_file(path: &Path) -> Result<Vec<DiagnosticRecord>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open diagnostics ledger {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, raw_line) in BufReader::new(file).lines().enumerate() {
        let line = raw_line.with_context(|| {
            format!("failed to read line {} from {}", line_no + 1, path.display())
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = DiagnosticRecord::parse_line(&line).with_context(|| {
            format!("failed to parse line {} in {}", line_no + 1, path.display())
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Groups records by category for operator-facing boot reports.
pub fn render_boot_report(records: &[DiagnosticRecord]) -> String {
    let mut lines = Vec::new();
    for category in [
        DiagnosticCategory::Platform,
        DiagnosticCategory::Provider,
        DiagnosticCategory::Network,
    ] {
        let rows: Vec<_> = records
            .iter()
            .filter(|record| record.category == category)
            .collect();
        let failures = rows
            .iter()
            .filter(|record| record.outcome == DiagnosticOutcome::Fail)
            .count();
        lines.push(format!(
            "{}: attempts={} failures={}",
            category.as_str(),
            rows.len(),
            failures
        ));
        if rows.is_empty() {
            lines.push("  none".to_string());
            continue;
        }
        for record in rows {
            lines.push(format!(
                "  {} {} {}",
                record.outcome.icon(),
                record.identity,
                record.reason
            ));
        }
    }
    lines.join("\n")
}
