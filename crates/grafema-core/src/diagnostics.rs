//! Structured diagnostics: collection, severity fan-out, and reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::RwLock;

/// Stable error codes. The codes are the contract; the types carrying them
/// are not.
pub mod codes {
    pub const ERR_PARSE_FAILED: &str = "ERR_PARSE_FAILED";
    pub const ERR_UNRESOLVED_REFERENCE: &str = "ERR_UNRESOLVED_REFERENCE";
    pub const ERR_STORAGE_UNAVAILABLE: &str = "ERR_STORAGE_UNAVAILABLE";
    pub const ERR_VALIDATION_FAILED: &str = "ERR_VALIDATION_FAILED";
    pub const ERR_GUARANTEE_VIOLATION: &str = "ERR_GUARANTEE_VIOLATION";
    pub const ERR_UNKNOWN: &str = "ERR_UNKNOWN";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub phase: String,
    pub plugin: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Ordered lookup steps (ID → file → line → result) for strict-mode
    /// human inspection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolution_chain: Vec<String>,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        phase: impl Into<String>,
        plugin: impl Into<String>,
    ) -> Self {
        Diagnostic {
            code: code.into(),
            severity,
            message: message.into(),
            file: None,
            line: None,
            phase: phase.into(),
            plugin: plugin.into(),
            timestamp: Utc::now(),
            suggestion: None,
            resolution_chain: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_resolution_chain(mut self, chain: Vec<String>) -> Self {
        self.resolution_chain = chain;
        self
    }
}

/// Outcome reported by a plugin or task, normalized by the collector.
#[derive(Debug, Clone)]
pub enum PluginOutcome {
    /// Structured error with its own code and severity.
    Structured(Diagnostic),
    /// Opaque exception text; mapped to `ERR_UNKNOWN`/error.
    Opaque(String),
}

/// Per-run collector. Thread-safe: workers push concurrently.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    entries: RwLock<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, diagnostic: Diagnostic) {
        tracing::debug!(
            code = %diagnostic.code,
            severity = %diagnostic.severity,
            "{}",
            diagnostic.message
        );
        self.entries
            .write()
            .expect("diagnostics lock poisoned")
            .push(diagnostic);
    }

    /// Normalize a plugin result into the collection.
    pub fn add_from_plugin_result(&self, phase: &str, plugin: &str, outcome: PluginOutcome) {
        let diagnostic = match outcome {
            PluginOutcome::Structured(mut d) => {
                d.phase = phase.to_string();
                d.plugin = plugin.to_string();
                d
            }
            PluginOutcome::Opaque(message) => {
                Diagnostic::new(codes::ERR_UNKNOWN, Severity::Error, message, phase, plugin)
            }
        };
        self.add(diagnostic);
    }

    pub fn all(&self) -> Vec<Diagnostic> {
        self.entries
            .read()
            .expect("diagnostics lock poisoned")
            .clone()
    }

    pub fn by_phase(&self, phase: &str) -> Vec<Diagnostic> {
        self.filtered(|d| d.phase == phase)
    }

    pub fn by_plugin(&self, plugin: &str) -> Vec<Diagnostic> {
        self.filtered(|d| d.plugin == plugin)
    }

    pub fn by_code(&self, code: &str) -> Vec<Diagnostic> {
        self.filtered(|d| d.code == code)
    }

    fn filtered(&self, pred: impl Fn(&Diagnostic) -> bool) -> Vec<Diagnostic> {
        self.entries
            .read()
            .expect("diagnostics lock poisoned")
            .iter()
            .filter(|d| pred(d))
            .cloned()
            .collect()
    }

    /// A fatal diagnostic aborts the pipeline at the next phase barrier.
    pub fn has_fatal(&self) -> bool {
        self.entries
            .read()
            .expect("diagnostics lock poisoned")
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }

    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.entries
            .read()
            .expect("diagnostics lock poisoned")
            .iter()
            .filter(|d| d.severity >= severity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("diagnostics lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every entry as one JSON object per line.
    pub fn append_log(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        for diagnostic in self.all() {
            serde_json::to_writer(&mut file, &diagnostic)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

/// Renders collected diagnostics. Strict mode shows resolution chains and
/// suppresses per-entry output above `threshold` unless verbose.
#[derive(Debug, Clone)]
pub struct Reporter {
    pub format: ReportFormat,
    pub strict: bool,
    pub verbose: bool,
    pub threshold: usize,
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter {
            format: ReportFormat::Text,
            strict: false,
            verbose: false,
            threshold: 50,
        }
    }
}

impl Reporter {
    pub fn render(&self, diagnostics: &[Diagnostic]) -> String {
        match self.format {
            ReportFormat::Json => {
                serde_json::to_string_pretty(diagnostics).unwrap_or_else(|_| "[]".to_string())
            }
            ReportFormat::Csv => self.render_csv(diagnostics),
            ReportFormat::Text => self.render_text(diagnostics),
        }
    }

    fn render_text(&self, diagnostics: &[Diagnostic]) -> String {
        let mut out = String::new();
        let suppress = self.strict && !self.verbose && diagnostics.len() > self.threshold;
        let shown: &[Diagnostic] = if suppress {
            &diagnostics[..self.threshold]
        } else {
            diagnostics
        };
        for d in shown {
            out.push_str(&format!("[{}] {} {}", d.severity, d.code, d.message));
            if let Some(file) = &d.file {
                out.push_str(&format!(" ({file}"));
                if let Some(line) = d.line {
                    out.push_str(&format!(":{line}"));
                }
                out.push(')');
            }
            out.push('\n');
            if self.strict {
                for step in &d.resolution_chain {
                    out.push_str(&format!("    -> {step}\n"));
                }
            }
            if let Some(suggestion) = &d.suggestion {
                out.push_str(&format!("    hint: {suggestion}\n"));
            }
        }
        if suppress {
            out.push_str(&format!(
                "… {} more suppressed (re-run with --verbose)\n",
                diagnostics.len() - self.threshold
            ));
        }
        out
    }

    fn render_csv(&self, diagnostics: &[Diagnostic]) -> String {
        let mut out = String::from("severity,code,phase,plugin,file,line,message\n");
        for d in diagnostics {
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                d.severity,
                d.code,
                d.phase,
                d.plugin,
                d.file.as_deref().unwrap_or(""),
                d.line.map(|l| l.to_string()).unwrap_or_default(),
                csv_escape(&d.message),
            ));
        }
        out
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: &str, severity: Severity) -> Diagnostic {
        Diagnostic::new(code, severity, "boom", "ANALYSIS", "js-extractor")
    }

    #[test]
    fn collector_queries() {
        let collector = DiagnosticCollector::new();
        collector.add(sample(codes::ERR_PARSE_FAILED, Severity::Error).with_file("a.js"));
        collector.add(sample(codes::ERR_UNKNOWN, Severity::Warning));
        collector.add_from_plugin_result(
            "ENRICHMENT",
            "call-resolver",
            PluginOutcome::Opaque("exploded".to_string()),
        );

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.by_phase("ANALYSIS").len(), 2);
        assert_eq!(collector.by_plugin("call-resolver").len(), 1);
        assert_eq!(collector.by_code(codes::ERR_UNKNOWN).len(), 2);
        assert!(!collector.has_fatal());

        collector.add(sample(codes::ERR_STORAGE_UNAVAILABLE, Severity::Fatal));
        assert!(collector.has_fatal());
    }

    #[test]
    fn opaque_outcome_normalizes_to_unknown() {
        let collector = DiagnosticCollector::new();
        collector.add_from_plugin_result(
            "ANALYSIS",
            "p",
            PluginOutcome::Opaque("weird".to_string()),
        );
        let entries = collector.all();
        assert_eq!(entries[0].code, codes::ERR_UNKNOWN);
        assert_eq!(entries[0].severity, Severity::Error);
    }

    #[test]
    fn text_report_suppresses_above_threshold() {
        let diagnostics: Vec<Diagnostic> = (0..10)
            .map(|_| sample(codes::ERR_VALIDATION_FAILED, Severity::Error))
            .collect();
        let reporter = Reporter {
            strict: true,
            threshold: 3,
            ..Reporter::default()
        };
        let text = reporter.render(&diagnostics);
        assert!(text.contains("7 more suppressed"));

        let verbose = Reporter {
            strict: true,
            verbose: true,
            threshold: 3,
            ..Reporter::default()
        };
        assert!(!verbose.render(&diagnostics).contains("suppressed"));
    }

    #[test]
    fn csv_escapes_commas() {
        let mut d = sample(codes::ERR_UNKNOWN, Severity::Info);
        d.message = "a, b".to_string();
        let reporter = Reporter {
            format: ReportFormat::Csv,
            ..Reporter::default()
        };
        assert!(reporter.render(&[d]).contains("\"a, b\""));
    }

    #[test]
    fn jsonl_log_appends(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".grafema/diagnostics.log");
        let collector = DiagnosticCollector::new();
        collector.add(sample(codes::ERR_PARSE_FAILED, Severity::Error));
        collector.append_log(&path).unwrap();
        collector.append_log(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: Diagnostic = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.code, codes::ERR_PARSE_FAILED);
    }
}
