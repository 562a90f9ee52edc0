//! Diagnostics infrastructure for tracking non-fatal issues during transformation.
//!
//! Structural and resolution failures are exception-worthy and propagate as
//! [`crate::error::LciError`]; balance, relink, and data issues instead
//! accumulate here so one bad market or one unrelinked exchange doesn't
//! abort an otherwise-healthy scenario.

use serde::Serialize;

/// Severity level for a diagnostic issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but recoverable (e.g. a defaulted value, a uniform-share fallback).
    Warning,
    /// Operation could not complete as specified for one entity.
    Error,
}

/// One of the non-fatal warning kinds, used to group issues in reports
/// without relying on free-text category matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Balance,
    Relink,
    Data,
}

/// A single diagnostic issue encountered during transformation or validation.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub kind: WarningKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{:?}] {}", severity, self.kind, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues accumulated over a transformation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, kind, message));
    }

    pub fn add_warning_with_entity(
        &mut self,
        kind: WarningKind,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, kind, message).with_entity(entity),
        );
    }

    pub fn add_error(&mut self, kind: WarningKind, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, kind, message));
    }

    pub fn add_error_with_entity(
        &mut self,
        kind: WarningKind,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, kind, message).with_entity(entity));
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn issues_of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn summary(&self) -> String {
        let w = self.warning_count();
        let e = self.error_count();
        match (w, e) {
            (0, 0) => "no issues".to_string(),
            (w, 0) => format!("{w} warning{}", if w == 1 { "" } else { "s" }),
            (0, e) => format!("{e} error{}", if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{w} warning{}, {e} error{}",
                if w == 1 { "" } else { "s" },
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_warnings_and_errors() {
        let mut diag = Diagnostics::new();
        diag.add_warning(WarningKind::Relink, "could not relink exchange");
        diag.add_error(WarningKind::Balance, "market sum out of bounds");
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
    }

    #[test]
    fn filters_by_kind() {
        let mut diag = Diagnostics::new();
        diag.add_warning(WarningKind::Relink, "a");
        diag.add_warning(WarningKind::Data, "b");
        diag.add_warning(WarningKind::Relink, "c");
        assert_eq!(diag.issues_of_kind(WarningKind::Relink).count(), 2);
    }

    #[test]
    fn summary_pluralizes() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "no issues");
        diag.add_warning(WarningKind::Data, "x");
        assert_eq!(diag.summary(), "1 warning");
        diag.add_warning(WarningKind::Data, "y");
        assert_eq!(diag.summary(), "2 warnings");
    }
}
