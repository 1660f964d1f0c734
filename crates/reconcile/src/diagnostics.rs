//! Diagnostics returned to the host alongside every response.

use serde::Serialize;
use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute path the diagnostic refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.severity)?;
        if let Some(attr) = &self.attribute {
            write!(f, "{attr}: ")?;
        }
        f.write_str(&self.summary)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  {detail}")?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn error(&mut self, summary: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        });
    }

    pub fn warning(&mut self, summary: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        });
    }

    pub fn error_at(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: Some(attribute.into()),
        });
    }

    pub fn warning_at(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: Some(attribute.into()),
        });
    }

    /// Record an error with its full cause chain as the detail.
    pub fn from_error(&mut self, summary: impl Into<String>, err: &anyhow::Error) {
        self.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.into(),
            detail: Some(format!("{err:#}")),
            attribute: None,
        });
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        diags.warning("ttl rounded");
        assert!(!diags.has_errors());
        diags.error_at("label", "too short");
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_from_error_keeps_chain() {
        let err = Err::<(), _>(anyhow::anyhow!("[404] Not found"))
            .context("failed to read domain 12")
            .unwrap_err();
        let mut diags = Diagnostics::new();
        diags.from_error("Read failed", &err);
        let d = diags.iter().next().unwrap();
        assert_eq!(
            d.detail.as_deref(),
            Some("failed to read domain 12: [404] Not found")
        );
    }

    #[test]
    fn test_display() {
        let mut diags = Diagnostics::new();
        diags.error_at("label", "too short");
        let d = diags.into_vec().remove(0);
        assert_eq!(d.to_string(), "error: label: too short");
    }

    #[test]
    fn test_serialize() {
        let mut diags = Diagnostics::new();
        diags.warning("careful");
        let json = serde_json::to_value(&diags).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"severity": "warning", "summary": "careful"}])
        );
    }
}
