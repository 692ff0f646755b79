//! User-facing diagnostic channel.
//!
//! Every recoverable failure lands here with the asset name, kind and a
//! readable cause, and is mirrored to `tracing`.

use crate::error::AssetError;
use crate::kind::AssetKind;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub asset_name: String,
    pub kind: AssetKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} '{}': {}",
            self.severity, self.kind, self.asset_name, self.message
        )
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        severity: Severity,
        asset_name: &str,
        kind: AssetKind,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Info => tracing::info!(asset = asset_name, %kind, "{message}"),
            Severity::Warning => tracing::warn!(asset = asset_name, %kind, "{message}"),
            Severity::Error => tracing::error!(asset = asset_name, %kind, "{message}"),
        }
        self.entries.push(Diagnostic {
            severity,
            asset_name: asset_name.to_string(),
            kind,
            message,
        });
    }

    pub fn report_error(&mut self, asset_name: &str, kind: AssetKind, err: &AssetError) {
        self.report(Severity::Error, asset_name, kind, err.to_string());
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_and_take() {
        let mut log = DiagnosticLog::new();
        log.report(Severity::Warning, "brick", AssetKind::Texture, "file missing");
        log.report_error(
            "lit",
            AssetKind::Shader,
            &AssetError::CreateFailed {
                asset: "lit".into(),
                kind: AssetKind::Shader,
                reason: "syntax".into(),
            },
        );
        assert_eq!(log.error_count(), 1);
        let taken = log.take();
        assert_eq!(taken.len(), 2);
        assert!(log.is_empty());
        assert_eq!(
            taken[0].to_string(),
            "[Warning] Texture 'brick': file missing"
        );
    }
}
