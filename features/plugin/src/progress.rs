//! Lifecycle phases and progress reporting.

use std::panic::AssertUnwindSafe;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

/// Phase of a plugin operation. Phases run strictly in declaration order;
/// `Error` can follow any of them and ends the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Validating,
    Downloading,
    Configuring,
    Processing,
    Loading,
    Registering,
    Caching,
    Complete,
    Error,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Downloading => "downloading",
            Self::Configuring => "configuring",
            Self::Processing => "processing",
            Self::Loading => "loading",
            Self::Registering => "registering",
            Self::Caching => "caching",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Percent reported on entering the phase.
    pub fn percent(self) -> u8 {
        match self {
            Self::Validating => 5,
            Self::Downloading => 15,
            Self::Configuring => 30,
            Self::Processing => 45,
            Self::Loading => 65,
            Self::Registering => 80,
            Self::Caching => 90,
            Self::Complete | Self::Error => 100,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub phase: LifecyclePhase,
    pub message: String,
    /// 0..=100
    pub percent: u8,
}

/// Receives progress updates.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, report: &ProgressReport);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressReport) + Send + Sync,
{
    fn on_progress(&self, report: &ProgressReport) {
        self(report)
    }
}

/// Forwards phase transitions to an optional observer.
///
/// A panicking observer is logged and otherwise ignored.
pub(crate) struct ProgressReporter<'a> {
    operation: &'a str,
    observer: Option<&'a dyn ProgressObserver>,
    phase: Option<LifecyclePhase>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(operation: &'a str, observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            operation,
            observer,
            phase: None,
        }
    }

    pub(crate) fn phase(&self) -> Option<LifecyclePhase> {
        self.phase
    }

    pub(crate) fn enter(&mut self, phase: LifecyclePhase, message: impl Into<String>) {
        self.enter_at(phase, message, phase.percent());
    }

    /// Like [`Self::enter`] with an explicit percent, for phases that repeat
    /// across a batch.
    pub(crate) fn enter_at(&mut self, phase: LifecyclePhase, message: impl Into<String>, percent: u8) {
        if let Some(current) = self.phase {
            if current.is_terminal() || (phase != LifecyclePhase::Error && phase < current) {
                warn!(operation = self.operation, from = %current, to = %phase, "Out-of-order phase transition ignored");
                return;
            }
        }
        self.phase = Some(phase);
        let report = ProgressReport {
            phase,
            message: message.into(),
            percent: percent.min(100),
        };
        debug!(operation = self.operation, phase = %phase, message = %report.message, "Progress");

        let Some(observer) = self.observer else {
            return;
        };
        let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_progress(&report)));
        if delivered.is_err() {
            warn!(operation = self.operation, phase = %phase, "Progress observer panicked");
        }
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.enter(LifecyclePhase::Error, message);
    }
}

#[cfg(test)]
#[path = "progress.test.rs"]
mod tests;
