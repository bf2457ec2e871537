//! Run phase state machine.

use serde::Serialize;

/// Phase of a validation run.
///
/// Runs are phase-sequential; `Failed` is reachable only from
/// `Initializing` (pre-flight failure). Every later phase degrades into a
/// partial but still-emitted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    Dispatching,
    Waiting,
    Inspecting,
    Reporting,
    Cleaning,
    Done,
    Failed,
}

impl RunPhase {
    /// Check if this phase allows transitioning to another phase.
    pub fn can_transition_to(&self, target: RunPhase) -> bool {
        use RunPhase::*;

        matches!(
            (self, target),
            (Initializing, Dispatching) | (Initializing, Failed) |
            // Zero successful sends skips straight to reporting
            (Dispatching, Waiting) | (Dispatching, Reporting) |
            (Waiting, Inspecting) |
            (Inspecting, Reporting) |
            (Reporting, Cleaning) | (Reporting, Done) |
            (Cleaning, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Dispatching => "dispatching",
            Self::Waiting => "waiting",
            Self::Inspecting => "inspecting",
            Self::Reporting => "reporting",
            Self::Cleaning => "cleaning",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_sequence_is_valid() {
        assert!(RunPhase::Initializing.can_transition_to(RunPhase::Dispatching));
        assert!(RunPhase::Dispatching.can_transition_to(RunPhase::Waiting));
        assert!(RunPhase::Waiting.can_transition_to(RunPhase::Inspecting));
        assert!(RunPhase::Inspecting.can_transition_to(RunPhase::Reporting));
        assert!(RunPhase::Reporting.can_transition_to(RunPhase::Cleaning));
        assert!(RunPhase::Cleaning.can_transition_to(RunPhase::Done));
        assert!(RunPhase::Reporting.can_transition_to(RunPhase::Done));
    }

    #[test]
    fn failed_only_reachable_from_initializing() {
        assert!(RunPhase::Initializing.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Dispatching.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Waiting.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Inspecting.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Reporting.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Cleaning.can_transition_to(RunPhase::Failed));
    }

    #[test]
    fn zero_sent_shortcut() {
        assert!(RunPhase::Dispatching.can_transition_to(RunPhase::Reporting));
    }

    #[test]
    fn no_backwards_or_skipping_transitions() {
        assert!(!RunPhase::Waiting.can_transition_to(RunPhase::Dispatching));
        assert!(!RunPhase::Dispatching.can_transition_to(RunPhase::Inspecting));
        assert!(!RunPhase::Done.can_transition_to(RunPhase::Initializing));
        assert!(!RunPhase::Failed.can_transition_to(RunPhase::Dispatching));
    }

    #[test]
    fn terminal_phases() {
        assert!(RunPhase::Done.is_terminal());
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::Reporting.is_terminal());
    }

    #[test]
    fn phase_display() {
        assert_eq!(RunPhase::Waiting.to_string(), "waiting");
        assert_eq!(RunPhase::Done.to_string(), "done");
    }
}
