//! Stage kind and state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stage an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Load one sample's raw data into a per-sample dataset.
    Load,
    /// Assemble per-sample datasets and mapping tables into one alignment object.
    Build,
    /// Execute the alignment on an assembled object.
    Run,
    /// Extract mapping scores and write report tables.
    Report,
}

impl StageKind {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [Self::Load, Self::Build, Self::Run, Self::Report];

    /// File stem used when naming this stage's artifacts.
    #[must_use]
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Load => "sam",
            Self::Build => "samap",
            Self::Run => "samap_results",
            Self::Report => "report",
        }
    }

    /// The stage whose artifacts this stage consumes, if any.
    #[must_use]
    pub fn upstream(&self) -> Option<Self> {
        match self {
            Self::Load => None,
            Self::Build => Some(Self::Load),
            Self::Run => Some(Self::Build),
            Self::Report => Some(Self::Run),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Build => write!(f, "build"),
            Self::Run => write!(f, "run"),
            Self::Report => write!(f, "report"),
        }
    }
}

/// The execution state of one stage invocation.
///
/// `Pending → Loading → Executing → Persisting → Done`, with `Failed`
/// reachable from any of the three working states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not started.
    #[default]
    Pending,
    /// Reading input artifacts.
    Loading,
    /// Running the external computation.
    Executing,
    /// Writing the output artifact.
    Persisting,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Loading => write!(f, "loading"),
            Self::Executing => write!(f, "executing"),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageState {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the stage is doing work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Loading | Self::Executing | Self::Persisting)
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Loading)
            | (Self::Loading, Self::Executing)
            | (Self::Executing, Self::Persisting)
            | (Self::Persisting, Self::Done) => true,
            (from, Self::Failed) => from.is_active(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Load.to_string(), "load");
        assert_eq!(StageKind::Build.to_string(), "build");
        assert_eq!(StageKind::Run.to_string(), "run");
        assert_eq!(StageKind::Report.to_string(), "report");
    }

    #[test]
    fn test_stage_kind_file_stem() {
        assert_eq!(StageKind::Load.file_stem(), "sam");
        assert_eq!(StageKind::Build.file_stem(), "samap");
        assert_eq!(StageKind::Run.file_stem(), "samap_results");
    }

    #[test]
    fn test_stage_kind_upstream_chain() {
        assert_eq!(StageKind::Load.upstream(), None);
        assert_eq!(StageKind::Report.upstream(), Some(StageKind::Run));
        assert_eq!(StageKind::Run.upstream(), Some(StageKind::Build));
    }

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            StageState::Pending,
            StageState::Loading,
            StageState::Executing,
            StageState::Persisting,
            StageState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failed_reachable_only_from_active_states() {
        assert!(StageState::Loading.can_transition_to(StageState::Failed));
        assert!(StageState::Executing.can_transition_to(StageState::Failed));
        assert!(StageState::Persisting.can_transition_to(StageState::Failed));
        assert!(!StageState::Pending.can_transition_to(StageState::Failed));
        assert!(!StageState::Done.can_transition_to(StageState::Failed));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        for next in [StageState::Loading, StageState::Executing, StageState::Done] {
            assert!(!StageState::Failed.can_transition_to(next));
            assert!(!StageState::Done.can_transition_to(next));
        }
        assert!(StageState::Failed.is_terminal());
        assert!(!StageState::Executing.is_terminal());
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!StageState::Pending.can_transition_to(StageState::Executing));
        assert!(!StageState::Loading.can_transition_to(StageState::Done));
    }

    #[test]
    fn test_stage_state_serialize() {
        let json = serde_json::to_string(&StageState::Persisting).unwrap();
        assert_eq!(json, r#""persisting""#);

        let kind: StageKind = serde_json::from_str(r#""build""#).unwrap();
        assert_eq!(kind, StageKind::Build);
    }
}
