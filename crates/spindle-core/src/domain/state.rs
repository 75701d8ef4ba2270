//! State - ワーカーのライフサイクル状態

use std::fmt;

use serde::{Deserialize, Serialize};

/// Worker lifecycle state.
///
/// State transitions:
/// - Idle -> Running (`start`)
/// - Running -> Stopping (`stop`)
/// - Running | Stopping -> Stopped (the loop exited)
///
/// `Stopped` is terminal: a stopped worker is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, loop not spawned yet.
    Idle,

    /// Loop is consuming the queue.
    Running,

    /// Queue closed, loop draining what is left.
    Stopping,

    /// Loop has exited.
    Stopped,
}

impl WorkerState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped)
    }

    /// Has the loop been spawned and not yet exited?
    pub fn is_active(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::idle(WorkerState::Idle, false, false)]
    #[case::running(WorkerState::Running, false, true)]
    #[case::stopping(WorkerState::Stopping, false, true)]
    #[case::stopped(WorkerState::Stopped, true, false)]
    fn classifies_states(
        #[case] state: WorkerState,
        #[case] terminal: bool,
        #[case] active: bool,
    ) {
        assert_eq!(state.is_terminal(), terminal);
        assert_eq!(state.is_active(), active);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&WorkerState::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
    }
}
