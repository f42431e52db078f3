//! Loop termination signalling.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag a task unit sets to ask its innermost enclosing loop to stop.
///
/// Owned by the loop iteration's execution context. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal(Arc<AtomicBool>);

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum StopReason {
    /// A task set the termination signal during `iteration`.
    Signaled { iteration: u32 },
    /// The iteration cap was reached without the signal being set.
    CapExhausted { iterations: u32 },
}

impl StopReason {
    /// Number of iterations that were started.
    pub fn iterations(&self) -> u32 {
        match self {
            Self::Signaled { iteration } => *iteration,
            Self::CapExhausted { iterations } => *iterations,
        }
    }

    pub fn is_signaled(&self) -> bool {
        matches!(self, Self::Signaled { .. })
    }
}

/// Lifecycle of a loop composer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Running { iteration: u32 },
    Stopped(StopReason),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_shared_between_clones() {
        let signal = TerminationSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_set());

        handle.set();
        assert!(signal.is_set());

        signal.reset();
        assert!(!handle.is_set());
    }

    #[test]
    fn test_stop_reason_iterations() {
        assert_eq!(StopReason::Signaled { iteration: 2 }.iterations(), 2);
        assert_eq!(StopReason::CapExhausted { iterations: 3 }.iterations(), 3);
        assert!(StopReason::Signaled { iteration: 1 }.is_signaled());
        assert!(!StopReason::CapExhausted { iterations: 1 }.is_signaled());
    }

    #[test]
    fn test_loop_state_terminal() {
        assert_eq!(LoopState::default(), LoopState::Idle);
        assert!(!LoopState::Running { iteration: 1 }.is_terminal());
        assert!(LoopState::Stopped(StopReason::CapExhausted { iterations: 1 }).is_terminal());
    }

    #[test]
    fn test_stop_reason_serialization() {
        let json = serde_json::to_value(StopReason::Signaled { iteration: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"reason": "signaled", "iteration": 2}));
    }
}
