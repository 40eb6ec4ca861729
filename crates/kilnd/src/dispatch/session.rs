//! Per-call lifecycle tracking.

use std::fmt;

use tracing::debug;

use super::DISPATCH_TARGET;

/// Lifecycle of one compilation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Created, nothing checked yet.
    Idle,
    /// Accepted by a live service; arguments validated.
    Dispatched,
    /// The front-end is running; sink writes and cache queries happen here.
    Running,
    /// Ended with a status.
    Completed,
    /// Ended without a status.
    Failed,
}

impl CallState {
    /// Returns `true` once the call has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.is_terminal()
            || matches!(
                (self, next),
                (Self::Idle, Self::Dispatched) | (Self::Dispatched, Self::Running)
            )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        formatter.write_str(label)
    }
}

/// One call moving through [`CallState`].
#[derive(Debug)]
pub(crate) struct Call {
    id: u64,
    kind: &'static str,
    state: CallState,
}

impl Call {
    pub(crate) const fn new(id: u64, kind: &'static str) -> Self {
        Self {
            id,
            kind,
            state: CallState::Idle,
        }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) const fn kind(&self) -> &'static str {
        self.kind
    }

    #[cfg(test)]
    pub(crate) const fn state(&self) -> CallState {
        self.state
    }

    /// Moves to `next`. Backwards or repeated transitions are ignored.
    pub(crate) fn advance(&mut self, next: CallState) {
        if !self.state.can_advance_to(next) {
            debug!(
                target: DISPATCH_TARGET,
                call = self.id,
                from = %self.state,
                to = %next,
                "ignoring call state transition"
            );
            return;
        }
        debug!(
            target: DISPATCH_TARGET,
            call = self.id,
            kind = self.kind,
            from = %self.state,
            to = %next,
            "call state changed"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn happy_path_reaches_completed() {
        let mut call = Call::new(7, "compile");
        call.advance(CallState::Dispatched);
        call.advance(CallState::Running);
        call.advance(CallState::Completed);
        assert_eq!(call.state(), CallState::Completed);
        assert!(call.state().is_terminal());
    }

    #[rstest]
    #[case::from_idle(&[], CallState::Failed)]
    #[case::from_running(&[CallState::Dispatched, CallState::Running], CallState::Failed)]
    #[case::dispatched_rejected(&[CallState::Dispatched], CallState::Completed)]
    fn calls_can_end_from_any_live_state(#[case] path: &[CallState], #[case] end: CallState) {
        let mut call = Call::new(1, "incremental_compile");
        for state in path {
            call.advance(*state);
        }
        call.advance(end);
        assert_eq!(call.state(), end);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut call = Call::new(2, "compile");
        call.advance(CallState::Failed);
        call.advance(CallState::Running);
        call.advance(CallState::Completed);
        assert_eq!(call.state(), CallState::Failed);
    }

    #[test]
    fn running_requires_dispatch() {
        let mut call = Call::new(3, "compile");
        call.advance(CallState::Running);
        assert_eq!(call.state(), CallState::Idle);
    }
}
