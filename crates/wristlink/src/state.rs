//! Handheld-side view of the remote workout lifecycle.
//!
//! Remote observations are authoritative: every observation overwrites the
//! current state, except that nothing leaves [`WorkoutState::Ended`]. Local
//! commands never change the state; they only record what the handheld expects
//! to observe next.

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};
use wristlink_common::{WorkoutCommand, WorkoutState};

/// A change of the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change
    pub from: WorkoutState,
    /// State after the change
    pub to: WorkoutState,
}

/// What folding one observation did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The current state changed.
    Changed(Transition),
    /// The observation repeated the current state.
    Unchanged,
    /// The session had already ended; the observation was dropped.
    IgnoredAfterEnd,
}

impl Observation {
    /// The transition, when the observation changed the state.
    pub fn transition(self) -> Option<Transition> {
        match self {
            Observation::Changed(transition) => Some(transition),
            _ => None,
        }
    }
}

/// The single outstanding expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    /// Command that set the expectation; `None` for the start of the session
    pub command: Option<WorkoutCommand>,
    /// State the handheld expects the wrist to report next
    pub state: WorkoutState,
}

/// The handheld's model of the wrist's lifecycle.
///
/// Tracks the last reported state, the one outstanding [`Expectation`], the
/// moving flag and how many observations have arrived.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: WorkoutState,
    expectation: Option<Expectation>,
    is_moving: bool,
    observation_count: u64,
    last_observed_at: Option<DateTime<Utc>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// A machine in [`WorkoutState::NotStarted`] with nothing expected.
    pub fn new() -> Self {
        Self {
            current: WorkoutState::NotStarted,
            expectation: None,
            is_moving: false,
            observation_count: 0,
            last_observed_at: None,
        }
    }

    /// The last state the wrist reported.
    pub fn current(&self) -> WorkoutState {
        self.current
    }

    /// The outstanding expectation, if a command is unconfirmed.
    pub fn expectation(&self) -> Option<Expectation> {
        self.expectation
    }

    /// Whether distance tracking was last switched on.
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Observations folded so far, including ones that repeated the state.
    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    /// Timestamp of the most recent observation.
    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    /// Expect the remote side to report that it is starting.
    pub fn expect_start(&mut self) {
        self.set_expectation(Expectation {
            command: None,
            state: WorkoutState::Starting,
        });
    }

    /// Record the local effect of a command that was sent.
    pub fn apply_command(&mut self, command: WorkoutCommand) {
        if let Some(moving) = command.moving_flag() {
            self.is_moving = moving;
            trace!("Distance tracking {}", if moving { "on" } else { "off" });
            return;
        }

        if let Some(state) = command.expected_state() {
            self.set_expectation(Expectation {
                command: Some(command),
                state,
            });
        }
    }

    fn set_expectation(&mut self, expectation: Expectation) {
        if let Some(previous) = self.expectation.replace(expectation) {
            trace!(
                "Expectation {:?} superseded by {:?}",
                previous.state, expectation.state
            );
        }
    }

    /// Fold a state reported by the remote side.
    pub fn observe(&mut self, state: WorkoutState, at: DateTime<Utc>) -> Observation {
        if self.current == WorkoutState::Ended {
            warn!("Ignoring {state} observation after the session ended");
            return Observation::IgnoredAfterEnd;
        }

        self.observation_count += 1;
        self.last_observed_at = Some(at);

        if self.expectation.is_some_and(|e| e.state == state) {
            debug!("Observation {state} confirms the outstanding expectation");
            self.expectation = None;
        }

        if state == self.current {
            return Observation::Unchanged;
        }

        let transition = Transition {
            from: self.current,
            to: state,
        };
        debug!("Workout state {} -> {}", transition.from, transition.to);
        self.current = state;
        Observation::Changed(transition)
    }

    /// Close the machine regardless of what the remote side reported.
    pub fn force_end(&mut self) -> Option<Transition> {
        self.expectation = None;
        if self.current == WorkoutState::Ended {
            return None;
        }
        let transition = Transition {
            from: self.current,
            to: WorkoutState::Ended,
        };
        self.current = WorkoutState::Ended;
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_initial_state() {
        let machine = StateMachine::new();
        assert_eq!(machine.current(), WorkoutState::NotStarted);
        assert_eq!(machine.expectation(), None);
        assert!(!machine.is_moving());
        assert_eq!(machine.observation_count(), 0);
    }

    #[test]
    fn test_last_observation_wins() {
        let mut machine = StateMachine::new();
        for state in [WorkoutState::Starting, WorkoutState::Running, WorkoutState::Paused] {
            machine.observe(state, now());
        }
        assert_eq!(machine.current(), WorkoutState::Paused);
        assert_eq!(machine.observation_count(), 3);
    }

    #[test]
    fn test_observations_go_backwards() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Running, now());
        let observed = machine.observe(WorkoutState::Starting, now());
        assert_eq!(
            observed,
            Observation::Changed(Transition {
                from: WorkoutState::Running,
                to: WorkoutState::Starting
            })
        );
    }

    #[test]
    fn test_ended_is_terminal() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Ended, now());
        assert_eq!(machine.observe(WorkoutState::Running, now()), Observation::IgnoredAfterEnd);
        assert_eq!(machine.current(), WorkoutState::Ended);
        assert_eq!(machine.observation_count(), 1);
    }

    #[test]
    fn test_repeated_observation_is_counted() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Running, now());
        let at = now();
        assert_eq!(machine.observe(WorkoutState::Running, at), Observation::Unchanged);
        assert_eq!(machine.observation_count(), 2);
        assert_eq!(machine.last_observed_at(), Some(at));
    }

    #[test]
    fn test_commands_do_not_change_state() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Running, now());
        for command in WorkoutCommand::ALL {
            machine.apply_command(command);
            assert_eq!(machine.current(), WorkoutState::Running);
        }
    }

    #[test]
    fn test_last_command_wins() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Running, now());
        machine.apply_command(WorkoutCommand::Pause);
        machine.apply_command(WorkoutCommand::Resume);
        assert_eq!(
            machine.expectation(),
            Some(Expectation {
                command: Some(WorkoutCommand::Resume),
                state: WorkoutState::Running
            })
        );

        // A Paused report does not match Resume: accepted, expectation kept.
        machine.observe(WorkoutState::Paused, now());
        assert_eq!(machine.current(), WorkoutState::Paused);
        assert_eq!(machine.expectation().map(|e| e.state), Some(WorkoutState::Running));

        machine.observe(WorkoutState::Running, now());
        assert_eq!(machine.expectation(), None);
    }

    #[test]
    fn test_ping_and_moving_keep_expectation() {
        let mut machine = StateMachine::new();
        machine.apply_command(WorkoutCommand::Stop);
        machine.apply_command(WorkoutCommand::Ping);
        machine.apply_command(WorkoutCommand::StartMoving);
        assert!(machine.is_moving());
        assert_eq!(machine.expectation().map(|e| e.state), Some(WorkoutState::Ended));

        machine.apply_command(WorkoutCommand::StopMoving);
        assert!(!machine.is_moving());
        assert_eq!(machine.expectation().map(|e| e.command), Some(Some(WorkoutCommand::Stop)));
    }

    #[test]
    fn test_start_expectation_is_confirmed() {
        let mut machine = StateMachine::new();
        machine.expect_start();
        assert_eq!(machine.expectation().map(|e| e.state), Some(WorkoutState::Starting));
        machine.observe(WorkoutState::Starting, now());
        assert_eq!(machine.expectation(), None);
    }

    #[test]
    fn test_force_end() {
        let mut machine = StateMachine::new();
        machine.observe(WorkoutState::Starting, now());
        assert_eq!(
            machine.force_end(),
            Some(Transition {
                from: WorkoutState::Starting,
                to: WorkoutState::Ended
            })
        );
        assert_eq!(machine.force_end(), None);
    }
}
