//! Calibration state machine
//!
//! Pure transition logic: no timers, no I/O. The session driver feeds each
//! poll tick and each completed read or command in as a `SessionEvent` and
//! executes the returned effects.

use ota_common::{AdaptationStatus, CalibrationError, IeeeAddr, LinkError};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lifecycle state of one calibration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the valve to report `ready_to_calibrate`
    Polling,
    /// Calibrate command issued, still polling for the result
    Calibrating,
    Succeeded,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut
        )
    }
}

/// Input to the machine: a poll tick or the completion of one in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Poll timer fired, before the next status read is issued.
    ///
    /// Bounds the session even when no request ever completes.
    PollDue,
    StatusRead(Result<AdaptationStatus, LinkError>),
    CalibrationSent(Result<(), LinkError>),
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Succeeded,
    AdaptationFailed,
    TimedOut,
}

impl Termination {
    pub fn state(&self) -> SessionState {
        match self {
            Termination::Succeeded => SessionState::Succeeded,
            Termination::AdaptationFailed => SessionState::Failed,
            Termination::TimedOut => SessionState::TimedOut,
        }
    }

    pub fn into_result(self, device: IeeeAddr) -> Result<(), CalibrationError> {
        match self {
            Termination::Succeeded => Ok(()),
            Termination::AdaptationFailed => Err(CalibrationError::AdaptationFailed { device }),
            Termination::TimedOut => Err(CalibrationError::Timeout { device }),
        }
    }
}

/// Side effect requested by a transition, executed by the session driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    IssueCalibration,
    CancelTimer,
    Finish(Termination),
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(state: SessionState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }

    fn terminate(termination: Termination) -> Self {
        Self {
            next: termination.state(),
            effects: vec![Effect::CancelTimer, Effect::Finish(termination)],
        }
    }
}

/// Compute the next state for `event`.
///
/// Terminal states absorb every event. Anything that is neither an explicit
/// `success` nor `error` read falls through to the deadline check, including
/// the poll tick itself.
pub fn transition(
    state: SessionState,
    event: &SessionEvent,
    deadline: Instant,
    now: Instant,
) -> Step {
    if state.is_terminal() {
        return Step::stay(state);
    }

    match event {
        SessionEvent::StatusRead(Ok(AdaptationStatus::Success)) => {
            Step::terminate(Termination::Succeeded)
        }
        SessionEvent::StatusRead(Ok(AdaptationStatus::Error)) => {
            Step::terminate(Termination::AdaptationFailed)
        }
        SessionEvent::StatusRead(Ok(AdaptationStatus::ReadyToCalibrate)) => {
            if now >= deadline {
                return Step::terminate(Termination::TimedOut);
            }
            Step {
                next: SessionState::Calibrating,
                effects: vec![Effect::IssueCalibration],
            }
        }
        SessionEvent::PollDue
        | SessionEvent::StatusRead(_)
        | SessionEvent::CalibrationSent(_) => check_deadline(state, deadline, now),
    }
}

fn check_deadline(state: SessionState, deadline: Instant, now: Instant) -> Step {
    if now >= deadline {
        Step::terminate(Termination::TimedOut)
    } else {
        Step::stay(state)
    }
}

/// State plus deadline of one session.
#[derive(Debug, Clone)]
pub struct CalibrationMachine {
    state: SessionState,
    deadline: Instant,
}

impl CalibrationMachine {
    pub fn new(deadline: Instant) -> Self {
        Self {
            state: SessionState::Polling,
            deadline,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply `event` observed at `now` and return the effects to execute
    pub fn handle(&mut self, event: &SessionEvent, now: Instant) -> Vec<Effect> {
        let step = transition(self.state, event, self.deadline, now);
        self.state = step.next;
        step.effects
    }
}
