//! Randomized invariant tests for the calibration transition function
//!
//! Inputs come from a small xorshift generator so runs are reproducible
//! without extra dependencies.
//!
//! ## Invariants Tested
//!
//! - Terminal states absorb every event at any time
//! - A session finishes at most once and cancels its timer exactly then
//! - No calibration command is issued at or after the deadline
//! - A poll tick at or after the deadline always ends the session

use ota_common::{AdaptationStatus, IeeeAddr, LinkError};
use otad::calibration::{transition, CalibrationMachine, Effect, SessionEvent, SessionState};
use std::time::Duration;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(300);
const SEEDS: [u64; 4] = [7, 42, 1337, 0xdead_beef];

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Xorshift64 generator for test inputs
struct TestRng {
    state: u64,
}

impl TestRng {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    fn event(&mut self) -> SessionEvent {
        let device = IeeeAddr(1);
        match self.next_range(0, 10) {
            0 => SessionEvent::PollDue,
            1 => SessionEvent::StatusRead(Err(LinkError::Timeout { device })),
            2 => SessionEvent::CalibrationSent(Ok(())),
            3 => SessionEvent::CalibrationSent(Err(LinkError::Unreachable { device })),
            // Weighted towards reads, like a live session
            _ => {
                let raw = match self.next_range(0, 8) {
                    6 => 0x00ff,
                    7 => 0x0000,
                    n => n as u16 % 5,
                };
                SessionEvent::StatusRead(Ok(AdaptationStatus::from_raw(raw)))
            }
        }
    }
}

// ============================================================================
// Terminal absorption
// ============================================================================

#[test]
fn test_terminal_states_absorb_random_events() {
    let start = Instant::now();
    let deadline = start + TIMEOUT;
    let terminals = [
        SessionState::Succeeded,
        SessionState::Failed,
        SessionState::TimedOut,
    ];

    for seed in SEEDS {
        let mut rng = TestRng::new(seed);
        for _ in 0..1000 {
            let state = terminals[rng.next_range(0, 3) as usize];
            let event = rng.event();
            let now = start + Duration::from_secs(rng.next_range(0, 900));

            let step = transition(state, &event, deadline, now);
            assert_eq!(step.next, state, "{:?} left on {:?}", state, event);
            assert!(step.effects.is_empty(), "{:?} produced effects on {:?}", state, event);
        }
    }
}

// ============================================================================
// Session traces
// ============================================================================

#[test]
fn test_random_traces_finish_once() {
    for seed in SEEDS {
        let mut rng = TestRng::new(seed);

        for _ in 0..200 {
            let start = Instant::now();
            let deadline = start + TIMEOUT;
            let mut machine = CalibrationMachine::new(deadline);
            let mut elapsed = 0u64;
            let mut finishes = 0;
            let mut cancels = 0;

            for _ in 0..rng.next_range(1, 120) {
                elapsed += rng.next_range(0, 15);
                let now = start + Duration::from_secs(elapsed);
                let event = rng.event();
                let was_terminal = machine.is_terminal();

                let effects = machine.handle(&event, now);

                if was_terminal {
                    assert!(effects.is_empty());
                }
                for effect in &effects {
                    match effect {
                        Effect::IssueCalibration => {
                            assert!(now < deadline, "command issued after the deadline")
                        }
                        Effect::CancelTimer => cancels += 1,
                        Effect::Finish(termination) => {
                            finishes += 1;
                            assert_eq!(termination.state(), machine.state());
                        }
                    }
                }
                if event == SessionEvent::PollDue && now >= deadline {
                    assert!(machine.is_terminal(), "tick past the deadline kept the session");
                }
            }

            assert!(finishes <= 1);
            assert_eq!(cancels, finishes);
            assert_eq!(machine.is_terminal(), finishes == 1);
        }
    }
}
