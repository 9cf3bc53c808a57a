//! otad library - exposes modules for testing.

pub mod calibration;
pub mod orchestrator;
pub mod simulate;

pub use calibration::{start_calibration_session, CalibrationReport, CalibrationSession};
pub use orchestrator::{CalibrationOutcome, UpdateOrchestrator};
