mod controller;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{SessionController, SubmitOutcome, TICK_PERIOD};
pub use progress::SessionProgress;
