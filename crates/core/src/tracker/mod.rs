//! Stage transition validation and recording.

mod transitions;

pub use transitions::{StateTracker, TransitionError, TransitionPolicy};
