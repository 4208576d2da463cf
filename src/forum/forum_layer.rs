// Forum layer - how forum routes talk to the moderation gateway.
// Nothing here decides anything; it adapts core decisions to responses.

pub mod gate;
pub mod line_server;
pub mod status;

pub use gate::{GateOutcome, ModerationGate, Submission};
pub use status::ModerationStatus;
