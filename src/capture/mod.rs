// Frame intake and the background processing worker.

pub mod frame;
pub mod session;
pub mod synthetic;

pub use frame::{OwnedPlane, OwnedYuvFrame};
pub use session::{ProcessingSession, SubmitOutcome};
pub use synthetic::{ChromaLayout, SyntheticSource};
