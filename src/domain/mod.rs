pub mod event;
pub mod opinion;
pub mod state;

pub use event::{EventContext, Odds, Side};
pub use opinion::{ExpertOpinion, OpinionStatus};
pub use state::{FailureReason, RequestState, StateTransition};
