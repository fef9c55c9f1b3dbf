pub mod state_event;

pub use state_event::{AppendOutcome, NewStateEvent, RejectReason, StateEvent};
