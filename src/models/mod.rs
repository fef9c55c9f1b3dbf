pub mod sample;
pub mod snapshot;
pub mod state;

pub use sample::{PositionSample, RawKind, RawSignal};
pub use snapshot::StateSnapshot;
pub use state::{MachineState, StateFilter, TimelineState};
