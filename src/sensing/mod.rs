mod classification;
mod controller;
mod loop_worker;
pub mod simulator;
pub mod source;

pub use classification::Classification;
pub use controller::SensingController;
pub use loop_worker::LoopContext;
pub use simulator::{Phase, SimulatedSource};
pub use source::PositionSource;
