pub mod descriptions;
pub mod machine;
pub mod motion;

pub use descriptions::{DescriptionPicker, RoundRobinDescriptions, SeededDescriptions};
pub use machine::{StateMachine, StateMachineConfig, Transition};
pub use motion::MotionClassifier;
