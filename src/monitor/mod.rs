pub mod commands;
mod controller;
mod views;

pub use controller::{MonitorController, DEFAULT_DATE_EVENT_LIMIT, DEFAULT_EVENT_LIMIT};
pub use views::{CurrentState, LiveStatus, LiveView, NO_STATE_DESCRIPTION};
