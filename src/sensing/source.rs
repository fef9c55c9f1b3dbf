use anyhow::Result;

use crate::models::PositionSample;

/// Anything that can report where the machine's marker is right now.
///
/// Called once per tick from the sensing loop; an implementation must return
/// within one sampling period. "Nothing detected" is a normal sample, not an
/// error; errors are reserved for a source that could not be read at all.
pub trait PositionSource: Send {
    fn next_sample(&mut self) -> Result<PositionSample>;
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn next_sample(&mut self) -> Result<PositionSample> {
        (**self).next_sample()
    }
}
