mod database;
mod readiness;
mod sequencer;
mod shutdown;
mod test_runner;

pub use database::*;
pub use readiness::*;
pub use sequencer::*;
pub use shutdown::*;
pub use test_runner::*;
