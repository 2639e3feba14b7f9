mod logger;
mod backoff;

pub use logger::{LoggerManager, BOOTSTRAP_TARGET};
pub use backoff::calculate_backoff;
