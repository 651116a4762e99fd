// Utility functions

pub mod errors;
pub mod logger;
pub mod throttle;

pub use errors::{user_friendly_message, ErrorHandler, JobStatusUpdater, ResearchError};
pub use logger::init_logger;
pub use throttle::{Pacer, Sleeper, Throttle, TokioSleeper};
