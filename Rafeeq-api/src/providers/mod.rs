// Voice-call provider adapters
// Twilio for real calls, a logging provider for dry runs

pub mod logging;
pub mod twilio;

pub use logging::LoggingCallProvider;
pub use twilio::{TwilioCallProvider, TwilioConfig};
