pub mod health;
pub mod patients;

// Tests module
#[cfg(test)]
mod tests;

// Re-export handlers for easier imports
pub use health::health_check;
pub use patients::{get_escalations, get_patient, list_alerts, list_patients, report_event, submit_vitals};
