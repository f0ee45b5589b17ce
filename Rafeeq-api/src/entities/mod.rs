// Public entities for the Rafeeq API
// Data structures that cross the HTTP boundary

// Patient status, readings, events and escalation log entries
pub mod patients;

// Common entities for error handling
pub mod common;
