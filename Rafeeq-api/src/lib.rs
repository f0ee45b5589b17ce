// Rafeeq-api lib.rs
//
// HTTP surface and outer adapters of the Rafeeq monitor: the axum router,
// the voice-call providers and the OpenAPI document.

// Public modules
pub mod api;
pub mod entities;
pub mod openapi;
pub mod providers;

pub use api::{create_app, AppState};
