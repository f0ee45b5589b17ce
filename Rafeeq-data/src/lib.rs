// Rafeeq Data
// This crate owns the persistence capability: an append-only log of
// escalation events, vital readings and dispatch attempts.

// Database connection management
pub mod database;

// Repository implementations for data access
pub mod repository;

// Data storage models
pub mod models;
