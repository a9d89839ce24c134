//! HUMAN FLY — crash round engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod engine;
pub mod dashboard;
pub mod autopilot;
