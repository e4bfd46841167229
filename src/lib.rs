// ABOUTME: Library root for stagecraft - exposes the orchestration core for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod artifact;
pub mod cleanup;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod infra;
pub mod output;
pub mod plan;
pub mod platform;
pub mod preflight;
pub mod probe;
pub mod retry;
pub mod rollout;
pub mod stage;
pub mod template;
pub mod types;
pub mod verify;
