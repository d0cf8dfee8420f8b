//! Reasoning service access.
//!
//! The analysis engine only sees the `ReasoningService` trait; `ChatClient`
//! is the HTTP implementation used by the CLI.

pub mod client;

pub use client::{ChatClient, ClientConfig, Provider, ReasoningService};
