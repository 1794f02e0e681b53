//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into the caller-facing workspace and
//!   deduplication APIs.
//! - Keep hosts decoupled from storage details; stores are injected as
//!   `Arc<dyn ...>` collaborators.

pub mod dedup_service;
mod populate;
pub mod workspace_service;
