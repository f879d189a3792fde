//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repositories, the allocator, and the duplication engine
//!   into transactional use-case APIs.
//! - Keep the CLI decoupled from storage details.

pub mod authoring_service;
pub mod publication_service;
