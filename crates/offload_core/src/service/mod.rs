//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and storage calls into use-case level APIs.
//! - Take every dependency as an explicit constructor argument.

pub mod capture_service;
