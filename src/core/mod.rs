//! Core types: identifiers, configuration, errors, and domain models.

pub mod config;
pub mod errors;
pub mod ids;
pub mod models;
