//! Core library for Autorun
//!
//! This crate contains the pure building blocks of a batch run:
//! - Checklist analysis over markdown task documents
//! - Batch configuration, run state and history record types
//! - Template variable expansion

pub mod batch;
pub mod document;
pub mod error;
pub mod template;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
