//! Shared types and models for the Farm Operations Management Platform
//!
//! This crate contains the pure domain model of the crop growth engine:
//! stage ordering and derivation, recipe duration arithmetic, and the
//! validation rules that gate every mutation. It performs no I/O.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;
