//! HTTP request handlers

pub mod crop;
pub mod task;

pub use crop::*;
pub use task::*;
