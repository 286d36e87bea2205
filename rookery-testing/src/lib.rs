//! Test doubles and fixtures for the rookery membership layer.

pub mod harness;
pub mod store;

pub use harness::*;
pub use store::*;
