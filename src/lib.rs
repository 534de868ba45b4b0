//! Weave: wave-scheduled character development.
//!
//! A terse character concept is expanded by seven generation tasks run in
//! three dependency-ordered waves, each completed task producing a numbered
//! checkpoint for review, and finally consolidated into one profile.

pub mod character;
pub mod config;
pub mod error;
pub mod generation;
pub mod log;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod store;
pub mod tasks;
pub mod util;

pub use error::{Error, Result};
pub use service::{Backends, CharacterService, StatusReport};
