//! Integration test suite for weave.
//!
//! These tests drive whole development runs through the service layer
//! against scripted backends and verify that scheduling, checkpointing,
//! approvals and sessions work together.
//!
//! # Test Categories
//!
//! - `development_e2e`: Full runs from concept to final profile
//! - `wave_failures`: Task failures, preconditions and degraded output
//! - `approvals`: Advisory bookkeeping and the blocking policy
//! - `sessions`: Single active run per character
//!
//! # CI Compatibility
//!
//! No real generation backend is contacted; every response is canned.

mod fixtures;

mod approvals;
mod development_e2e;
mod sessions;
mod wave_failures;
