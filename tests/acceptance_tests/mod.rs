//! Acceptance tests for the windlass provisioning core
//!
//! # Test Organization
//!
//! Tests are organized by the story they tell:
//!
//! - `lb_rule`: Stories about the load-balancer rule lifecycle: initial
//!   convergence, in-place updates, forced replacement, membership changes,
//!   idempotent re-apply, and verified destruction
//!
//! Shared fixtures (scenario configurations and parameters) live in
//! `helpers`.

mod helpers;
mod lb_rule;
