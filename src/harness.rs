//! Scenario driver
//!
//! A [`Scenario`] is an ordered list of steps, each pairing a configuration
//! with the checks that must hold after it converges. The driver applies the
//! first step, asserts, applies each update step, asserts again, then tears
//! everything down and verifies nothing survived. Any failure aborts the run
//! immediately.
//!
//! State lives for exactly one run: it is created when the scenario starts
//! and dropped when it ends.

use tracing::{error, info, instrument};

use crate::api::CloudApi;
use crate::apply::{apply, destroy_all};
use crate::check::{check_all_rules_destroyed, check_attribute, check_rule_exists};
use crate::config::Configuration;
use crate::state::{Address, State};
use crate::Error;

/// One assertion to run after a step converges
#[derive(Clone, Debug, PartialEq)]
pub enum Check {
    /// The rule at this address must exist remotely and round-trip equal
    Exists(Address),
    /// A recorded attribute must carry this literal value
    Attribute {
        /// Address of the resource to assert on
        address: Address,
        /// Attribute name
        key: String,
        /// Expected literal value
        expected: String,
    },
}

impl Check {
    /// Assert existence of the rule at `address`
    pub fn exists(address: Address) -> Self {
        Self::Exists(address)
    }

    /// Assert a literal attribute value
    pub fn attribute(
        address: Address,
        key: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::Attribute {
            address,
            key: key.into(),
            expected: expected.into(),
        }
    }

    async fn run(&self, api: &dyn CloudApi, state: &State) -> Result<(), Error> {
        match self {
            Self::Exists(address) => check_rule_exists(api, state, address).await,
            Self::Attribute {
                address,
                key,
                expected,
            } => check_attribute(state, address, key, expected),
        }
    }
}

/// One apply-then-assert step
#[derive(Clone, Debug)]
pub struct Step {
    /// Configuration to converge on
    pub config: Configuration,
    /// Checks that must hold afterwards
    pub checks: Vec<Check>,
}

/// An apply / assert / destroy scenario
#[derive(Clone, Debug, Default)]
pub struct Scenario {
    steps: Vec<Step>,
}

impl Scenario {
    /// Create an empty scenario
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return self for chaining
    pub fn step(mut self, config: Configuration, checks: Vec<Check>) -> Self {
        self.steps.push(Step { config, checks });
        self
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the scenario has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the scenario to completion
    ///
    /// Applies each step in order and runs its checks, then destroys
    /// everything and verifies destruction. The first failure aborts the run
    /// and is returned; on a failed check the full state is logged for
    /// diagnosis.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub async fn run(&self, api: &dyn CloudApi) -> Result<(), Error> {
        let mut state = State::new();

        for (index, step) in self.steps.iter().enumerate() {
            info!(step = index + 1, "applying step");
            apply(api, &mut state, &step.config).await?;

            for check in &step.checks {
                if let Err(e) = check.run(api, &state).await {
                    error!(
                        step = index + 1,
                        error = %e,
                        state = %state.to_json().unwrap_or_else(|_| "<unserializable>".into()),
                        "check failed"
                    );
                    return Err(e);
                }
            }
            info!(step = index + 1, checks = step.checks.len(), "step converged");
        }

        // Teardown verifies against a snapshot taken before anything is
        // removed from state.
        let snapshot = state.clone();
        destroy_all(api, &mut state).await?;
        check_all_rules_destroyed(api, &snapshot).await?;
        info!("scenario complete");
        Ok(())
    }
}
