//! Convergence checkers
//!
//! The assertions a scenario runs after each apply and after teardown. Every
//! checker takes the API handle and state explicitly; nothing here reaches
//! for shared fixtures.
//!
//! Existence checking is strict: beyond resolving every recorded remote
//! identifier, the remote object's attributes must round-trip equal to what
//! was recorded at apply time.

use tracing::debug;

use crate::api::CloudApi;
use crate::state::{Address, ResourceKind, ResourceState, State};
use crate::Error;

/// Verify that the rule recorded at `address` exists remotely and matches
///
/// Fails with [`Error::NotFound`] when the address is absent from state or a
/// recorded identifier no longer resolves, [`Error::MissingId`] when no
/// primary identifier was recorded, [`Error::Remote`] when the lookup itself
/// fails, and [`Error::AttributeMismatch`] when the remote object drifted
/// from the recorded attributes.
pub async fn check_rule_exists(
    api: &dyn CloudApi,
    state: &State,
    address: &Address,
) -> Result<(), Error> {
    let resource = state
        .get(address)
        .ok_or_else(|| Error::not_found(format!("{address} is not in state")))?;

    if resource.primary_id.is_none() {
        return Err(Error::missing_id(address.to_string()));
    }

    for (field, id) in &resource.remote_ids {
        let rule = api.get_load_balancer_rule(*id).await?.ok_or_else(|| {
            Error::not_found(format!("remote object for {address} field {field} ({id})"))
        })?;

        verify_round_trip(address, resource, "name", &rule.name)?;
        verify_round_trip(address, resource, "algorithm", &rule.algorithm.to_string())?;
        verify_round_trip(address, resource, "public_port", &rule.public_port.to_string())?;
        verify_round_trip(
            address,
            resource,
            "private_port",
            &rule.private_port.to_string(),
        )?;
    }

    debug!(%address, "existence check passed");
    Ok(())
}

/// Assert a recorded attribute carries the expected literal value
pub fn check_attribute(
    state: &State,
    address: &Address,
    key: &str,
    expected: &str,
) -> Result<(), Error> {
    let resource = state
        .get(address)
        .ok_or_else(|| Error::not_found(format!("{address} is not in state")))?;

    match resource.attributes.get(key) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(Error::attribute_mismatch(
            address.to_string(),
            key,
            expected,
            actual,
        )),
        None => Err(Error::attribute_mismatch(
            address.to_string(),
            key,
            expected,
            "<unset>",
        )),
    }
}

/// Verify that no rule managed in `snapshot` survives remotely
///
/// Run once after teardown against a snapshot of state taken before it.
pub async fn check_all_rules_destroyed(
    api: &dyn CloudApi,
    snapshot: &State,
) -> Result<(), Error> {
    for address in snapshot.addresses_of_kind(ResourceKind::LoadBalancerRule) {
        let resource = snapshot
            .get(address)
            .ok_or_else(|| Error::not_found(format!("{address} is not in state")))?;

        if resource.primary_id.is_none() {
            return Err(Error::missing_id(address.to_string()));
        }

        for id in resource.remote_ids.values() {
            if api.get_load_balancer_rule(*id).await?.is_some() {
                return Err(Error::still_exists(format!("{address} ({id})")));
            }
        }
        debug!(%address, "destruction check passed");
    }
    Ok(())
}

/// Compare one recorded attribute with the value the remote object reports
fn verify_round_trip(
    address: &Address,
    resource: &ResourceState,
    key: &str,
    remote_value: &str,
) -> Result<(), Error> {
    let Some(recorded) = resource.attributes.get(key) else {
        // Attribute never recorded; nothing to compare.
        return Ok(());
    };
    if recorded != remote_value {
        return Err(Error::attribute_mismatch(
            address.to_string(),
            key,
            recorded,
            remote_value,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockCloudApi;
    use crate::rule::{Algorithm, RemoteRule, RuleState};
    use chrono::Utc;
    use uuid::Uuid;

    fn recorded_rule(id: Uuid) -> ResourceState {
        ResourceState::with_primary_id(id)
            .attribute("name", "web")
            .attribute("algorithm", "roundrobin")
            .attribute("public_port", "80")
            .attribute("private_port", "80")
    }

    fn remote_rule(id: Uuid) -> RemoteRule {
        RemoteRule {
            id,
            name: "web".to_string(),
            algorithm: Algorithm::RoundRobin,
            public_port: 80,
            private_port: 80,
            public_ip_id: Uuid::new_v4(),
            network_id: Uuid::new_v4(),
            state: RuleState::Active,
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_existence_passes_when_every_id_resolves_and_matches() {
        let id = Uuid::new_v4();
        let mut state = State::new();
        state.record(Address::rule("foo"), recorded_rule(id));

        let mut api = MockCloudApi::new();
        let remote = remote_rule(id);
        api.expect_get_load_balancer_rule()
            .returning(move |_| Ok(Some(remote.clone())));

        check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_existence_fails_for_unknown_address() {
        let api = MockCloudApi::new();
        let state = State::new();

        let err = check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_existence_fails_without_primary_id() {
        let api = MockCloudApi::new();
        let mut state = State::new();
        state.record(Address::rule("foo"), ResourceState::default());

        let err = check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingId(_)));
    }

    #[tokio::test]
    async fn test_existence_fails_when_remote_lookup_resolves_to_nothing() {
        let id = Uuid::new_v4();
        let mut state = State::new();
        state.record(Address::rule("foo"), recorded_rule(id));

        let mut api = MockCloudApi::new();
        api.expect_get_load_balancer_rule().returning(|_| Ok(None));

        let err = check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_existence_propagates_remote_errors() {
        let id = Uuid::new_v4();
        let mut state = State::new();
        state.record(Address::rule("foo"), recorded_rule(id));

        let mut api = MockCloudApi::new();
        api.expect_get_load_balancer_rule()
            .returning(|_| Err(Error::remote("api unavailable")));

        let err = check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }

    #[tokio::test]
    async fn test_existence_detects_remote_drift() {
        let id = Uuid::new_v4();
        let mut state = State::new();
        state.record(Address::rule("foo"), recorded_rule(id));

        let mut api = MockCloudApi::new();
        let mut drifted = remote_rule(id);
        drifted.name = "web-renamed-out-of-band".to_string();
        api.expect_get_load_balancer_rule()
            .returning(move |_| Ok(Some(drifted.clone())));

        let err = check_rule_exists(&api, &state, &Address::rule("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AttributeMismatch { .. }));
    }

    #[test]
    fn test_attribute_check_matches_literal_values() {
        let mut state = State::new();
        state.record(Address::rule("foo"), recorded_rule(Uuid::new_v4()));

        check_attribute(&state, &Address::rule("foo"), "name", "web").unwrap();

        let err = check_attribute(&state, &Address::rule("foo"), "name", "other").unwrap_err();
        assert!(matches!(err, Error::AttributeMismatch { .. }));

        let err = check_attribute(&state, &Address::rule("foo"), "nonexistent", "x").unwrap_err();
        assert!(err.to_string().contains("<unset>"));
    }

    #[tokio::test]
    async fn test_destruction_check_passes_when_nothing_resolves() {
        let mut snapshot = State::new();
        snapshot.record(Address::rule("foo"), recorded_rule(Uuid::new_v4()));

        let mut api = MockCloudApi::new();
        api.expect_get_load_balancer_rule().returning(|_| Ok(None));

        check_all_rules_destroyed(&api, &snapshot).await.unwrap();
    }

    #[tokio::test]
    async fn test_destruction_check_flags_survivors() {
        let id = Uuid::new_v4();
        let mut snapshot = State::new();
        snapshot.record(Address::rule("foo"), recorded_rule(id));

        let mut api = MockCloudApi::new();
        let survivor = remote_rule(id);
        api.expect_get_load_balancer_rule()
            .returning(move |_| Ok(Some(survivor.clone())));

        let err = check_all_rules_destroyed(&api, &snapshot).await.unwrap_err();
        assert!(matches!(err, Error::StillExists(_)));
    }

    #[tokio::test]
    async fn test_destruction_check_ignores_non_rule_resources() {
        let mut snapshot = State::new();
        snapshot.record(
            Address::new(ResourceKind::Instance, "foobar1"),
            ResourceState::with_primary_id(Uuid::new_v4()),
        );

        // No expectations: a lookup against an instance id would panic.
        let api = MockCloudApi::new();
        check_all_rules_destroyed(&api, &snapshot).await.unwrap();
    }
}
