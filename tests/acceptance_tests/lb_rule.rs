//! Stories about the load-balancer rule lifecycle
//!
//! Each story drives the full pipeline against the sandbox account: apply a
//! configuration, assert on recorded and remote state, and (where the story
//! calls for it) tear down and verify nothing survived.

use std::collections::HashSet;

use windlass::api::{CloudApi, SandboxCloud};
use windlass::apply::{apply, destroy_all};
use windlass::check::check_all_rules_destroyed;
use windlass::config::ScenarioParams;
use windlass::harness::{Check, Scenario};
use windlass::state::State;
use windlass::Error;

use super::helpers::{
    basic_configuration, basic_configuration_with_rule, basic_rule, init_tracing, rule_address,
    update_configuration,
};

/// Story: a declared rule converges on first apply
///
/// One server behind `terraform-lb` on port 80. After the apply, the rule
/// must exist remotely with exactly the declared attributes, and teardown
/// must leave the account empty.
#[tokio::test]
async fn story_basic_rule_converges_and_matches() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();

    let scenario = Scenario::new().step(
        basic_configuration(&params),
        vec![
            Check::exists(rule_address()),
            Check::attribute(rule_address(), "name", "terraform-lb"),
            Check::attribute(rule_address(), "algorithm", "roundrobin"),
            Check::attribute(rule_address(), "public_port", "80"),
            Check::attribute(rule_address(), "private_port", "80"),
        ],
    );

    scenario.run(&cloud).await.unwrap();
    assert_eq!(cloud.object_count().await, 0);
}

/// Story: an updated declaration converges from the previous state
///
/// Phase two renames the rule, switches the algorithm, moves both ports to
/// 443 and declares a reordered two-server member list. The rule must keep
/// existing (under a fresh identifier, since ports cannot change in place)
/// and carry the updated attributes.
#[tokio::test]
async fn story_updated_rule_converges_from_previous_state() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();

    let scenario = Scenario::new()
        .step(
            basic_configuration(&params),
            vec![
                Check::exists(rule_address()),
                Check::attribute(rule_address(), "name", "terraform-lb"),
                Check::attribute(rule_address(), "algorithm", "roundrobin"),
                Check::attribute(rule_address(), "public_port", "80"),
                Check::attribute(rule_address(), "private_port", "80"),
            ],
        )
        .step(
            update_configuration(&params),
            vec![
                Check::exists(rule_address()),
                Check::attribute(rule_address(), "name", "terraform-lb-update"),
                Check::attribute(rule_address(), "algorithm", "leastconn"),
                Check::attribute(rule_address(), "public_port", "443"),
                Check::attribute(rule_address(), "private_port", "443"),
            ],
        );

    scenario.run(&cloud).await.unwrap();
    assert_eq!(cloud.object_count().await, 0);
}

/// Story: teardown leaves zero matching remote objects
#[tokio::test]
async fn story_destroy_leaves_no_remote_rules() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    apply(&cloud, &mut state, &basic_configuration(&params))
        .await
        .unwrap();
    assert_eq!(cloud.rule_count().await, 1);

    let snapshot = state.clone();
    destroy_all(&cloud, &mut state).await.unwrap();

    check_all_rules_destroyed(&cloud, &snapshot).await.unwrap();
    assert_eq!(cloud.object_count().await, 0);
    assert!(state.is_empty());
}

/// Story: the destruction check catches survivors
///
/// Running the check while the rule is still live must fail with the
/// surviving identifier named.
#[tokio::test]
async fn story_destruction_check_flags_live_rule() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    apply(&cloud, &mut state, &basic_configuration(&params))
        .await
        .unwrap();

    let err = check_all_rules_destroyed(&cloud, &state).await.unwrap_err();
    assert!(matches!(err, Error::StillExists(_)));
}

/// Story: re-applying an unchanged configuration changes nothing
#[tokio::test]
async fn story_reapply_is_idempotent() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let config = basic_configuration(&params);
    let mut state = State::new();

    apply(&cloud, &mut state, &config).await.unwrap();
    let id = state.get(&rule_address()).unwrap().primary_id.unwrap();
    let mutations = cloud.mutation_count().await;

    apply(&cloud, &mut state, &config).await.unwrap();

    assert_eq!(cloud.mutation_count().await, mutations);
    assert_eq!(state.get(&rule_address()).unwrap().primary_id.unwrap(), id);
    assert_eq!(
        state.output(&rule_address(), "name").as_deref(),
        Some("terraform-lb")
    );
}

/// Story: renaming keeps the rule's identity
///
/// Name and algorithm change in place; the server-assigned identifier must
/// not change.
#[tokio::test]
async fn story_rename_keeps_rule_identity() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    apply(&cloud, &mut state, &basic_configuration(&params))
        .await
        .unwrap();
    let id_before = state.get(&rule_address()).unwrap().primary_id.unwrap();

    let mut renamed = basic_rule();
    renamed.name = "terraform-lb-update".into();
    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, renamed),
    )
    .await
    .unwrap();

    let id_after = state.get(&rule_address()).unwrap().primary_id.unwrap();
    assert_eq!(id_before, id_after);
    assert_eq!(
        state.output(&rule_address(), "name").as_deref(),
        Some("terraform-lb-update")
    );
}

/// Story: a port change forces a replacement
///
/// The API has no call to move a rule to different ports, so the identifier
/// must be fresh and the old one must stop resolving.
#[tokio::test]
async fn story_port_change_replaces_rule() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    apply(&cloud, &mut state, &basic_configuration(&params))
        .await
        .unwrap();
    let id_before = state.get(&rule_address()).unwrap().primary_id.unwrap();

    let mut moved = basic_rule();
    moved.public_port = 443;
    moved.private_port = 443;
    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, moved),
    )
    .await
    .unwrap();

    let id_after = state.get(&rule_address()).unwrap().primary_id.unwrap();
    assert_ne!(id_before, id_after);
    assert!(cloud.get_load_balancer_rule(id_before).await.unwrap().is_none());
    assert_eq!(cloud.rule_count().await, 1);
}

/// Story: adding a member issues exactly one assign call
#[tokio::test]
async fn story_member_addition_is_incremental() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, basic_rule()),
    )
    .await
    .unwrap();
    let id = state.get(&rule_address()).unwrap().primary_id.unwrap();
    let mutations = cloud.mutation_count().await;

    let mut grown = basic_rule();
    grown.members.insert(
        0,
        windlass::config::Ref::id_of(windlass::state::Address::new(
            windlass::state::ResourceKind::Instance,
            "foobar2",
        )),
    );
    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, grown),
    )
    .await
    .unwrap();

    assert_eq!(cloud.mutation_count().await, mutations + 1);
    let members: HashSet<_> = cloud
        .list_load_balancer_rule_members(id)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(members.len(), 2);
}

/// Story: reordering members is not a change
#[tokio::test]
async fn story_member_reorder_is_noop() {
    init_tracing();
    let cloud = SandboxCloud::new();
    let params = ScenarioParams::from_env();
    let mut state = State::new();

    let mut two_members = basic_rule();
    two_members.members.push(windlass::config::Ref::id_of(
        windlass::state::Address::new(windlass::state::ResourceKind::Instance, "foobar2"),
    ));
    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, two_members.clone()),
    )
    .await
    .unwrap();
    let mutations = cloud.mutation_count().await;

    two_members.members.reverse();
    apply(
        &cloud,
        &mut state,
        &basic_configuration_with_rule(&params, two_members),
    )
    .await
    .unwrap();

    assert_eq!(cloud.mutation_count().await, mutations);
}

/// Story: convergence survives slow provisioning
///
/// With the sandbox holding new rules in `Creating` for a few polls, the
/// apply must block until the rule is active instead of assigning members
/// against a half-provisioned rule.
#[tokio::test]
async fn story_apply_blocks_until_rule_is_active() {
    init_tracing();
    let cloud = SandboxCloud::with_provisioning_delay(2);
    let params = ScenarioParams::from_env();

    let scenario = Scenario::new().step(
        basic_configuration(&params),
        vec![Check::exists(rule_address())],
    );

    scenario.run(&cloud).await.unwrap();
    assert_eq!(cloud.object_count().await, 0);
}
