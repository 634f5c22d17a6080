#[cfg(test)]
mod tests_impl {
    use proptest::prelude::*;

    use crate::api::ApiError;
    use crate::config::GroupSpec;
    use crate::core::assign::assign_groups;
    use crate::core::diff::diff;
    use crate::core::error::Error;
    use crate::core::normalize::assign_positions;
    use crate::core::plan::{Op, reconcile};
    use crate::core::rule::{Direction, Pos, Rule, Verdict};
    use crate::core::test_helpers::{ApiCall, MockApi, accept_in, web_rules};

    fn spec_with(rules: Vec<Rule>) -> GroupSpec {
        GroupSpec::new("websg").with_rules(rules)
    }

    // ------------------------------------------------------------------
    // Full-run scenarios
    // ------------------------------------------------------------------

    #[test]
    fn missing_group_is_created_with_every_rule() {
        let api = MockApi::new();
        let spec = spec_with(vec![accept_in("22")]).with_comment("bastion ssh");

        let outcome = reconcile(&api, &spec, false).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.plan, vec![Op::CreateGroup, Op::CreateRule(Pos(0))]);
        assert_eq!(outcome.applied, 2);
        assert_eq!(
            api.calls(),
            vec![
                ApiCall::ListGroups,
                ApiCall::CreateGroup("websg".to_string(), Some("bastion ssh".to_string())),
                ApiCall::CreateRule("websg".to_string(), {
                    let mut rule = accept_in("22");
                    rule.pos = Some(Pos(0));
                    rule.enable = Some(0);
                    rule
                }),
            ]
        );
        assert_eq!(api.rules_of("websg").len(), 1);
    }

    #[test]
    fn matching_group_reports_no_change_and_writes_nothing() {
        let api = MockApi::new().with_group_rules("websg", vec![accept_in("22")]);
        let spec = spec_with(vec![accept_in("22")]);

        let outcome = reconcile(&api, &spec, false).unwrap();

        assert!(!outcome.changed);
        assert!(outcome.plan.is_empty());
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn trailing_remote_rule_is_deleted() {
        let api =
            MockApi::new().with_group_rules("websg", vec![accept_in("22"), accept_in("80")]);
        let spec = spec_with(vec![accept_in("22")]);

        let outcome = reconcile(&api, &spec, false).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.plan, vec![Op::DeleteRule(Pos(1))]);
        let survivors = api.rules_of("websg");
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].dport.as_deref(), Some("22"));
    }

    #[test]
    fn dry_run_reports_drift_without_touching_the_remote_side() {
        let api = MockApi::new().with_group_rules("websg", vec![accept_in("22")]);
        let spec = spec_with(vec![accept_in("22"), accept_in("443")]);

        let outcome = reconcile(&api, &spec, true).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.plan, vec![Op::CreateRule(Pos(1))]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn dry_run_counts_group_creation_as_a_change() {
        let api = MockApi::new();
        let spec = spec_with(Vec::new());

        let outcome = reconcile(&api, &spec, true).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.plan, vec![Op::CreateGroup]);
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn invalid_rule_aborts_before_the_rule_fetch() {
        let api = MockApi::new().with_group_rules("websg", vec![accept_in("22")]);
        let mut incomplete = accept_in("443");
        incomplete.kind = None;
        let spec = spec_with(vec![accept_in("22"), incomplete]);

        let err = reconcile(&api, &spec, false).unwrap_err();

        assert!(
            matches!(err, Error::InvalidRuleSpec { pos: Pos(1), missing: "type" }),
            "unexpected error: {err}"
        );
        // the group listing is the only remote read that may have happened
        assert_eq!(api.calls(), vec![ApiCall::ListGroups]);
    }

    #[test]
    fn drifted_rule_is_replaced_in_place() {
        let api =
            MockApi::new().with_group_rules("websg", vec![accept_in("22"), accept_in("80")]);
        let spec = spec_with(vec![accept_in("22"), accept_in("80").with_comment("http")]);

        let outcome = reconcile(&api, &spec, false).unwrap();

        assert_eq!(outcome.plan, vec![Op::ReplaceRule(Pos(1))]);
        assert_eq!(
            api.rules_of("websg")[1].comment.as_deref(),
            Some("http")
        );
    }

    #[test]
    fn second_run_after_convergence_changes_nothing() {
        let api = MockApi::new().with_group_rules("websg", vec![accept_in("3128")]);
        let spec = spec_with(web_rules());

        let first = reconcile(&api, &spec, false).unwrap();
        assert!(first.changed);

        let second = reconcile(&api, &spec, false).unwrap();
        assert!(!second.changed, "converged state must reconcile to no-op");
        assert_eq!(second.applied, 0);
    }

    #[test]
    fn shrinking_ruleset_deletes_from_the_back() {
        let api = MockApi::new().with_group_rules(
            "websg",
            vec![
                accept_in("22"),
                accept_in("80"),
                accept_in("443"),
                accept_in("8080"),
            ],
        );
        let spec = spec_with(vec![accept_in("22"), accept_in("80")]);

        reconcile(&api, &spec, false).unwrap();

        let deletes: Vec<ApiCall> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::DeleteRule(..)))
            .collect();
        assert_eq!(
            deletes,
            vec![
                ApiCall::DeleteRule("websg".to_string(), Pos(3)),
                ApiCall::DeleteRule("websg".to_string(), Pos(2)),
            ]
        );
        assert_eq!(api.rules_of("websg").len(), 2);
    }

    #[test]
    fn mid_plan_failure_stops_and_reports_progress() {
        let api = MockApi::new().with_group_rules(
            "websg",
            vec![accept_in("22"), accept_in("80"), accept_in("443")],
        );
        // plan: replace pos 0, delete pos 2, delete pos 1 - fail the second op
        let spec = spec_with(vec![accept_in("2222")]);
        api.fail_mutation_at(1);

        let err = reconcile(&api, &spec, false).unwrap_err();

        match err {
            Error::RemoteOperationFailed {
                target,
                op,
                applied,
                remaining,
                ..
            } => {
                assert_eq!(target, "group `websg`");
                assert_eq!(op, Op::DeleteRule(Pos(2)));
                assert_eq!(applied, 1);
                assert_eq!(
                    remaining,
                    vec![Op::DeleteRule(Pos(2)), Op::DeleteRule(Pos(1))]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        // the replacement before the failure stays applied
        assert_eq!(api.rules_of("websg")[0].dport.as_deref(), Some("2222"));
        assert_eq!(api.rules_of("websg").len(), 3);
    }

    #[test]
    fn fetched_rule_without_digest_is_malformed() {
        let api = MockApi::new().with_raw_group_rules("websg", vec![accept_in("22")]);
        let spec = spec_with(vec![accept_in("22")]);

        let err = reconcile(&api, &spec, false).unwrap_err();
        assert!(matches!(err, Error::MalformedRemoteData { .. }));
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn listing_failure_surfaces_the_transport_error() {
        let api = MockApi::new();
        api.fail_listings();

        let err = reconcile(&api, &spec_with(Vec::new()), false).unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::Connection(_))));
    }

    #[test]
    fn bad_group_name_fails_before_any_remote_call() {
        let api = MockApi::new();
        let spec = GroupSpec::new("no spaces allowed");

        let err = reconcile(&api, &spec, false).unwrap_err();
        assert!(matches!(err, Error::InvalidGroupName { .. }));
        assert!(api.calls().is_empty());
    }

    // ------------------------------------------------------------------
    // Instance group assignment
    // ------------------------------------------------------------------

    #[test]
    fn assignment_attaches_missing_groups() {
        let api = MockApi::new().with_instance_rules(101, Vec::new());
        let desired = vec!["sshsg".to_string(), "websg".to_string()];

        let outcome = assign_groups(&api, "pve1", 101, &desired, false).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.applied, 2);
        let attached = api.instance_rules_of(101);
        assert_eq!(attached.len(), 2);
        assert!(attached.iter().all(Rule::is_group_ref));
        assert!(attached.iter().all(Rule::is_enabled));
    }

    #[test]
    fn assignment_removes_unlisted_groups_only() {
        let api = MockApi::new().with_instance_rules(
            101,
            vec![
                accept_in("8006").with_comment("management"),
                Rule::group_ref("sshsg").enabled(),
                Rule::group_ref("dbsg").enabled(),
            ],
        );
        let desired = vec!["sshsg".to_string()];

        let outcome = assign_groups(&api, "pve1", 101, &desired, false).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.plan, vec![Op::DeleteRule(Pos(2))]);
        let remaining = api.instance_rules_of(101);
        assert_eq!(remaining.len(), 2);
        // the instance's own rule is untouched
        assert_eq!(remaining[0].comment.as_deref(), Some("management"));
        assert_eq!(remaining[1].action.as_deref(), Some("sshsg"));
    }

    #[test]
    fn assignment_is_idempotent() {
        let api = MockApi::new()
            .with_instance_rules(101, vec![Rule::group_ref("sshsg").enabled()]);
        let desired = vec!["sshsg".to_string()];

        let outcome = assign_groups(&api, "pve1", 101, &desired, false).unwrap();
        assert!(!outcome.changed);
        assert_eq!(api.mutation_count(), 0);
    }

    #[test]
    fn assignment_dry_run_never_mutates() {
        let api = MockApi::new()
            .with_instance_rules(101, vec![Rule::group_ref("oldsg").enabled()]);
        let desired = vec!["newsg".to_string()];

        let outcome = assign_groups(&api, "pve1", 101, &desired, true).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.plan.len(), 2);
        assert_eq!(api.mutation_count(), 0);
    }

    // ------------------------------------------------------------------
    // Algebraic properties
    // ------------------------------------------------------------------

    fn arb_rule() -> impl Strategy<Value = Rule> {
        (
            prop_oneof![
                Just(Verdict::Accept),
                Just(Verdict::Drop),
                Just(Verdict::Reject)
            ],
            prop_oneof![Just(Direction::In), Just(Direction::Out)],
            proptest::option::of(1u16..=65535),
            proptest::option::of(0u8..=1),
            proptest::option::of("[a-z]{1,12}"),
        )
            .prop_map(|(verdict, direction, dport, enable, comment)| {
                let mut rule = Rule::new(verdict, direction);
                rule.dport = dport.map(|p| p.to_string());
                rule.enable = enable;
                rule.comment = comment;
                rule
            })
    }

    proptest! {
        #[test]
        fn positions_are_always_dense_and_ordered(rules in proptest::collection::vec(arb_rule(), 0..24)) {
            let normalized = assign_positions(rules);
            for (index, rule) in normalized.iter().enumerate() {
                prop_assert_eq!(rule.pos, Some(Pos::from_index(index)));
                prop_assert!(rule.enable.is_some());
            }
            let again = assign_positions(normalized.clone());
            prop_assert_eq!(again, normalized);
        }

        #[test]
        fn diff_is_reflexive(rules in proptest::collection::vec(arb_rule(), 0..24)) {
            let normalized = assign_positions(rules);
            prop_assert!(diff(&normalized, &normalized).is_empty());
        }

        #[test]
        fn diff_always_covers_the_length_gap(
            shorter in proptest::collection::vec(arb_rule(), 0..12),
            longer in proptest::collection::vec(arb_rule(), 12..24),
        ) {
            let shorter = assign_positions(shorter);
            let longer = assign_positions(longer);
            let result = diff(&shorter, &longer);
            for index in shorter.len()..longer.len() {
                prop_assert!(result.contains(Pos::from_index(index)));
            }
            // symmetric in which side is longer
            let mirrored = diff(&longer, &shorter);
            prop_assert_eq!(result.len(), mirrored.len());
        }
    }
}
