//! Builds the validity record of every resource from a resolution's
//! outcomes.

use ingress_controller_core::{
    validity::{Condition, Outcomes, Reason, Severity, ValidityRecord, ValidityState},
    ResourceId,
};
use std::collections::BTreeMap;

/// Computes a record for every resource that the resolution observed.
///
/// Findings are attached to their subject. An error below a delegation also
/// warns every resource on the path that reached it, so that the owner of a
/// root learns why part of its tree is not programmed without the root
/// itself becoming invalid.
pub fn build(outcomes: &Outcomes) -> BTreeMap<ResourceId, ValidityRecord> {
    let mut conditions = outcomes
        .generations
        .keys()
        .map(|id| (id, Vec::<Condition>::new()))
        .collect::<BTreeMap<_, _>>();

    for finding in &outcomes.findings {
        if let Some(entries) = conditions.get_mut(&finding.subject) {
            push_unique(entries, finding.condition.clone());
        }
    }

    for finding in &outcomes.findings {
        if finding.condition.severity != Severity::Error {
            continue;
        }
        for ancestor in &finding.path {
            if *ancestor == finding.subject {
                continue;
            }
            if let Some(entries) = conditions.get_mut(ancestor) {
                let detail = format!(
                    "{} was rejected with {}: {}",
                    finding.subject, finding.condition.reason, finding.condition.detail
                );
                push_unique(entries, Condition::warning(Reason::DescendantRejected, detail));
            }
        }
    }

    conditions
        .into_iter()
        .map(|(id, mut conditions)| {
            let state = if outcomes.is_orphaned(id) {
                ValidityState::Orphaned
            } else if conditions.iter().any(|c| c.severity == Severity::Error) {
                ValidityState::Invalid
            } else {
                ValidityState::Valid
            };
            if conditions.is_empty() {
                conditions.push(Condition::info(Reason::Accepted, "accepted"));
            }
            let record = ValidityRecord {
                state,
                conditions,
                observed_generation: outcomes.generations[id],
            };
            (id.clone(), record)
        })
        .collect()
}

fn push_unique(entries: &mut Vec<Condition>, condition: Condition) {
    if !entries.contains(&condition) {
        entries.push(condition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn outcomes(ids: &[&ResourceId]) -> Outcomes {
        Outcomes {
            generations: ids.iter().map(|id| ((*id).clone(), 1)).collect(),
            reachable: ids
                .iter()
                .filter(|id| id.name != "orphan")
                .map(|id| (*id).clone())
                .collect(),
            findings: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn clean_resources_are_accepted() {
        let root = ResourceId::virtual_host("ns", "root");
        let records = build(&outcomes(&[&root]));
        assert_eq!(
            records,
            btreemap! {
                root => ValidityRecord {
                    state: ValidityState::Valid,
                    conditions: vec![Condition::info(Reason::Accepted, "accepted")],
                    observed_generation: 1,
                },
            }
        );
    }

    #[test]
    fn descendant_errors_warn_ancestors() {
        let root = ResourceId::virtual_host("ns", "root");
        let mid = ResourceId::fragment("ns", "mid");
        let leaf = ResourceId::fragment("ns", "leaf");
        let mut outcomes = outcomes(&[&root, &mid, &leaf]);
        outcomes.error(
            &leaf,
            Reason::ConstraintViolation,
            "/other is not within /team-a",
            &[root.clone(), mid.clone()],
        );

        let records = build(&outcomes);
        assert_eq!(records[&leaf].state, ValidityState::Invalid);
        assert_eq!(
            records[&leaf].conditions,
            vec![Condition::error(
                Reason::ConstraintViolation,
                "/other is not within /team-a"
            )]
        );

        let warning = Condition::warning(
            Reason::DescendantRejected,
            "RouteFragment ns/leaf was rejected with ConstraintViolation: /other is not within /team-a",
        );
        for ancestor in [&root, &mid] {
            assert_eq!(records[ancestor].state, ValidityState::Valid);
            assert_eq!(records[ancestor].conditions, vec![warning.clone()]);
        }
    }

    #[test]
    fn repeated_findings_are_collapsed() {
        let root = ResourceId::virtual_host("ns", "root");
        let leaf = ResourceId::fragment("ns", "leaf");
        let mut outcomes = outcomes(&[&root, &leaf]);
        for _ in 0..2 {
            outcomes.error(&leaf, Reason::DelegationCycle, "loop", &[root.clone()]);
        }

        let records = build(&outcomes);
        assert_eq!(records[&leaf].conditions.len(), 1);
        assert_eq!(records[&root].conditions.len(), 1);
    }

    #[test]
    fn orphans_are_reported_on_themselves_only() {
        let root = ResourceId::virtual_host("ns", "root");
        let orphan = ResourceId::fragment("ns", "orphan");
        let mut outcomes = outcomes(&[&root, &orphan]);
        outcomes.record(
            &orphan,
            Condition::info(Reason::Orphaned, "nothing delegates to this fragment"),
            &[],
        );

        let records = build(&outcomes);
        assert_eq!(records[&orphan].state, ValidityState::Orphaned);
        assert_eq!(records[&orphan].conditions[0].reason, Reason::Orphaned);
        assert_eq!(records[&root].state, ValidityState::Valid);
        assert_eq!(records[&root].conditions[0].reason, Reason::Accepted);
    }

    #[test]
    fn findings_for_deleted_resources_are_ignored() {
        let root = ResourceId::virtual_host("ns", "root");
        let mut outcomes = outcomes(&[&root]);
        outcomes.warning(
            &ResourceId::listener("ns", "gone"),
            Reason::HostnameMismatch,
            "gone",
        );
        assert_eq!(build(&outcomes).len(), 1);
    }
}
