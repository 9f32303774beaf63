//! Target matching.
//!
//! Exact, case-sensitive equality on (namespace, deployment). Every covered
//! object has to be listed explicitly; an empty list covers nothing.

use crate::model::TargetRef;

/// Whether `(namespace, name)` appears in `targets`.
///
/// Entries with an empty namespace or deployment never match.
pub fn matches(targets: &[TargetRef], namespace: &str, name: &str) -> bool {
    targets.iter().any(|t| {
        if t.namespace.is_empty() || t.deployment.is_empty() {
            return false;
        }
        t.namespace == namespace && t.deployment == name
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_targets_match_nothing() {
        assert!(!matches(&[], "team-a", "api"));
    }

    #[test]
    fn exact_pair_required() {
        let t = vec![TargetRef::new("team-a", "api")];
        assert!(matches(&t, "team-a", "api"));
        assert!(!matches(&t, "team-a", "worker"));
        assert!(!matches(&t, "team-b", "api"));
        assert!(!matches(&t, "Team-A", "api"));
    }

    #[test]
    fn malformed_entries_never_match() {
        let t = vec![TargetRef::new("team-a", ""), TargetRef::new("", "api")];
        assert!(!matches(&t, "team-a", ""));
        assert!(!matches(&t, "", "api"));
    }

    #[test]
    fn duplicates_are_redundant() {
        let t = vec![TargetRef::new("team-a", "api"), TargetRef::new("team-a", "api")];
        assert!(matches(&t, "team-a", "api"));
    }

    fn ident() -> impl Strategy<Value = String> {
        "[a-cA-C]{1,3}"
    }

    proptest! {
        #[test]
        fn matches_iff_some_entry_equal(
            targets in prop::collection::vec((ident(), ident()), 0..6),
            ns in ident(),
            name in ident(),
        ) {
            let refs: Vec<TargetRef> = targets
                .iter()
                .map(|(n, d)| TargetRef::new(n.clone(), d.clone()))
                .collect();
            let expected = targets.iter().any(|(n, d)| *n == ns && *d == name);
            prop_assert_eq!(matches(&refs, &ns, &name), expected);
        }
    }
}
