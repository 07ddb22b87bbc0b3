//! Property-based tests for the moniker grammar.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use moniker_core::Moniker;
use moniker_core::path::{ancestor_paths, is_direct_child, parent_path};
use proptest::prelude::*;

/// Generates a valid token that is never the reserved `ALL` literal.
fn arb_token() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9_-]{0,12}".prop_filter("reserved literal", |s| {
        !s.eq_ignore_ascii_case("all")
    })
}

/// Generates (base tokens, filter segments) with at least one separator.
fn arb_parts() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    (
        prop::collection::vec(arb_token(), 1..4),
        prop::collection::vec(arb_token(), 0..4),
    )
        .prop_filter("needs a separator", |(base, segments)| {
            base.len() + segments.len() >= 2
        })
}

fn join(base: &[String], segments: &[String]) -> String {
    let mut path = base.join(".");
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    path
}

proptest! {
    #[test]
    fn prop_path_roundtrips((base, segments) in arb_parts()) {
        let raw = join(&base, &segments);
        let parsed = Moniker::parse(&raw).expect("valid path");
        prop_assert_eq!(parsed.base(), base.as_slice());
        prop_assert_eq!(parsed.segments(), segments.as_slice());
        prop_assert_eq!(parsed.path(), raw);
    }

    #[test]
    fn prop_display_reparses((base, segments) in arb_parts(), version in "[a-zA-Z0-9]{1,8}") {
        let raw = format!("moniker://{}@{version}", join(&base, &segments));
        let parsed = Moniker::parse(&raw).expect("valid moniker");
        let reparsed = Moniker::parse(&parsed.to_string()).expect("canonical form parses");
        prop_assert_eq!(reparsed, parsed);
    }

    #[test]
    fn prop_doubled_separator_rejected((base, segments) in arb_parts()) {
        let raw = format!("{}//x", join(&base, &segments));
        prop_assert!(Moniker::parse(&raw).is_err());
    }

    #[test]
    fn prop_parent_is_direct((base, segments) in arb_parts()) {
        let raw = join(&base, &segments);
        let parent = parent_path(&raw).expect("has a separator");
        prop_assert!(is_direct_child(parent, &raw));
        prop_assert_eq!(ancestor_paths(&raw).len(), base.len() + segments.len() - 1);
    }
}
