//! Property tests for run file names.
//!
//! Whatever the platform / machine / storage strings contain, encoding them into a file
//! name and decoding the name must give back exactly the same run metadata.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use storagegraph_model::{RunFileName, StreamKind};

// ============================================================================
// Strategies
// ============================================================================

/// Arbitrary text, including the separators the file name grammar uses.
fn field_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_]{0,12}",
        "[-=./ %:A-Za-z]{0,16}",
        any::<String>(),
    ]
}

fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    // 1970-01-01 .. 9999-12-31
    (0i64..253_402_300_799, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
    })
}

fn kind_strategy() -> impl Strategy<Value = StreamKind> {
    prop_oneof![Just(StreamKind::Objects), Just(StreamKind::Relationships)]
}

// ============================================================================
// Round trip
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn run_metadata_round_trips_through_file_name(
        prefix in field_strategy(),
        platform in field_strategy(),
        ingester in field_strategy(),
        machine in field_strategy(),
        storage in proptest::option::of(field_strategy()),
        timestamp in timestamp_strategy(),
        kind in kind_strategy(),
    ) {
        let name = RunFileName::new(platform, ingester, machine, storage, timestamp)
            .with_prefix(prefix)
            .with_kind(kind);

        let encoded = name.encode().unwrap();
        prop_assert!(encoded.ends_with(".jsonl"));
        prop_assert_eq!(encoded.matches('.').count(), 1);

        let decoded = RunFileName::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, name);
    }

    #[test]
    fn paired_names_differ_only_by_kind(
        platform in field_strategy(),
        machine in field_strategy(),
        timestamp in timestamp_strategy(),
    ) {
        let objects = RunFileName::new(platform, "svc", machine, None, timestamp);
        let relationships = objects.paired();

        let a = objects.encode().unwrap();
        let b = relationships.encode().unwrap();
        prop_assert!(a.ends_with("-kind=objects.jsonl"));
        prop_assert!(b.ends_with("-kind=relationships.jsonl"));
        prop_assert_eq!(
            a.trim_end_matches("objects.jsonl"),
            b.trim_end_matches("relationships.jsonl")
        );
    }
}
