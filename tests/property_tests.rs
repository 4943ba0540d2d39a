//! Property-based tests for row extraction using proptest

use chrono::{DateTime, Utc};
use kin::core::value::format_timestamp;
use kin::prelude::*;
use proptest::prelude::*;

fn row(column: &str, raw: &[u8]) -> RowExtractor {
    RowExtractor::new(vec![column.to_string()], vec![DatabaseValue::Bytes(raw.to_vec())])
}

// ============================================================================
// Scalar Extraction
// ============================================================================

proptest! {
    /// Any base-10 integer text extracts to the same value
    #[test]
    fn test_int_text_extracts(value in any::<i64>()) {
        let mut r = row("n", value.to_string().as_bytes());
        prop_assert_eq!(r.extract_int("n"), value);
        prop_assert!(r.err().is_none());
    }

    /// Finite floats survive their text rendering
    #[test]
    fn test_decimal_text_extracts(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        let mut r = row("d", value.to_string().as_bytes());
        prop_assert_eq!(r.extract_decimal("d"), value);
        prop_assert!(r.err().is_none());
    }

    /// Every accepted boolean spelling parses
    #[test]
    fn test_bool_spellings(
        (text, expected) in prop::sample::select(vec![
            ("1", true), ("t", true), ("T", true), ("TRUE", true), ("true", true), ("True", true),
            ("0", false), ("f", false), ("F", false), ("FALSE", false), ("false", false), ("False", false),
        ])
    ) {
        let mut r = row("b", text.as_bytes());
        prop_assert_eq!(r.extract_bool("b"), expected);
        prop_assert!(r.err().is_none());
    }

    /// Text that is not a boolean poisons the row
    #[test]
    fn test_bool_rejects_other_text(text in "[a-z]{2,8}".prop_filter("not a bool", |s| s != "true" && s != "false")) {
        let mut r = row("b", text.as_bytes());
        prop_assert!(!r.extract_bool("b"));
        let is_parse_error = matches!(r.err(), Some(DatabaseError::Parse { .. }));
        prop_assert!(is_parse_error);
    }

    /// Timestamps rendered in the storage format parse back to the same instant
    #[test]
    fn test_timestamp_text_extracts(micros in 0i64..4_102_444_800_000_000) {
        let ts = DateTime::<Utc>::from_timestamp_micros(micros).unwrap();
        let mut r = row("t", format_timestamp(&ts).as_bytes());
        prop_assert_eq!(r.extract_time("t"), ts);
        prop_assert!(r.err().is_none());
    }

    /// Once poisoned, every later extraction yields the zero value
    #[test]
    fn test_error_is_sticky(value in any::<i64>()) {
        let mut r = RowExtractor::new(
            vec!["bad".to_string(), "good".to_string()],
            vec![
                DatabaseValue::Bytes(b"not a number".to_vec()),
                DatabaseValue::Bytes(value.to_string().into_bytes()),
            ],
        );
        prop_assert_eq!(r.extract_int("bad"), 0);
        prop_assert_eq!(r.extract_int("good"), 0);
        prop_assert_eq!(r.extract_string("good"), "");
        prop_assert_eq!(r.extract_time("good"), DateTime::<Utc>::default());
        let first_error_kept = matches!(r.err(), Some(DatabaseError::Parse { column, .. }) if column == "bad");
        prop_assert!(first_error_kept);
    }
}

// ============================================================================
// Driver Round Trips
// ============================================================================

#[cfg(feature = "sqlite")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Strings bound as parameters come back unchanged
    #[test]
    fn test_string_param_round_trip(text in "\\PC*") {
        let fetched: Result<String> = tokio_test::block_on(async {
            let db = SqliteDatabase::new();
            db.connect(":memory:").await?;
            db.query("SELECT $1 AS v", vec![text.as_str().into()])
                .one_and_extract_fn(|mut row| {
                    let v = row.extract_string("v");
                    row.finish().map(|_| v)
                })
                .await
        });
        prop_assert_eq!(fetched.unwrap(), text);
    }

    /// Integers bound as parameters come back unchanged
    #[test]
    fn test_int_param_round_trip(value in any::<i64>()) {
        let fetched: Result<i64> = tokio_test::block_on(async {
            let db = SqliteDatabase::new();
            db.connect(":memory:").await?;
            let mut row = db.query("SELECT $1 AS v", vec![value.into()]).one().await?;
            let v = row.extract_int("v");
            row.finish().map(|_| v)
        });
        prop_assert_eq!(fetched.unwrap(), value);
    }
}
