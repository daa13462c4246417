//! Unit tests for the visited-address `Entry` value type.

use rstest::rstest;
use visitlog::types::entry::{unix_now, Entry};

#[test]
fn new_entry_has_one_visit() {
    let entry = Entry::new("https://example.com", 42);
    assert_eq!(entry.address, "https://example.com");
    assert_eq!(entry.last_visited, 42);
    assert_eq!(entry.visit_count, 1);
}

#[test]
fn revisit_uses_wall_clock() {
    let mut entry = Entry::new("https://example.com", 0);
    let before = unix_now();
    entry.revisit();
    assert!(entry.last_visited >= before);
    assert_eq!(entry.visit_count, 2);
}

#[rstest]
#[case(1, 2)]
#[case(41, 42)]
#[case(u32::MAX - 1, u32::MAX)]
#[case(u32::MAX, u32::MAX)]
fn revisit_increments_saturating(#[case] start: u32, #[case] expected: u32) {
    let mut entry = Entry::new("a", 0);
    entry.visit_count = start;
    entry.revisit_at(10);
    assert_eq!(entry.visit_count, expected, "start count {start}");
}

#[test]
fn sort_key_orders_by_time_then_address() {
    let early_z = Entry::new("z", 1);
    let late_a = Entry::new("a", 2);
    let early_a = Entry::new("a", 1);
    assert!(early_a.sort_key() < early_z.sort_key());
    assert!(early_z.sort_key() < late_a.sort_key());
}

#[test]
fn deserializes_persisted_record() {
    let entry: Entry = serde_json::from_str(
        r#"{"address":"https://rust-lang.org","lastVisited":1700000000,"visitCount":9}"#,
    )
    .unwrap();
    assert_eq!(entry.address, "https://rust-lang.org");
    assert_eq!(entry.last_visited, 1_700_000_000);
    assert_eq!(entry.visit_count, 9);
}
