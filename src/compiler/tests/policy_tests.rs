use crate::compiler::{CompileError, CompilePolicy, TimingTable};

#[test]
fn test_default_table() {
    let table = TimingTable::default();

    assert_eq!(table.timeout_for(2), 50);
    assert_eq!(table.timeout_for(3), 75);
    assert_eq!(table.timeout_for(4), 100);
    assert_eq!(table.timeout_for(5), 125);
    assert_eq!(table.timeout_for(9), 125);
    assert!(table.validate().is_ok());
}

#[test]
fn test_small_counts_use_two_key_window() {
    let table = TimingTable::default();
    assert_eq!(table.timeout_for(1), 50);
    assert_eq!(table.timeout_for(0), 50);
}

#[test]
fn test_flat_table_is_monotone() {
    assert!(TimingTable::new(80, 80, 80, 80).validate().is_ok());
}

#[test]
fn test_decrease_at_five_keys() {
    assert_eq!(
        TimingTable::new(50, 75, 100, 90).validate(),
        Err(CompileError::NonMonotoneTiming {
            key_count: 5,
            previous: 100,
            next: 90,
        })
    );
}

#[test]
fn test_zero_reported_before_ordering() {
    assert_eq!(
        TimingTable::new(50, 75, 0, 125).validate(),
        Err(CompileError::ZeroTimeout { key_count: 4 })
    );
}

#[test]
fn test_partial_toml_uses_defaults() {
    let table: TimingTable = toml::from_str("three_keys = 90").unwrap();

    assert_eq!(table.two_keys, 50);
    assert_eq!(table.three_keys, 90);
    assert_eq!(table.five_plus_keys, 125);
}

#[test]
fn test_disabled_lookup() {
    let policy = CompilePolicy::default().with_disabled(["Code"]);

    assert!(policy.is_disabled(Some("Code")));
    assert!(!policy.is_disabled(Some("code")), "Category names are case-sensitive");
    assert!(!policy.is_disabled(None));
}
