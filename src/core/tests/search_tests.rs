use crate::core::parser::parse_key_spec;
use crate::core::search::SearchScope;
use crate::core::store::ChordStore;
use crate::core::types::OutputSpec;

fn store_with(entries: &[(&str, &str)]) -> ChordStore {
    let mut store = ChordStore::new();
    for (keys, output) in entries {
        let keys = parse_key_spec(keys).unwrap();
        store.add(keys, OutputSpec::text(*output), None).unwrap();
    }
    store
}

fn outputs(store: &ChordStore, query: &str, scope: SearchScope) -> Vec<String> {
    store
        .search(query, scope)
        .into_iter()
        .map(|c| c.output.value_text())
        .collect()
}

#[test]
fn test_input_exact_ranks_before_containment() {
    let store = store_with(&[
        ("a+s+d", "and"),
        ("a+s", "as"),
        ("q+w", "qw"),
    ]);

    let results = outputs(&store, "a+s", SearchScope::Input);

    assert_eq!(results, vec!["as", "and"]);
}

#[test]
fn test_input_query_any_order() {
    let store = store_with(&[("t+h+e", "the")]);

    assert_eq!(outputs(&store, "eht", SearchScope::Input), vec!["the"]);
}

#[test]
fn test_output_tiers() {
    let store = store_with(&[
        ("t+y", "thank you"),
        ("t+h", "thank"),
        ("t+k", "thnk"),
    ]);

    let results = outputs(&store, "thank", SearchScope::Output);

    // exact, then substring, then fuzzy ("thnk" vs "thank": one edit of five)
    assert_eq!(results, vec!["thank", "thank you", "thnk"]);
}

#[test]
fn test_output_search_case_insensitive() {
    let store = store_with(&[("g+h", "GitHub")]);

    assert_eq!(outputs(&store, "github", SearchScope::Output), vec!["GitHub"]);
}

#[test]
fn test_fuzzy_below_threshold_excluded() {
    let store = store_with(&[("x+z", "xylophone")]);

    assert!(outputs(&store, "banana", SearchScope::Output).is_empty());
}

#[test]
fn test_ties_broken_by_most_recently_modified() {
    let mut store = store_with(&[("a+b", "note one"), ("c+d", "note two")]);

    let first = store.all()[0].id;
    store.edit(&first, Some(OutputSpec::text("note one!")), None).unwrap();

    let results = outputs(&store, "note", SearchScope::Output);

    assert_eq!(results, vec!["note one!", "note two"]);
}

#[test]
fn test_both_scope_takes_best_tier() {
    let store = store_with(&[("a+s", "something"), ("q+w", "as")]);

    let results = outputs(&store, "as", SearchScope::Both);

    // Both are exact: one by keys, one by output
    assert_eq!(results.len(), 2);
}

#[test]
fn test_empty_query_matches_nothing() {
    let store = store_with(&[("a+s", "as")]);
    assert!(store.search("   ", SearchScope::Both).is_empty());
}
