// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parser module tests
//!
//! Tests for the text formats:
//! - Key specs in every separator style
//! - Key sequences with modifiers
//! - Batch file parsing with comments and line numbers
//! - Listener event lines

use crate::core::{
    parser::*,
    types::{KeyEventKind, KeyStroke},
    validator::ValidationError,
};

#[test]
fn test_parse_key_spec_separators() {
    let expected = vec!["a", "s", "d"];

    assert_eq!(parse_key_spec("a+s+d").unwrap(), expected);
    assert_eq!(parse_key_spec("a + s + d").unwrap(), expected);
    assert_eq!(parse_key_spec("a,s,d").unwrap(), expected);
    assert_eq!(parse_key_spec("a s d").unwrap(), expected);
    assert_eq!(parse_key_spec("  a+s+d  ").unwrap(), expected);
}

#[test]
fn test_parse_key_spec_compact() {
    assert_eq!(parse_key_spec("asd").unwrap(), vec!["a", "s", "d"]);
}

#[test]
fn test_parse_key_spec_keeps_named_keys() {
    // A single named key is not split into letters
    assert_eq!(parse_key_spec("space").unwrap(), vec!["space"]);
    assert_eq!(parse_key_spec("esc+q").unwrap(), vec!["esc", "q"]);
    assert_eq!(parse_key_spec("cmd+shift+a").unwrap(), vec!["cmd", "shift", "a"]);
}

#[test]
fn test_parse_key_spec_rejects_garbage() {
    assert!(parse_key_spec("").is_err());
    assert!(parse_key_spec("a+").is_err());
    assert!(parse_key_spec("a;s").is_err());
}

#[test]
fn test_parse_key_sequence() {
    let strokes = parse_key_sequence("cmd+c  cmd+v").unwrap();

    assert_eq!(
        strokes,
        vec![
            KeyStroke::new("c", &["cmd"]).unwrap(),
            KeyStroke::new("v", &["cmd"]).unwrap(),
        ]
    );
}

#[test]
fn test_parse_key_sequence_plain_keys() {
    let strokes = parse_key_sequence("left left return").unwrap();
    assert_eq!(strokes.len(), 3);
    assert!(strokes.iter().all(|s| s.modifiers.is_empty()));
}

#[test]
fn test_parse_key_sequence_validates() {
    assert_eq!(
        parse_key_sequence("cmd+nope"),
        Err(ParseError::Validation(ValidationError::InvalidKey("nope".to_string())))
    );
}

#[test]
fn test_parse_batch_line() {
    let (_, (keys, output)) = parse_batch_line("t+h+e , the").unwrap();
    assert_eq!(keys, "t+h+e");
    assert_eq!(output, "the");
}

#[test]
fn test_parse_batch_line_output_keeps_commas() {
    let (_, (keys, output)) = parse_batch_line("b+t+w,by the way, obviously").unwrap();
    assert_eq!(keys, "b+t+w");
    assert_eq!(output, "by the way, obviously");
}

#[test]
fn test_parse_batch_file() {
    let content = "\
# common words
the,the

a+n+d, and
ty,thank you
";

    let entries = parse_batch_file(content).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].keys, vec!["t", "h", "e"]);
    assert_eq!(entries[1].line, 4);
    assert_eq!(entries[2].output, "thank you");
}

#[test]
fn test_parse_batch_file_reports_line() {
    let content = "the,the\nno comma here\n";

    match parse_batch_file(content) {
        Err(ParseError::InvalidSyntax { line, .. }) => assert_eq!(line, 2),
        other => panic!("Expected InvalidSyntax on line 2, got {:?}", other),
    }
}

#[test]
fn test_parse_event_line_forms() {
    assert_eq!(parse_event_line("down a").unwrap().1, (KeyEventKind::Press, "a"));
    assert_eq!(parse_event_line("press a").unwrap().1, (KeyEventKind::Press, "a"));
    assert_eq!(parse_event_line("up a").unwrap().1, (KeyEventKind::Release, "a"));
    assert_eq!(parse_event_line("+space").unwrap().1, (KeyEventKind::Press, "space"));
    assert_eq!(parse_event_line("-escape").unwrap().1, (KeyEventKind::Release, "escape"));
}

#[test]
fn test_parse_event_line_rejects_unknown_verb() {
    assert!(parse_event_line("hold a").is_err());
    assert!(parse_event_line("down").is_err());
}
