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

//! src/core/parser.rs
//!
//! Text formats accepted from the command line and from files
//!
//! This module parses:
//! - Key specs: `a+s+d`, `a s d`, `a,s,d` or compact `asd`
//! - Key sequences: `cmd+c cmd+v`
//! - Batch files: one `keys,output` pair per line, `#` comments
//! - Listener event lines: `down a`, `up a`, `+a`, `-a`
//!
//! # Architecture
//! Each format is a small nom combinator. The parsers only structure text;
//! vocabulary checks happen afterwards in `KeySet::new` and `KeyStroke::new`
//! so every entry point reports the same `ValidationError`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
};
use nom::{
    character::complete::{char, space0, space1},
    combinator::{map, rest, value},
};
use nom::{multi::separated_list1, sequence::preceded, IResult, Parser};
use thiserror::Error;

use crate::core::types::{KeyEventKind, KeyStroke};
use crate::core::validator::{self, ValidationError};

/// Parse errors with line number context
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Parse error on line {line}: {message}")]
    InvalidSyntax { line: usize, message: String },

    #[error("Cannot parse '{input}': {message}")]
    Malformed { input: String, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One `keys,output` entry from a batch file
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    /// Source line (1-based) for error messages
    pub line: usize,
    pub keys: Vec<String>,
    pub output: String,
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn key_separator(input: &str) -> IResult<&str, ()> {
    alt((
        value((), (space0, alt((char('+'), char(','))), space0)),
        value((), space1),
    ))
    .parse(input)
}

fn key_tokens(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(key_separator, take_while1(is_key_char)).parse(input)
}

/// Splits a key spec into raw key names
///
/// A single token that is not itself a key name (`asd`) is read as one key
/// per character, so `asd` and `a+s+d` are equivalent while `space+a` and
/// `esc+q` keep their multi-letter keys.
///
/// # Example
/// ```ignore
/// assert_eq!(parse_key_spec("a + s")?, vec!["a", "s"]);
/// assert_eq!(parse_key_spec("the")?, vec!["t", "h", "e"]);
/// ```
pub fn parse_key_spec(input: &str) -> Result<Vec<String>, ParseError> {
    let trimmed = input.trim();

    let tokens = match key_tokens(trimmed) {
        Ok(("", tokens)) => tokens,
        Ok((remaining, _)) => {
            return Err(ParseError::Malformed {
                input: trimmed.to_string(),
                message: format!("unexpected '{}'", remaining),
            })
        }
        Err(e) => {
            return Err(ParseError::Malformed {
                input: trimmed.to_string(),
                message: format!("{:?}", e),
            })
        }
    };

    if let [single] = tokens.as_slice() {
        if validator::normalize_key(single).is_err() {
            return Ok(single.chars().map(|c| c.to_string()).collect());
        }
    }

    Ok(tokens.into_iter().map(str::to_string).collect())
}

/// Parse one stroke: zero or more `modifier+` prefixes and a final key
fn parse_stroke(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char('+'), take_while1(is_key_char)).parse(input)
}

fn key_strokes(input: &str) -> IResult<&str, Vec<Vec<&str>>> {
    separated_list1(space1, parse_stroke).parse(input)
}

/// Parses a whitespace-separated list of key strokes
///
/// `cmd+shift+z` is `z` with `cmd` and `shift` held.
pub fn parse_key_sequence(input: &str) -> Result<Vec<KeyStroke>, ParseError> {
    let trimmed = input.trim();

    let (remaining, parts) = key_strokes(trimmed).map_err(|e| ParseError::Malformed {
        input: trimmed.to_string(),
        message: format!("{:?}", e),
    })?;

    if !remaining.is_empty() {
        return Err(ParseError::Malformed {
            input: trimmed.to_string(),
            message: format!("unexpected '{}'", remaining),
        });
    }

    parts
        .into_iter()
        .map(|names| {
            let (key, modifiers) = names
                .split_last()
                .ok_or_else(|| ParseError::Malformed {
                    input: trimmed.to_string(),
                    message: "empty key stroke".to_string(),
                })?;
            Ok(KeyStroke::new(key, modifiers)?)
        })
        .collect()
}

/// Parse a single batch line
///
/// Format: KEYS , OUTPUT
/// Everything after the first comma is the output, so outputs may contain
/// commas themselves.
pub fn parse_batch_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, keys) = take_until(",")(input)?;
    let (input, _) = (char(','), space0).parse(input)?;
    let (input, output) = rest(input)?;

    Ok((input, (keys.trim(), output.trim())))
}

/// Parse a complete batch file
///
/// Empty lines and `#` comments are skipped. The first malformed line
/// aborts the whole batch with its line number.
pub fn parse_batch_file(content: &str) -> Result<Vec<BatchEntry>, ParseError> {
    let mut entries = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line_num = line_num + 1;

        let line_trimmed = line.trim();
        if line_trimmed.is_empty() || line_trimmed.starts_with('#') {
            continue;
        }

        let (keys, output) = match parse_batch_line(line_trimmed) {
            Ok((_, pair)) => pair,
            Err(e) => {
                return Err(ParseError::InvalidSyntax {
                    line: line_num,
                    message: format!("expected 'keys,output': {:?}", e),
                });
            }
        };

        if output.is_empty() {
            return Err(ParseError::InvalidSyntax {
                line: line_num,
                message: "missing output".to_string(),
            });
        }

        let keys = parse_key_spec(keys).map_err(|e| ParseError::InvalidSyntax {
            line: line_num,
            message: e.to_string(),
        })?;

        entries.push(BatchEntry {
            line: line_num,
            keys,
            output: output.to_string(),
        });
    }

    Ok(entries)
}

fn parse_event_kind(input: &str) -> IResult<&str, KeyEventKind> {
    alt((
        map(
            (alt((tag("down"), tag("press"))), space1),
            |_| KeyEventKind::Press,
        ),
        map(
            (alt((tag("up"), tag("release"))), space1),
            |_| KeyEventKind::Release,
        ),
        value(KeyEventKind::Press, char('+')),
        value(KeyEventKind::Release, char('-')),
    ))
    .parse(input)
}

/// Parse one listener event line
///
/// Accepts `down KEY`, `press KEY`, `up KEY`, `release KEY`, `+KEY` and
/// `-KEY`. The key name is returned raw; the capture session decides what
/// to do with keys outside the vocabulary.
pub fn parse_event_line(input: &str) -> IResult<&str, (KeyEventKind, &str)> {
    let (input, kind) = preceded(space0, parse_event_kind).parse(input)?;
    let (input, key) = take_while1(is_key_char)(input)?;
    let (input, _) = space0(input)?;

    Ok((input, (kind, key)))
}
