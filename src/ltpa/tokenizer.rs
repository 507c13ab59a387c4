// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Escaped-field tokenizer
//!
//! Encodes an attribute multimap into the delimited text form that is signed
//! and carried inside the encrypted token, and parses it back.
//!
//! ```text
//! key:value1|value2$key2:value$...%<expiration>%<base64 signature>
//! ```
//!
//! The parser keeps two quirks of the deployed format on purpose:
//!
//! * a `\` followed by anything other than a reserved character or `\` is a
//!   literal backslash, not an escape;
//! * a delimiter counts as escaped whenever the single character before it is
//!   `\`, no matter how many backslashes precede it.

use indexmap::IndexMap;

use crate::error::{LtpaError, Result};
use crate::ltpa::user_data::UNIQUE_ID_KEY;

/// Separates attributes inside the user data segment
pub const USER_DATA_DELIM: char = '$';
/// Separates an attribute name from its values
pub const USER_ATTRIB_DELIM: char = ':';
/// Separates the top-level token fields
pub const TOKEN_DELIM: char = '%';
/// Separates the values of a multi-valued attribute
pub const STRING_ATTRIB_DELIM: char = '|';
pub const ESCAPE_CHAR: char = '\\';

fn is_reserved(c: char) -> bool {
    matches!(
        c,
        TOKEN_DELIM | USER_DATA_DELIM | USER_ATTRIB_DELIM | STRING_ATTRIB_DELIM
    )
}

/// Escape a single name or value
///
/// Reserved characters get a `\` prefix. A backslash is doubled when it ends
/// the string or when the next character is a backslash or a reserved
/// character, so that [`unescape`] always restores the input.
pub fn escape(value: &str) -> String {
    if !value.chars().any(|c| c == ESCAPE_CHAR || is_reserved(c)) {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len() + 8);
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if is_reserved(c) {
            out.push(ESCAPE_CHAR);
            out.push(c);
        } else if c == ESCAPE_CHAR {
            out.push(ESCAPE_CHAR);
            match chars.peek() {
                None => out.push(ESCAPE_CHAR),
                Some(&next) if next == ESCAPE_CHAR || is_reserved(next) => out.push(ESCAPE_CHAR),
                Some(_) => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`escape`], also accepting strings produced by older encoders
pub fn unescape(value: &str) -> String {
    if !value.contains(ESCAPE_CHAR) {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESCAPE_CHAR {
            if let Some(&next) = chars.peek() {
                if next == ESCAPE_CHAR || is_reserved(next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn is_unescaped_at(bytes: &[u8], index: usize) -> bool {
    index == 0 || bytes[index - 1] != ESCAPE_CHAR as u8
}

fn find_unescaped(s: &str, delim: char) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len()).find(|&i| bytes[i] == delim as u8 && is_unescaped_at(bytes, i))
}

fn rfind_unescaped(s: &str, delim: char) -> Option<usize> {
    let bytes = s.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == delim as u8 && is_unescaped_at(bytes, i))
}

fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] == delim as u8 && is_unescaped_at(bytes, i) {
            parts.push(&s[start..i]);
            start = i + 1;
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Encode attributes in iteration order as `key:v1|v2$key2:v`
pub fn encode_attributes<'a, I>(attributes: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut out = String::new();
    for (key, values) in attributes {
        out.push_str(&escape(key));
        out.push(USER_ATTRIB_DELIM);
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push(STRING_ATTRIB_DELIM);
            }
            out.push_str(&escape(value));
        }
        out.push(USER_DATA_DELIM);
    }
    out.pop();
    out
}

/// Parse the user data segment of a decrypted token
///
/// The unique id attribute is never split on `|`. A name that appears in
/// several segments accumulates its values.
pub fn parse_user_data(segment: &str) -> Result<IndexMap<String, Vec<String>>> {
    let mut attributes: IndexMap<String, Vec<String>> = IndexMap::new();

    for entry in split_unescaped(segment, USER_DATA_DELIM) {
        if entry.is_empty() {
            continue;
        }
        let split = find_unescaped(entry, USER_ATTRIB_DELIM)
            .ok_or_else(|| LtpaError::invalid("malformed user data attribute"))?;
        let key = unescape(&entry[..split]);
        let raw_values = &entry[split + 1..];

        let values: Vec<String> = if key == UNIQUE_ID_KEY {
            vec![unescape(raw_values)]
        } else {
            split_unescaped(raw_values, STRING_ATTRIB_DELIM)
                .into_iter()
                .map(unescape)
                .collect()
        };
        attributes.entry(key).or_default().extend(values);
    }

    Ok(attributes)
}

/// Top-level fields of a decrypted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenFields<'a> {
    pub user_data: &'a str,
    /// Absent for the two-field layout, where the expiration is only signed
    pub expiration: Option<&'a str>,
    pub signature: &'a str,
}

/// Split decrypted plaintext into user data, optional expiration and signature
///
/// Scans from the end, so escaped `%` characters inside the user data never
/// shift the trailing fields.
pub fn split_token(plaintext: &str) -> Result<TokenFields<'_>> {
    let last = rfind_unescaped(plaintext, TOKEN_DELIM)
        .ok_or_else(|| LtpaError::invalid("token field delimiter not found"))?;
    let signature = &plaintext[last + 1..];
    let head = &plaintext[..last];

    Ok(match rfind_unescaped(head, TOKEN_DELIM) {
        Some(previous) => TokenFields {
            user_data: &head[..previous],
            expiration: Some(&head[previous + 1..]),
            signature,
        },
        None => TokenFields {
            user_data: head,
            expiration: None,
            signature,
        },
    })
}

/// Map each character to one byte by keeping its low eight bits
pub fn simple_encode(s: &str) -> Vec<u8> {
    s.chars().map(|c| (c as u32 & 0xff) as u8).collect()
}
