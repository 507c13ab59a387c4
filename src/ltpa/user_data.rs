// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Identity attributes carried by a token
//!
//! [`UserData`] is an insertion-ordered multimap. Its canonical string form is
//! what gets signed, so it is derived from the attribute names in sorted order
//! and memoized until the next mutation.

use std::cell::OnceCell;

use indexmap::IndexMap;

use crate::error::{LtpaError, Result};
use crate::ltpa::tokenizer;

/// Attribute holding the unique id (access id) of the identity
pub const UNIQUE_ID_KEY: &str = "u";

/// Attribute holding the signed expiration in epoch milliseconds
pub const EXPIRATION_KEY: &str = "expire";

/// Attribute multimap of a token identity
#[derive(Debug, Default)]
pub struct UserData {
    attributes: IndexMap<String, Vec<String>>,
    canonical: OnceCell<String>,
}

impl UserData {
    /// Create user data bound to `unique_id`
    pub fn new(unique_id: &str) -> Self {
        let mut user_data = Self::default();
        user_data.add_attribute(UNIQUE_ID_KEY, unique_id);
        user_data
    }

    /// Rebuild user data from the user data segment of a decrypted token
    pub fn parse(segment: &str) -> Result<Self> {
        let attributes = tokenizer::parse_user_data(segment)?;
        match attributes.get(UNIQUE_ID_KEY) {
            Some(values) if values.first().is_some_and(|v| !v.is_empty()) => {}
            _ => return Err(LtpaError::invalid("token carries no unique id")),
        }
        Ok(Self {
            attributes,
            canonical: OnceCell::new(),
        })
    }

    /// Append `value` to the values of `key`, returning the values held before
    ///
    /// The unique id is bound once: a second call for [`UNIQUE_ID_KEY`] changes
    /// nothing and returns the id already in place.
    pub fn add_attribute(&mut self, key: &str, value: &str) -> Option<Vec<String>> {
        if key == UNIQUE_ID_KEY {
            if let Some(existing) = self.attributes.get(key) {
                return Some(existing.clone());
            }
        }

        self.canonical.take();
        match self.attributes.get_mut(key) {
            Some(values) => {
                let previous = values.clone();
                values.push(value.to_owned());
                Some(previous)
            }
            None => {
                self.attributes
                    .insert(key.to_owned(), vec![value.to_owned()]);
                None
            }
        }
    }

    pub fn attributes(&self, key: &str) -> Option<&[String]> {
        self.attributes.get(key).map(Vec::as_slice)
    }

    /// Drop every listed attribute entirely, returning whether any was present
    pub fn remove_attributes<I, S>(&mut self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = false;
        for key in keys {
            removed |= self.attributes.shift_remove(key.as_ref()).is_some();
        }
        if removed {
            self.canonical.take();
        }
        removed
    }

    /// Fail when a name or value ends with a backslash
    ///
    /// The escaped form of such a string hides the separator that follows it
    /// from the decoder, so the token could never be read back.
    pub fn check_encodable(&self) -> Result<()> {
        let trailing = self.attributes.iter().any(|(key, values)| {
            key.ends_with(tokenizer::ESCAPE_CHAR)
                || values.iter().any(|v| v.ends_with(tokenizer::ESCAPE_CHAR))
        });
        if trailing {
            return Err(LtpaError::creation(
                "attribute names and values must not end with a backslash",
            ));
        }
        Ok(())
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.attributes
            .get(UNIQUE_ID_KEY)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Deterministic encoding fed to the signature
    pub fn canonical_string(&self) -> &str {
        self.canonical.get_or_init(|| {
            if self.attributes.len() == 1 {
                return tokenizer::encode_attributes(self.iter());
            }
            let mut sorted: Vec<(&str, &[String])> = self.iter().collect();
            sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
            tokenizer::encode_attributes(sorted)
        })
    }

    pub(crate) fn into_attributes(self) -> IndexMap<String, Vec<String>> {
        self.attributes
    }
}

impl Clone for UserData {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            canonical: OnceCell::new(),
        }
    }
}

impl std::fmt::Display for UserData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_string())
    }
}
