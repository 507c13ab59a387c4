// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Property-based tests for the escaped-field tokenizer

use std::collections::BTreeMap;

use proptest::prelude::*;
use rust_ltpa::ltpa::tokenizer::{escape, parse_user_data, split_token, unescape};
use rust_ltpa::ltpa::UserData;

// Strings dense in reserved characters and backslashes
prop_compose! {
    fn arb_reserved_heavy()(s in "[a-c%$:|\\\\]{0,24}") -> String {
        s
    }
}

// Values that do not end with a backslash
prop_compose! {
    fn arb_value()(s in "[a-z0-9 %$:|\\\\]{0,10}") -> String {
        if s.ends_with('\\') { format!("{}x", s) } else { s }
    }
}

// Attribute names other than the unique id
prop_compose! {
    fn arb_name()(s in "[a-z%$:|]{1,6}") -> String {
        if s == "u" { "uu".to_string() } else { s }
    }
}

proptest! {
    #[test]
    fn test_unescape_reverses_escape(s in arb_reserved_heavy()) {
        prop_assert_eq!(unescape(&escape(&s)), s);
    }

    #[test]
    fn test_unescape_reverses_escape_for_any_text(s in any::<String>()) {
        prop_assert_eq!(unescape(&escape(&s)), s);
    }

    #[test]
    fn test_escaped_text_has_no_bare_delimiters(s in arb_reserved_heavy()) {
        let escaped = escape(&s);
        let bytes = escaped.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if matches!(b, b'%' | b'$' | b':' | b'|') {
                prop_assert!(i > 0 && bytes[i - 1] == b'\\', "bare delimiter in {:?}", escaped);
            }
        }
    }

    #[test]
    fn test_user_data_round_trip(
        unique_id in "[a-zA-Z0-9=,:|%$]{1,16}",
        attributes in prop::collection::vec((arb_name(), arb_value()), 0..6),
    ) {
        let mut user_data = UserData::new(&unique_id);
        let mut expected: BTreeMap<String, Vec<String>> = BTreeMap::new();
        expected.insert("u".to_string(), vec![unique_id.clone()]);
        for (name, value) in &attributes {
            user_data.add_attribute(name, value);
            expected.entry(name.clone()).or_default().push(value.clone());
        }

        let parsed: BTreeMap<String, Vec<String>> = parse_user_data(user_data.canonical_string())
            .unwrap()
            .into_iter()
            .collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn test_canonical_string_is_order_independent(
        attributes in prop::collection::btree_map(arb_name(), arb_value(), 1..6),
    ) {
        let mut forward = UserData::new("user1");
        let mut backward = UserData::new("user1");
        for (name, value) in attributes.iter() {
            forward.add_attribute(name, value);
        }
        for (name, value) in attributes.iter().rev() {
            backward.add_attribute(name, value);
        }
        prop_assert_eq!(forward.canonical_string(), backward.canonical_string());
    }

    #[test]
    fn test_token_fields_survive_escaped_user_data(
        unique_id in "[a-z%$:|]{1,12}",
        expiration in 0i64..i64::MAX,
    ) {
        let user_data = UserData::new(&unique_id);
        let plaintext = format!("{}%{}%c2ln", user_data.canonical_string(), expiration);
        let fields = split_token(&plaintext).unwrap();
        let expected_expiration = expiration.to_string();
        prop_assert_eq!(fields.user_data, user_data.canonical_string());
        prop_assert_eq!(fields.expiration, Some(expected_expiration.as_str()));
        prop_assert_eq!(fields.signature, "c2ln");
    }
}
