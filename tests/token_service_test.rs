// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use rust_ltpa::ltpa::{KeyRing, KeySource, LtpaToken, TokenService};
use rust_ltpa::LtpaError;

const MINUTE: i64 = 60 * 1000;

#[test]
fn test_create_then_validate_returns_identity() {
    common::setup();
    let (factory, clock) = common::factory(common::ring(Some(0), &[]));

    let token = factory.create_token("user1", 5).unwrap();
    let validated = factory.validate_token(token.as_bytes(), &[]).unwrap();

    assert_eq!(validated.unique_id(), "user1");
    assert!(validated.attributes().is_empty());
    assert_eq!(validated.expiration_millis(), 5 * MINUTE);

    clock.set(5 * MINUTE + 1);
    let err = factory.validate_token(token.as_bytes(), &[]).unwrap_err();
    assert_eq!(
        err,
        LtpaError::TokenExpired {
            expired_at: 5 * MINUTE,
            now: 5 * MINUTE + 1,
        }
    );
}

#[test]
fn test_expiration_boundary() {
    common::setup();
    let (factory, clock) = common::factory(common::ring(Some(0), &[]));
    let token = factory.create_token("user1", 1).unwrap();

    clock.set(MINUTE);
    assert!(factory.validate_token(token.as_bytes(), &[]).is_ok());

    clock.set(MINUTE + 1);
    assert!(factory
        .validate_token(token.as_bytes(), &[])
        .unwrap_err()
        .is_expired());
}

#[test]
fn test_attributes_round_trip() {
    common::setup();
    let (factory, _) = common::factory(common::ring(Some(0), &[]));

    let attributes = [
        ("group", "admins"),
        ("group", "ops|on-call"),
        ("realm", "ldap:corp$east"),
        ("note", "100%"),
    ];
    let token = factory
        .create_token_with_attributes("cn=alice,o=corp|x", 30, &attributes)
        .unwrap();
    let validated = factory.validate_token(token.as_bytes(), &[]).unwrap();

    assert_eq!(validated.unique_id(), "cn=alice,o=corp|x");
    assert_eq!(validated.attribute("group").unwrap(), ["admins", "ops|on-call"]);
    assert_eq!(validated.attribute("realm").unwrap(), ["ldap:corp$east"]);
    assert_eq!(validated.attribute("note").unwrap(), ["100%"]);
    assert_eq!(validated.attributes().len(), 3);
}

#[test]
fn test_stripped_attributes_are_removed_after_validation() {
    common::setup();
    let (factory, _) = common::factory(common::ring(Some(0), &[]));
    let token = factory
        .create_token_with_attributes("user1", 5, &[("password_hint", "x"), ("group", "g")])
        .unwrap();

    let validated = factory
        .validate_token(token.as_bytes(), &["password_hint", "not_present"])
        .unwrap();
    assert!(validated.attribute("password_hint").is_none());
    assert_eq!(validated.attribute("group").unwrap(), ["g"]);

    let (_, attributes) = factory
        .validate_token(token.as_bytes(), &[])
        .unwrap()
        .into_parts();
    assert!(attributes.contains_key("password_hint"));
}

#[test]
fn test_token_from_pool_entry_validates_until_removed() {
    common::setup();
    // Token minted by a process whose primary key set is #2
    let (issuer, _) = common::factory(common::ring(Some(2), &[]));
    let token = issuer.create_token("user1", 5).unwrap();

    let ring = common::ring(Some(0), &[1, 2]);
    let (validator, _) = common::factory(ring.clone());
    let validated = validator.validate_token(token.as_bytes(), &[]).unwrap();
    assert_eq!(validated.unique_id(), "user1");

    ring.replace_validation_keys(vec![common::key_set(1)]);
    let err = validator.validate_token(token.as_bytes(), &[]).unwrap_err();
    assert!(matches!(err, LtpaError::InvalidToken { .. }));
}

#[test]
fn test_expired_token_stops_the_search() {
    common::setup();
    // Primary #0 rejects, pool #1 recognizes and reports expiration
    let (issuer, issuer_clock) = common::factory(common::ring(Some(1), &[]));
    issuer_clock.set(0);
    let token = issuer.create_token("user1", 1).unwrap();

    let (validator, clock) = common::factory(common::ring(Some(0), &[1, 2]));
    clock.set(2 * MINUTE);
    let err = validator.validate_token(token.as_bytes(), &[]).unwrap_err();
    assert_eq!(
        err,
        LtpaError::TokenExpired {
            expired_at: MINUTE,
            now: 2 * MINUTE,
        }
    );
}

#[test]
fn test_retired_pool_entry_is_skipped_and_evicted() {
    common::setup();
    let (issuer, _) = common::factory(common::ring(Some(1), &[]));
    let token = issuer.create_token("user1", 60).unwrap();

    let retired = (*common::key_set(1))
        .clone()
        .with_not_usable_after(Utc.timestamp_millis_opt(10 * MINUTE).unwrap());
    let ring = Arc::new(KeyRing::new());
    ring.set_primary(Some(common::key_set(0)));
    ring.replace_validation_keys(vec![Arc::new(retired), common::key_set(2)]);
    let (validator, clock) = common::factory(ring.clone());

    clock.set(10 * MINUTE);
    assert!(validator.validate_token(token.as_bytes(), &[]).is_ok());
    assert_eq!(ring.validation_pool().len(), 2);

    clock.set(10 * MINUTE + 1);
    let err = validator.validate_token(token.as_bytes(), &[]).unwrap_err();
    assert!(matches!(err, LtpaError::InvalidToken { .. }));
    assert_eq!(ring.validation_pool().len(), 1);
}

#[test]
fn test_error_does_not_reveal_key_index() {
    common::setup();
    let (issuer, _) = common::factory(common::ring(Some(3), &[]));
    let token = issuer.create_token("user1", 5).unwrap();

    let (validator, _) = common::factory(common::ring(Some(0), &[1, 2]));
    let message = validator
        .validate_token(token.as_bytes(), &[])
        .unwrap_err()
        .to_string();
    assert!(!message.contains('#'));
    assert!(!message.contains("primary"));
    assert!(!message.contains("user1"));
}

#[test]
fn test_tampered_token_is_rejected() {
    common::setup();
    let (factory, _) = common::factory(common::ring(Some(0), &[]));
    let token = factory
        .create_token_with_attributes("user1", 5, &[("role", "reader")])
        .unwrap()
        .into_vec();

    for index in 0..token.len() {
        let mut tampered = token.clone();
        tampered[index] ^= 0x01;
        match factory.validate_token(&tampered, &[]) {
            Err(LtpaError::InvalidToken { .. }) => {}
            other => panic!("byte {} flipped: unexpected result {:?}", index, other),
        }
    }
}

#[test]
fn test_creation_failures() {
    common::setup();
    let (factory, _) = common::factory(common::ring(Some(0), &[]));
    assert!(matches!(
        factory.create_token("", 5),
        Err(LtpaError::TokenCreationFailed { .. })
    ));
    assert!(matches!(
        factory.create_token("user1", 0),
        Err(LtpaError::TokenCreationFailed { .. })
    ));

    let (without_primary, _) = common::factory(common::ring(None, &[0]));
    assert!(matches!(
        without_primary.create_token("user1", 5),
        Err(LtpaError::TokenCreationFailed { .. })
    ));
}

#[test]
fn test_validation_without_any_key_set() {
    common::setup();
    let (factory, _) = common::factory(common::ring(None, &[]));
    let err = factory.validate_token(b"0123456789abcdef", &[]).unwrap_err();
    assert!(matches!(err, LtpaError::InvalidToken { .. }));
    assert!(err.to_string().contains("no LTPA key set is configured"));
}

#[test]
fn test_garbage_input_is_invalid_token() {
    common::setup();
    let (factory, _) = common::factory(common::ring(Some(0), &[1]));
    for garbage in [&b""[..], &b"short"[..], &[0u8; 32][..], &[0xffu8; 47][..]] {
        assert!(matches!(
            factory.validate_token(garbage, &[]),
            Err(LtpaError::InvalidToken { .. })
        ));
    }
}

#[test]
fn test_token_object_is_idempotent_and_clone_resets() {
    common::setup();
    let mut token = LtpaToken::new("user1", 5 * MINUTE, common::key_set(0)).unwrap();
    let first = token.to_bytes().unwrap();
    let second = token.to_bytes().unwrap();
    assert_eq!(first, second);
    assert!(token.is_encrypted());

    let mut copy = token.clone();
    assert_eq!(copy.state_name(), "fresh");
    assert_eq!(copy.to_bytes().unwrap(), first);

    token.add_attribute("group", "g");
    assert!(!token.is_signed());
    assert_ne!(token.to_bytes().unwrap(), first);
}

#[test]
fn test_concurrent_validation_during_rotation() {
    common::setup();
    let (issuer, _) = common::factory(common::ring(Some(0), &[]));
    let token = Arc::new(issuer.create_token("user1", 5).unwrap());

    let ring = common::ring(Some(3), &[0]);
    let (validator, _) = common::factory(ring.clone());
    let validator = Arc::new(validator);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let validator = Arc::clone(&validator);
            let token = Arc::clone(&token);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut validations = 0;
                while !done.load(Ordering::Acquire) || validations < 10 {
                    let validated = validator.validate_token(token.as_bytes(), &[]).unwrap();
                    assert_eq!(validated.unique_id(), "user1");
                    validations += 1;
                }
            })
        })
        .collect();

    for round in 0..50 {
        let pool = if round % 2 == 0 {
            vec![common::key_set(1), common::key_set(0)]
        } else {
            vec![common::key_set(0), common::key_set(2)]
        };
        ring.replace_validation_keys(pool);
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
}
