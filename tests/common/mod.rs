// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

#![allow(dead_code)]

use std::sync::{Arc, Once, OnceLock};

use rust_ltpa::clock::ManualClock;
use rust_ltpa::ltpa::{KeyMaterial, KeyRing, LtpaTokenFactory};

static INIT: Once = Once::new();
static KEY_SETS: OnceLock<Vec<Arc<KeyMaterial>>> = OnceLock::new();

const TEST_KEY_BITS: usize = 1024;
const TEST_KEY_SETS: usize = 4;

/// Setup logging for tests
pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Shared key set `index`, generated once per test binary
pub fn key_set(index: usize) -> Arc<KeyMaterial> {
    let sets = KEY_SETS.get_or_init(|| {
        (0..TEST_KEY_SETS)
            .map(|_| Arc::new(KeyMaterial::generate(TEST_KEY_BITS).expect("test key generation")))
            .collect()
    });
    Arc::clone(&sets[index])
}

/// Ring with an optional primary and a pool, both by key set index
pub fn ring(primary: Option<usize>, pool: &[usize]) -> Arc<KeyRing> {
    let ring = KeyRing::new();
    ring.set_primary(primary.map(key_set));
    ring.replace_validation_keys(pool.iter().map(|&i| key_set(i)).collect());
    Arc::new(ring)
}

/// Factory over `ring` driven by a manual clock starting at 0
pub fn factory(ring: Arc<KeyRing>) -> (LtpaTokenFactory, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0));
    let factory = LtpaTokenFactory::new(ring).with_clock(clock.clone());
    (factory, clock)
}
