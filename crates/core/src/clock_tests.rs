// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_epoch_is_nonzero() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let start = clock.epoch_ms();
    clock.advance(Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms(), start + 1500);
    assert!(clock.now() > Instant::now() - Duration::from_secs(3600));
}

#[test]
fn fake_clock_set_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42_000);
    assert_eq!(clock.epoch_ms(), 42_000);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.epoch_ms(), other.epoch_ms());
}

#[test]
fn epoch_ms_to_rfc3339_renders_utc() {
    // 2026-01-01T00:00:00Z
    let rendered = epoch_ms_to_rfc3339(1_767_225_600_000);
    assert!(rendered.starts_with("2026-01-01T00:00:00"), "{rendered}");
}
