// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn budget() -> RetryBudget {
    RetryBudget::new(10, Duration::from_secs(1), Duration::from_secs(30))
}

#[parameterized(
    zero = { 0, 0 },
    first = { 1, 1000 },
    second = { 2, 2000 },
    third = { 3, 4000 },
    fifth = { 5, 16000 },
    capped = { 6, 30000 },
    far = { 40, 30000 },
    saturating = { u32::MAX, 30000 },
)]
fn delay_schedule(attempt: u32, expected_ms: u64) {
    assert_eq!(budget().delay_for(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn attempts_count_up_to_max() {
    let mut budget = RetryBudget::new(3, Duration::from_millis(10), Duration::from_millis(100));
    assert_eq!(budget.next_attempt(), Some(1));
    assert_eq!(budget.next_attempt(), Some(2));
    assert!(!budget.is_exhausted());
    assert_eq!(budget.next_attempt(), Some(3));
    assert!(budget.is_exhausted());
    assert_eq!(budget.next_attempt(), None);
    assert_eq!(budget.attempts(), 3);
}

#[test]
fn reset_restores_full_budget() {
    let mut budget = budget();
    for _ in 0..10 {
        budget.next_attempt();
    }
    assert!(budget.is_exhausted());
    budget.reset();
    assert_eq!(budget.attempts(), 0);
    assert_eq!(budget.max_attempts(), 10);
    assert_eq!(budget.next_attempt(), Some(1));
}

#[test]
fn zero_max_attempts_is_always_exhausted() {
    let mut budget = RetryBudget::new(0, Duration::from_secs(1), Duration::from_secs(30));
    assert!(budget.is_exhausted());
    assert_eq!(budget.next_attempt(), None);
}
