// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn event(ts: u64, sender: &str) -> Envelope {
    Envelope::event(ts, sender, json!({ "ts": ts }))
}

fn timestamps(catch_up: &CatchUp) -> Vec<u64> {
    catch_up.events.iter().map(Envelope::timestamp).collect()
}

#[test]
fn returns_only_newer_events_ascending() {
    let history = History::new(100);
    for ts in [3000, 1000, 5000, 2000, 4000] {
        history.append(event(ts, "c1"));
    }

    let catch_up = history.since(2000, &[]);
    assert_eq!(timestamps(&catch_up), vec![3000, 4000, 5000]);
    assert!(catch_up.complete);
    assert!(catch_up.events.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
}

#[test]
fn cursor_at_newest_returns_nothing() {
    let history = History::new(100);
    history.append(event(1000, "c1"));
    let catch_up = history.since(1000, &[]);
    assert!(catch_up.events.is_empty());
    assert!(catch_up.complete);
}

#[test]
fn excludes_requesters_own_events() {
    let history = History::new(100);
    history.append(event(1, "c1"));
    history.append(event(2, "c2"));
    history.append(Envelope::preference(3, "c3", json!({"theme": "dark"})));

    let catch_up = history.since(0, &["c2"]);
    assert_eq!(timestamps(&catch_up), vec![1, 3]);
}

#[test]
fn excludes_every_listed_sender() {
    let history = History::new(100);
    history.append(event(1, "c1"));
    history.append(event(2, "c4"));
    history.append(event(3, "c2"));

    let catch_up = history.since(0, &["c4", "c1"]);
    assert_eq!(timestamps(&catch_up), vec![3]);
}

#[test]
fn truncated_to_capacity_and_flagged_partial() {
    let history = History::new(100);
    for ts in 1..=150 {
        history.append(event(ts, "c1"));
    }
    assert_eq!(history.len(), 100);

    let catch_up = history.since(0, &[]);
    assert_eq!(timestamps(&catch_up), (51..=150).collect::<Vec<_>>());
    assert!(!catch_up.complete);

    // A cursor past everything evicted is fully covered
    let catch_up = history.since(50, &[]);
    assert_eq!(catch_up.events.len(), 100);
    assert!(catch_up.complete);
}

#[test]
fn zero_capacity_retains_nothing() {
    let history = History::new(0);
    history.append(event(10, "c1"));
    assert!(history.is_empty());
    let catch_up = history.since(5, &[]);
    assert!(catch_up.events.is_empty());
    assert!(!catch_up.complete);
}
