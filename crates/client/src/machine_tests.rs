// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the connection state machine.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use super::machine::{Action, CloseReason, ConnectionMachine, ConnectionState, Input, TimerId};
use tether_core::Backoff;

fn machine() -> ConnectionMachine {
    ConnectionMachine::new(Backoff::default())
}

/// Returns the scheduled timer, panicking if the actions don't schedule one.
fn scheduled(actions: &[Action]) -> (TimerId, u32, Duration) {
    actions
        .iter()
        .find_map(|a| match a {
            Action::ScheduleReconnect {
                timer,
                attempt,
                delay,
            } => Some((*timer, *attempt, *delay)),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no reconnect scheduled in {:?}", actions))
}

fn connected() -> ConnectionMachine {
    let mut m = machine();
    m.step(Input::Connect);
    m.step(Input::Opened);
    m
}

#[test]
fn starts_disconnected() {
    let m = machine();
    assert_eq!(m.state(), ConnectionState::Disconnected);
    assert_eq!(m.attempt(), 0);
    assert!(!m.is_suspended());
}

#[test]
fn connect_then_open() {
    let mut m = machine();
    assert_eq!(m.step(Input::Connect), vec![Action::OpenTransport]);
    assert_eq!(m.state(), ConnectionState::Connecting);

    assert_eq!(
        m.step(Input::Opened),
        vec![
            Action::NotifyConnect,
            Action::StartHeartbeat,
            Action::FlushQueue
        ]
    );
    assert_eq!(m.state(), ConnectionState::Connected);
}

#[test]
fn connect_is_idempotent_while_active() {
    let mut m = machine();
    m.step(Input::Connect);
    assert!(m.step(Input::Connect).is_empty());
    m.step(Input::Opened);
    assert!(m.step(Input::Connect).is_empty());
    assert_eq!(m.state(), ConnectionState::Connected);
}

#[test]
fn drop_schedules_first_backoff() {
    let mut m = connected();
    let actions = m.step(Input::Closed(CloseReason::Transport));
    assert_eq!(m.state(), ConnectionState::Disconnected);
    assert_eq!(actions[0], Action::StopHeartbeat);
    assert_eq!(actions[1], Action::NotifyDisconnect);
    let (_, attempt, delay) = scheduled(&actions);
    assert_eq!(attempt, 1);
    assert_eq!(delay, Duration::from_millis(1000));
}

#[test]
fn backoff_sequence_then_give_up() {
    let mut m = connected();
    let mut actions = m.step(Input::Closed(CloseReason::Transport));
    let mut delays = Vec::new();

    loop {
        let Some((timer, _, delay)) = actions.iter().find_map(|a| match a {
            Action::ScheduleReconnect { timer, attempt, delay } => Some((*timer, *attempt, *delay)),
            _ => None,
        }) else {
            break;
        };
        delays.push(delay.as_millis() as u64);
        assert_eq!(m.step(Input::TimerFired(timer)), vec![Action::OpenTransport]);
        actions = m.step(Input::Closed(CloseReason::Transport));
    }

    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    assert_eq!(actions, vec![Action::NotifyGaveUp { attempts: 5 }]);
    assert_eq!(m.state(), ConnectionState::Disconnected);
    assert_eq!(m.pending_timer(), None);
}

#[test]
fn successful_open_resets_attempts() {
    let mut m = connected();
    let (timer, _, _) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));
    m.step(Input::TimerFired(timer));
    let (timer, attempt, _) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));
    assert_eq!(attempt, 2);

    m.step(Input::TimerFired(timer));
    m.step(Input::Opened);
    assert_eq!(m.attempt(), 0);

    let (_, attempt, delay) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));
    assert_eq!(attempt, 1);
    assert_eq!(delay, Duration::from_millis(1000));
}

#[test]
fn server_unavailable_on_first_connect_suspends() {
    let mut m = machine();
    m.step(Input::Connect);
    let actions = m.step(Input::Closed(CloseReason::ServerUnavailable));
    assert_eq!(actions, vec![Action::NotifySuspended]);
    assert!(m.is_suspended());
    assert_eq!(m.pending_timer(), None);
    assert_eq!(m.state(), ConnectionState::Disconnected);

    // Only an explicit connect resumes
    assert_eq!(m.step(Input::Connect), vec![Action::OpenTransport]);
    assert!(!m.is_suspended());
}

#[test]
fn refused_reconnect_after_established_session_keeps_retrying() {
    let mut m = connected();
    let (timer, _, _) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));
    m.step(Input::TimerFired(timer));

    let actions = m.step(Input::Closed(CloseReason::ServerUnavailable));
    let (_, attempt, delay) = scheduled(&actions);
    assert_eq!(attempt, 2);
    assert_eq!(delay, Duration::from_millis(2000));
    assert!(!m.is_suspended());
}

#[test]
fn heartbeat_timeout_is_an_ordinary_drop() {
    let mut m = connected();
    let actions = m.step(Input::Closed(CloseReason::HeartbeatTimeout));
    let (_, attempt, _) = scheduled(&actions);
    assert_eq!(attempt, 1);
}

#[test]
fn manual_connect_invalidates_pending_timer() {
    let mut m = connected();
    let (stale, _, _) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));

    assert_eq!(
        m.step(Input::Connect),
        vec![Action::CancelReconnect, Action::OpenTransport]
    );
    assert_eq!(m.pending_timer(), None);

    // The old timer firing later must not start another attempt
    m.step(Input::Closed(CloseReason::Transport));
    assert!(m.step(Input::TimerFired(stale)).is_empty());
}

#[test]
fn disconnect_parks_without_reconnect() {
    let mut m = connected();
    assert_eq!(
        m.step(Input::Disconnect),
        vec![
            Action::StopHeartbeat,
            Action::CloseTransport,
            Action::NotifyDisconnect
        ]
    );
    assert_eq!(m.state(), ConnectionState::Disconnected);
    assert_eq!(m.pending_timer(), None);
    // The transport's own close arriving afterwards changes nothing
    assert!(m.step(Input::Closed(CloseReason::Transport)).is_empty());
}

#[test]
fn disconnect_cancels_pending_timer() {
    let mut m = connected();
    let (timer, _, _) = scheduled(&m.step(Input::Closed(CloseReason::Transport)));
    assert_eq!(m.step(Input::Disconnect), vec![Action::CancelReconnect]);
    assert!(m.step(Input::TimerFired(timer)).is_empty());
    assert_eq!(m.state(), ConnectionState::Disconnected);
}

#[test]
fn late_open_after_disconnect_is_closed() {
    let mut m = machine();
    m.step(Input::Connect);
    m.step(Input::Disconnect);
    assert_eq!(m.step(Input::Opened), vec![Action::CloseTransport]);
    assert_eq!(m.state(), ConnectionState::Disconnected);
}

/// Every sequence of up to six inputs keeps the machine in a legal state,
/// takes only legal transitions, and never schedules past max attempts.
#[test]
fn all_interleavings_take_legal_transitions() {
    use ConnectionState::*;

    const LEN: u32 = 6;
    let alphabet = |m: &ConnectionMachine, i: usize| -> Input {
        match i {
            0 => Input::Connect,
            1 => Input::Opened,
            2 => Input::Closed(CloseReason::Transport),
            3 => Input::Closed(CloseReason::ServerUnavailable),
            4 => Input::Disconnect,
            // Fire the live timer if there is one, else a bogus id
            _ => Input::TimerFired(m.pending_timer().unwrap_or(TimerId(u64::MAX))),
        }
    };

    let total = 6usize.pow(LEN);
    for mut seq in 0..total {
        let mut m = machine();
        for _ in 0..LEN {
            let input = alphabet(&m, seq % 6);
            seq /= 6;

            let before = m.state();
            let actions = m.step(input);
            let after = m.state();

            let legal = match (before, after) {
                (a, b) if a == b => true,
                (Disconnected, Connecting) => {
                    matches!(input, Input::Connect | Input::TimerFired(_))
                }
                (Connecting, Connected) => input == Input::Opened,
                (Connecting | Connected, Disconnected) => {
                    matches!(input, Input::Closed(_) | Input::Disconnect)
                }
                _ => false,
            };
            assert!(legal, "illegal {before:?} -> {after:?} on {input:?}");

            for action in &actions {
                if let Action::ScheduleReconnect { attempt, .. } = action {
                    assert!(*attempt >= 1 && *attempt <= 5);
                    assert_eq!(after, Disconnected);
                }
            }
            if m.is_suspended() {
                assert_eq!(m.pending_timer(), None);
            }
        }
    }
}
