// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

async fn local_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

#[tokio::test]
async fn start_reports_bound_address() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    let listener = local_listener().await;
    let expected = listener.local_addr().unwrap();

    let addr = hub.start_with_listener(listener).unwrap();
    assert_eq!(addr, expected);
    assert_eq!(hub.local_addr(), Some(addr));
    assert!(hub.is_running());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn second_start_is_rejected() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    hub.start_with_listener(local_listener().await).unwrap();

    let err = hub.start_with_listener(local_listener().await).unwrap_err();
    assert!(matches!(err, HubError::AlreadyStarted));
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn stop_before_start_is_rejected() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    assert!(matches!(hub.stop().await, Err(HubError::NotStarted)));
}

#[tokio::test]
async fn stop_twice_is_rejected() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    hub.start_with_listener(local_listener().await).unwrap();
    hub.stop().await.unwrap();
    assert!(!hub.is_running());
    assert!(hub.local_addr().is_none());
    assert!(matches!(hub.stop().await, Err(HubError::NotStarted)));
}

#[tokio::test]
async fn can_restart_after_stop() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    hub.start_with_listener(local_listener().await).unwrap();
    hub.stop().await.unwrap();
    hub.start_with_listener(local_listener().await).unwrap();
    assert!(hub.is_running());
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn stop_releases_the_port() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    let addr = hub.start_with_listener(local_listener().await).unwrap();
    hub.stop().await.unwrap();

    TcpListener::bind(addr).await.unwrap();
}

#[test]
fn invalid_config_is_rejected() {
    let config = HubConfig {
        sweep_interval_ms: 0,
        ..HubConfig::default()
    };
    let err = Hub::new(config).err().unwrap();
    assert!(matches!(err, HubError::Config(_)));
}

#[test]
fn fresh_hub_has_empty_stats() {
    let hub = Hub::new(HubConfig::default()).unwrap();
    assert_eq!(hub.stats(), HubStats::default());
}
