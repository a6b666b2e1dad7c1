// showcache - Episode rotation with a bounded local cache
// Copyright (C) 2025 The showcache contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Download coordination against an in-memory object store

mod common;

use common::Harness;
use futures_util::future::join_all;
use showcache::download::{FetchOutcome, TransferState};
use showcache::file::{CacheLimits, Tier};
use showcache::Episode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn episodes(harness: &Harness, group: &str, count: usize) -> Vec<Episode> {
    (0..count)
        .map(|i| {
            let key = format!("{}/ep{:02}.mp4", group, i);
            harness.store.insert(&key, 1000);
            Episode::new(group, key).with_size(1000)
        })
        .collect()
}

#[tokio::test]
async fn test_concurrent_callers_respect_limit() {
    let harness = Harness::with_limits(2, CacheLimits::default());
    let gate = harness.store.gate();
    let all = episodes(&harness, "simpsons", 6);

    let calls = all.iter().cloned().map(|episode| {
        let coordinator = Arc::clone(&harness.coordinator);
        tokio::spawn(async move { coordinator.fetch(&episode).await })
    });
    let outcomes: Vec<FetchOutcome> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, FetchOutcome::Started(_)))
        .count();
    let refused = outcomes
        .iter()
        .filter(|o| matches!(o, FetchOutcome::AtCapacity))
        .count();
    assert_eq!(started, 2);
    assert_eq!(refused, 4);
    assert_eq!(harness.coordinator.in_flight_count(), 2);

    gate.add_permits(2);
    for outcome in outcomes {
        if let FetchOutcome::Started(handle) = outcome {
            handle.wait().await.unwrap();
        }
    }
    assert!(harness.store.peak_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(harness.coordinator.in_flight_count(), 0);
    assert_eq!(harness.events.count("episode_available"), 2);
}

#[tokio::test]
async fn test_same_key_is_downloaded_once() {
    let harness = Harness::new();
    let gate = harness.store.gate();
    let episode = episodes(&harness, "simpsons", 1).remove(0);

    let first = harness.coordinator.fetch(&episode).await.unwrap();
    let second = harness.coordinator.fetch(&episode).await.unwrap();
    assert!(matches!(second, FetchOutcome::InFlight));
    assert!(harness.coordinator.is_in_flight(&episode.key));

    gate.add_permits(1);
    let FetchOutcome::Started(handle) = first else {
        panic!("first fetch should start a transfer");
    };
    let monitor = Arc::clone(handle.monitor());
    let done = handle.wait().await.unwrap();

    assert_eq!(harness.store.downloads(), 1);
    assert_eq!(monitor.state(), TransferState::Completed);
    assert!(done.path.exists());
    assert_eq!(harness.layout().tier_of(&done.path), Some(Tier::Cache));

    // Tracked by the cache now, so no second transfer
    let again = harness.coordinator.fetch(&episode).await.unwrap();
    assert!(matches!(again, FetchOutcome::Local(path) if path == done.path));
    assert_eq!(harness.store.downloads(), 1);
}

#[tokio::test]
async fn test_prefetch_at_capacity_starts_nothing() {
    let harness = Harness::new();
    let gate = harness.store.gate();
    let all = episodes(&harness, "simpsons", 6);

    let mut handles = Vec::new();
    for episode in &all[..5] {
        match harness.coordinator.fetch(episode).await.unwrap() {
            FetchOutcome::Started(handle) => handles.push(handle),
            other => panic!("unexpected {:?}", other),
        }
    }

    let report = harness.coordinator.prefetch(&all[5..], 1).await;
    assert!(report.started.is_empty());
    assert!(report.at_capacity);
    assert_eq!(harness.coordinator.in_flight_count(), 5);
    assert_eq!(harness.store.downloads(), 5);

    gate.add_permits(5);
    for handle in handles {
        handle.wait().await.unwrap();
    }
}

#[tokio::test]
async fn test_existing_download_is_reused() {
    let harness = Harness::new();
    let episode = episodes(&harness, "simpsons", 1).remove(0);
    let destination = harness.coordinator.destination_for(&episode);
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, b"already here").unwrap();

    let outcome = harness.coordinator.fetch(&episode).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Local(path) if path == destination));
    assert_eq!(harness.store.downloads(), 0);
    assert!(harness.events.kinds().is_empty());
}

#[tokio::test]
async fn test_prefetch_skips_in_flight_and_counts_local() {
    let harness = Harness::new();
    let gate = harness.store.gate();
    let all = episodes(&harness, "simpsons", 4);

    let FetchOutcome::Started(running) = harness.coordinator.fetch(&all[0]).await.unwrap() else {
        panic!("expected a transfer");
    };
    let local = harness.coordinator.destination_for(&all[1]);
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"x").unwrap();

    let report = harness.coordinator.prefetch(&all, 2).await;
    assert_eq!(report.consumed, 3);
    assert_eq!(report.local, vec![(all[1].key.clone(), local)]);
    assert_eq!(report.started.len(), 1);
    assert_eq!(report.started[0].key(), all[2].key);

    gate.add_permits(2);
    running.wait().await.unwrap();
    for handle in report.started {
        handle.wait().await.unwrap();
    }
}

#[tokio::test]
async fn test_failed_transfer_cleans_up() {
    let harness = Harness::new();
    let episode = episodes(&harness, "simpsons", 1).remove(0);
    harness.store.fail_download(&episode.key);

    let FetchOutcome::Started(handle) = harness.coordinator.fetch(&episode).await.unwrap() else {
        panic!("expected a transfer");
    };
    let monitor = Arc::clone(handle.monitor());
    let err = handle.wait().await.unwrap_err();

    assert!(err.is_transport_error());
    assert_eq!(monitor.state(), TransferState::Failed);
    assert!(!monitor.temp_path().exists());
    assert!(!harness.coordinator.destination_for(&episode).exists());
    assert_eq!(harness.coordinator.in_flight_count(), 0);
    assert_eq!(harness.events.kinds(), vec!["download_started", "download_error"]);
}

#[tokio::test]
async fn test_progress_visible_mid_transfer() {
    let harness = Harness::new();
    let gate = harness.store.gate();
    let episode = episodes(&harness, "simpsons", 1).remove(0);

    let FetchOutcome::Started(handle) = harness.coordinator.fetch(&episode).await.unwrap() else {
        panic!("expected a transfer");
    };
    let monitor = Arc::clone(handle.monitor());

    // The fake writes half the body before waiting on the gate
    let mut fraction = None;
    for _ in 0..100 {
        fraction = monitor.sample().await;
        if fraction == Some(0.5) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fraction, Some(0.5));

    gate.add_permits(1);
    handle.wait().await.unwrap();
    assert_eq!(monitor.sample().await, Some(1.0));
}

#[tokio::test]
async fn test_paginated_listing() {
    let harness = Harness::new();
    harness.store.set_page_size(2);
    episodes(&harness, "simpsons", 5);
    harness.store.insert("simpsons/notes.txt", 10);
    harness.store.insert("simpsons/ep00-480p.m3u8", 10);
    harness.store.insert("futurama/ep00.mp4", 10);

    let listed = harness.coordinator.list_group("simpsons").await.unwrap();
    let keys: Vec<&str> = listed.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "simpsons/ep00.mp4",
            "simpsons/ep01.mp4",
            "simpsons/ep02.mp4",
            "simpsons/ep03.mp4",
            "simpsons/ep04.mp4",
        ]
    );
    assert!(listed.iter().all(|e| e.group == "simpsons" && e.size == 1000));
    assert_eq!(harness.store.list_calls.load(Ordering::SeqCst), 4);
    assert_eq!(harness.events.count("list_progress"), 4);
}

#[tokio::test]
async fn test_list_groups() {
    let harness = Harness::new();
    episodes(&harness, "simpsons", 1);
    episodes(&harness, "futurama", 2);

    let groups = harness.coordinator.list_groups().await.unwrap();
    assert_eq!(groups, vec!["futurama", "simpsons"]);
}

#[tokio::test]
async fn test_cache_bounds_hold_under_concurrent_completions() {
    let limits = CacheLimits {
        max_downloaded_episodes: 3,
        max_episodes_in_cache: 2,
    };
    let harness = Harness::with_limits(8, limits);
    let gate = harness.store.gate();
    let all = episodes(&harness, "simpsons", 8);

    let mut handles = Vec::new();
    for episode in &all {
        if let FetchOutcome::Started(handle) = harness.coordinator.fetch(episode).await.unwrap() {
            handles.push(handle);
        }
    }
    assert_eq!(handles.len(), 8);

    gate.add_permits(8);
    let results = join_all(handles.into_iter().map(|h| h.wait())).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let cached = harness.cache.cached().len();
    let precached = harness.cache.precached().len();
    assert_eq!(cached, 2);
    assert!((1..=3).contains(&precached));

    let count = |tier| {
        std::fs::read_dir(harness.layout().group_dir(tier, "simpsons"))
            .map(|dir| dir.count())
            .unwrap_or(0)
    };
    assert_eq!(count(Tier::Cache), cached);
    assert_eq!(count(Tier::Precache), precached);
    // Overflow stays untracked in the download directory
    assert_eq!(count(Tier::Download), 8 - cached - precached);
}

#[tokio::test]
async fn test_nested_keys_do_not_share_files() {
    let harness = Harness::new();
    harness.store.insert("simpsons/s1/e1.mp4", 100);
    harness.store.insert("simpsons/s2/e1.mp4", 300);
    let first = Episode::new("simpsons", "simpsons/s1/e1.mp4").with_size(100);
    let second = Episode::new("simpsons", "simpsons/s2/e1.mp4").with_size(300);
    assert_ne!(
        harness.coordinator.destination_for(&first),
        harness.coordinator.destination_for(&second)
    );

    let FetchOutcome::Started(handle) = harness.coordinator.fetch(&first).await.unwrap() else {
        panic!("expected a transfer");
    };
    handle.wait().await.unwrap();
    let played = harness.cache.on_playback_completed(&first).await.unwrap();
    assert_eq!(std::fs::metadata(&played).unwrap().len(), 100);

    let FetchOutcome::Started(handle) = harness.coordinator.fetch(&second).await.unwrap() else {
        panic!("second key must not reuse the first key's file");
    };
    let done = handle.wait().await.unwrap();
    assert_eq!(std::fs::metadata(&done.path).unwrap().len(), 300);
    assert_eq!(harness.store.downloads(), 2);
}
