use netmeter_daemon::recommender::UsageRecommender;
use netmeter_daemon::sampler::{ProcessUsage, Snapshot};
use std::collections::HashMap;

const MIB: u64 = 1024 * 1024;

fn usage(app: &str, sent: u64, recv: u64) -> ProcessUsage {
    ProcessUsage {
        process_name: app.to_lowercase(),
        app_name: Some(app.to_string()),
        bytes_sent: sent,
        bytes_recv: recv,
        connections: 1,
    }
}

fn snapshot(entries: Vec<(u32, ProcessUsage)>) -> Snapshot {
    Snapshot {
        taken_at: 0,
        processes: entries.into_iter().collect::<HashMap<_, _>>(),
    }
}

#[test]
fn test_zero_total_yields_no_recommendations() {
    let recommender = UsageRecommender::default();
    let empty = snapshot(vec![]);
    let totals = empty.total_bandwidth();
    assert!(recommender.get_recommendations(&empty, &totals).is_empty());

    let idle = snapshot(vec![(1, usage("Chrome", 0, 0))]);
    let totals = idle.total_bandwidth();
    assert!(recommender.get_recommendations(&idle, &totals).is_empty());
}

#[test]
fn test_dominant_browser_recommendation() {
    let recommender = UsageRecommender::default();
    let snap = snapshot(vec![
        (1, usage("Chrome", 5 * MIB, 5 * MIB)),
        (2, usage("Zoom", MIB, MIB)),
    ]);
    let totals = snap.total_bandwidth();
    assert_eq!(totals.total, 12 * MIB);

    let recs = recommender.get_recommendations(&snap, &totals);
    let dominant = recs
        .iter()
        .find(|r| r.contains("Chrome"))
        .expect("dominant-app advisory should fire at 83% share");
    assert!(dominant.contains("83%"));
    assert!(dominant.contains("closing unused tabs"));
}

#[test]
fn test_dominant_generic_fallback() {
    let recommender = UsageRecommender::default();
    let snap = snapshot(vec![
        (1, usage("Mysterious", 3 * MIB, 0)),
        (2, usage("Zoom", MIB, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert!(recs
        .iter()
        .any(|r| r.contains("Mysterious") && r.contains("closing or limiting")));
}

#[test]
fn test_sync_services_combined_share() {
    let recommender = UsageRecommender::default();
    // Dropbox at 30%, no app above 50%, fewer than three moderate apps,
    // total under the global threshold: only the sync rule fires.
    let snap = snapshot(vec![
        (1, usage("Dropbox", 300 * 1024, 0)),
        (2, usage("Zoom", 450 * 1024, 0)),
        (3, usage("EchoA", 50 * 1024, 0)),
        (4, usage("EchoB", 50 * 1024, 0)),
        (5, usage("EchoC", 50 * 1024, 0)),
        (6, usage("EchoD", 50 * 1024, 0)),
        (7, usage("EchoE", 50 * 1024, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].contains("Background sync services"));
    assert!(recs[0].contains("Dropbox"));
}

#[test]
fn test_system_process_share() {
    let recommender = UsageRecommender::default();
    // Packagekitd at 20%, nothing dominant, fewer than three moderate apps.
    let snap = snapshot(vec![
        (1, usage("Packagekitd", 200 * 1024, 0)),
        (2, usage("Zoom", 450 * 1024, 0)),
        (3, usage("EchoA", 70 * 1024, 0)),
        (4, usage("EchoB", 70 * 1024, 0)),
        (5, usage("EchoC", 70 * 1024, 0)),
        (6, usage("EchoD", 70 * 1024, 0)),
        (7, usage("EchoE", 70 * 1024, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].contains("System process"));
    assert!(recs[0].contains("Packagekitd"));
}

#[test]
fn test_global_threshold_rule() {
    let recommender = UsageRecommender::default();
    // Two apps at 50/50: no dominant app, but total exceeds 5 MiB/s.
    let snap = snapshot(vec![
        (1, usage("Alpha", 3 * MIB, 0)),
        (2, usage("Beta", 3 * MIB, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert!(recs.iter().any(|r| r.contains("High bandwidth usage detected")));
}

#[test]
fn test_moderate_multi_app_rule() {
    let recommender = UsageRecommender::default();
    // Four apps at 25% each, total under the global threshold.
    let snap = snapshot(vec![
        (1, usage("Alpha", MIB, 0)),
        (2, usage("Beta", MIB, 0)),
        (3, usage("Gamma", MIB, 0)),
        (4, usage("Delta", MIB, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert_eq!(recs.len(), 1);
    assert!(recs[0].contains("Multiple applications"));
    // Only three of the four contributors are listed.
    let listed = ["Alpha", "Beta", "Gamma", "Delta"]
        .iter()
        .filter(|name| recs[0].contains(**name))
        .count();
    assert_eq!(listed, 3);
}

#[test]
fn test_rule_order_is_fixed() {
    let recommender = UsageRecommender::default();
    // Dominant app and global threshold both fire; dominant comes first.
    let snap = snapshot(vec![
        (1, usage("Zeta", 6 * MIB, 0)),
        (2, usage("Alpha", MIB, 0)),
    ]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert!(recs.len() >= 2);
    assert!(recs[0].contains("Zeta"));
    assert!(recs[1].contains("High bandwidth usage detected"));
}

#[test]
fn test_set_threshold() {
    let mut recommender = UsageRecommender::default();
    recommender.set_threshold(MIB);
    assert_eq!(recommender.threshold(), MIB);

    let snap = snapshot(vec![(1, usage("Alpha", MIB, MIB))]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert!(recs.iter().any(|r| r.contains("High bandwidth usage detected")));
}

#[test]
fn test_app_name_falls_back_to_process_name() {
    let recommender = UsageRecommender::default();
    let mut anon = usage("placeholder", 3 * MIB, 0);
    anon.app_name = None;
    anon.process_name = "wget".to_string();
    let snap = snapshot(vec![(1, anon), (2, usage("Zoom", MIB, 0))]);
    let totals = snap.total_bandwidth();
    let recs = recommender.get_recommendations(&snap, &totals);
    assert!(recs.iter().any(|r| r.contains("wget")));
}
