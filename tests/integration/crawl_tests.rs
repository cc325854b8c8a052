//! End-to-end crawl tests
//!
//! The registry is replaced by an in-process transport; everything else
//! (config parsing, pool, executor, sequencer, SQLite) is the real thing.

use crate::support::{
    build_sequencer, create_test_config, load_test_config, write_config, RegistryTransport,
};
use std::path::Path;
use tempfile::TempDir;
use vntm_crawler::config::compute_config_hash;
use vntm_crawler::output::load_statistics;
use vntm_crawler::session::SessionCredential;
use vntm_crawler::storage::{open_storage, Persistence, RunStatus, SharedStorage};

const KNOWN: &[&str] = &["VN-4-2020-00002", "VN-4-2020-00003", "VN-4-2020-00004"];

fn open_shared(config: &vntm_crawler::Config) -> SharedStorage {
    SharedStorage::new(open_storage(Path::new(&config.output.database_path)).unwrap())
}

#[tokio::test]
async fn test_full_crawl_single_year() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);
    let transport = RegistryTransport::with_codes(KNOWN);

    let mut sequencer = build_sequencer(&config, transport.clone(), &shared);
    let reports = sequencer.crawl_years(2020..=2020, false).await.unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.start_sequence, 2);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.checked, 4);
    assert_eq!(report.terminated_at.as_deref(), Some("VN-4-2020-00005"));

    assert_eq!(
        transport.validated(),
        vec![
            "VN-4-2020-00002",
            "VN-4-2020-00003",
            "VN-4-2020-00004",
            "VN-4-2020-00005"
        ]
    );

    let storage = shared.lock();
    assert_eq!(storage.count_records().unwrap(), 3);

    let record = storage.get_record("VN-4-2020-00003").unwrap().unwrap();
    assert_eq!(record.year, 2020);
    assert_eq!(record.sequence, 3);
    assert_eq!(record.mark_name.as_deref(), Some("LOTUS"));
    assert_eq!(record.status.as_deref(), Some("Pending"));
    assert_eq!(record.nice_classes, vec!["30".to_string()]);
    assert_eq!(storage.status_history("VN-4-2020-00003").unwrap(), vec!["Pending"]);
}

#[tokio::test]
async fn test_first_candidate_missing_ends_year() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);
    let transport = RegistryTransport::with_codes(&[]);

    let mut sequencer = build_sequencer(&config, transport.clone(), &shared);
    let fetched = sequencer.crawl_year(2020).await.unwrap();

    assert_eq!(fetched, 0);
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(shared.lock().count_records().unwrap(), 0);
}

#[tokio::test]
async fn test_resume_continues_after_stored_sequence() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);

    let first = RegistryTransport::with_codes(&KNOWN[..2]);
    let mut sequencer = build_sequencer(&config, first, &shared);
    sequencer.crawl_years(2020..=2020, false).await.unwrap();
    assert_eq!(shared.lock().count_records().unwrap(), 2);

    let second = RegistryTransport::with_codes(KNOWN);
    let mut sequencer = build_sequencer(&config, second.clone(), &shared);
    let reports = sequencer.crawl_years(2020..=2020, true).await.unwrap();

    assert_eq!(reports[0].start_sequence, 4);
    assert_eq!(reports[0].fetched, 1);
    assert_eq!(
        second.validated(),
        vec!["VN-4-2020-00004", "VN-4-2020-00005"]
    );
    assert_eq!(shared.lock().count_records().unwrap(), 3);
}

#[tokio::test]
async fn test_refresh_status_appends_history() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);
    let transport = RegistryTransport::with_codes(KNOWN);

    let mut sequencer = build_sequencer(&config, transport.clone(), &shared);
    sequencer.crawl_year(2020).await.unwrap();

    transport.set_status("VN-4-2020-00003", "Registered");
    let report = sequencer.refresh_status("Pending").await.unwrap();

    assert_eq!(report.checked, 3);
    assert_eq!(report.status_changed, 1);
    assert_eq!(report.failed, 0);

    let storage = shared.lock();
    assert_eq!(
        storage.status_history("VN-4-2020-00003").unwrap(),
        vec!["Pending", "Registered"]
    );
    assert_eq!(storage.status_history("VN-4-2020-00002").unwrap(), vec!["Pending"]);
    assert_eq!(storage.records_with_status("Pending").unwrap().len(), 2);
}

#[tokio::test]
async fn test_stored_session_cookie_is_sent() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);
    shared
        .lock()
        .add_session(&SessionCredential::new("token-1", "session-1"))
        .unwrap();
    let transport = RegistryTransport::with_codes(&KNOWN[..1]);

    let mut sequencer = build_sequencer(&config, transport.clone(), &shared);
    sequencer.crawl_year(2020).await.unwrap();

    let requests = transport.requests();
    assert!(!requests.is_empty());
    for request in &requests {
        assert_eq!(
            request.header("Cookie"),
            Some("PSUSR=token-1; JSESSIONID=session-1")
        );
    }
}

#[tokio::test]
async fn test_crawl_log_and_statistics() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let shared = open_shared(&config);
    let transport = RegistryTransport::with_codes(KNOWN);

    let run_id = shared.lock().create_run("test-hash").unwrap();
    let mut sequencer = build_sequencer(&config, transport, &shared);
    sequencer.crawl_year(2020).await.unwrap();
    shared.lock().finish_run(run_id, RunStatus::Completed).unwrap();

    let storage = shared.lock();
    let stats = load_statistics(&storage, "VN-4").unwrap();

    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.last_sequences, vec![(2020, 4)]);
    assert_eq!(
        stats.latest_run.as_ref().map(|run| run.status),
        Some(RunStatus::Completed)
    );

    let outcome = |label: &str| {
        stats
            .crawl_outcomes
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.count)
    };
    assert_eq!(outcome("validate/success"), Some(3));
    assert_eq!(outcome("validate/not_found"), Some(1));
    assert_eq!(outcome("fetch/success"), Some(3));
}

#[tokio::test]
async fn test_audit_log_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let config = load_test_config(&write_config(dir.path(), "audit-log = false")).unwrap();
    let shared = open_shared(&config);

    let mut sequencer = build_sequencer(&config, RegistryTransport::with_codes(KNOWN), &shared);
    sequencer.crawl_year(2020).await.unwrap();

    let storage = shared.lock();
    assert_eq!(storage.count_records().unwrap(), 3);
    assert!(storage.count_crawl_outcomes().unwrap().is_empty());
}

#[test]
fn test_load_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "max-consecutive-misses = 3");

    let config = load_test_config(&path).unwrap();
    let hash = compute_config_hash(&path).unwrap();

    assert_eq!(config.crawler.start_year, 2020);
    assert_eq!(config.crawler.end_year, Some(2020));
    assert_eq!(config.crawler.max_consecutive_misses, 3);
    assert_eq!(config.crawler.start_sequence, 2);
    assert_eq!(config.proxy.list, vec!["127.0.0.1:3128"]);
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), "max-requests-per-minute = 0");

    assert!(load_test_config(&path).is_err());
}
