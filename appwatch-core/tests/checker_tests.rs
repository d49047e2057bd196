use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use appwatch_core::{
    build_client, AppOutcome, ConfigError, OutcomeCounts, RunConfig, RunStatus, UpdateChecker,
    VersionCache, VersionRecord,
};
use wiremock::matchers::{any, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, cache_path: &Path, push: &[(&str, &str)], app_ids: &str) -> RunConfig {
    let mut vars: HashMap<String, String> = push
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.insert("APP_IDS".into(), app_ids.into());
    vars.insert("APP_STORE_LOOKUP_URL".into(), format!("{}/lookup", server.uri()));
    vars.insert("BARK_SERVER".into(), server.uri());
    vars.insert("TELEGRAM_API_URL".into(), server.uri());
    vars.insert("VERSION_CACHE_PATH".into(), cache_path.display().to_string());
    vars.insert("REQUEST_TIMEOUT_SECS".into(), "2".into());
    RunConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid config")
}

fn bark_config(server: &MockServer, cache_path: &Path, app_ids: &str) -> RunConfig {
    config(
        server,
        cache_path,
        &[("PUSH_METHOD", "bark"), ("BARK_KEY", "devicekey")],
        app_ids,
    )
}

fn checker(config: &RunConfig) -> UpdateChecker {
    UpdateChecker::from_config(config, build_client(Duration::from_secs(2)).unwrap())
}

async fn mount_lookup(server: &MockServer, app_id: &str, version: &str) {
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("id", app_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resultCount": 1,
            "results": [{"trackName": format!("App {app_id}"), "version": version}]
        })))
        .mount(server)
        .await;
}

async fn mount_failing_lookup(server: &MockServer, app_id: &str) {
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("id", app_id))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

async fn seed_cache(cache_path: &Path, entries: &[(&str, &str)]) {
    let record: VersionRecord = entries.iter().copied().collect();
    VersionCache::new(cache_path).save(&record).await.unwrap();
}

async fn read_cache(cache_path: &Path) -> serde_json::Value {
    serde_json::from_slice(&tokio::fs::read(cache_path).await.unwrap()).unwrap()
}

#[tokio::test]
async fn first_run_initializes_without_notifying() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    mount_lookup(&server, "111", "2.0").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111");
    let summary = checker(&config).run(&config.app_ids).await;

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(
        summary.reports[0].outcome,
        AppOutcome::Initialized {
            app_name: "App 111".into(),
            version: "2.0".into()
        }
    );
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.0"}));
}

#[tokio::test]
async fn unchanged_version_sends_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    mount_lookup(&server, "111", "2.0").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111");
    let summary = checker(&config).run(&config.app_ids).await;

    assert!(matches!(summary.reports[0].outcome, AppOutcome::Unchanged { .. }));
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.0"}));
}

#[tokio::test]
async fn changed_version_sends_one_bark_push_and_updates_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    mount_lookup(&server, "111", "2.1").await;
    Mock::given(method("POST"))
        .and(path("/devicekey"))
        .and(body_string_contains("2.0"))
        .and(body_string_contains("2.1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111");
    let summary = checker(&config).run(&config.app_ids).await;

    assert_eq!(
        summary.reports[0].outcome,
        AppOutcome::Notified {
            app_name: "App 111".into(),
            previous: "2.0".into(),
            current: "2.1".into()
        }
    );
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.1"}));
}

#[tokio::test]
async fn changed_version_sends_telegram_message() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    mount_lookup(&server, "111", "2.1").await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_string_contains("2.0 → 2.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(
        &server,
        &cache_path,
        &[
            ("PUSH_METHOD", "telegram"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "42"),
        ],
        "111",
    );
    let summary = checker(&config).run(&config.app_ids).await;

    assert_eq!(summary.reports[0].outcome.label(), "changed+notified");
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.1"}));
}

#[tokio::test]
async fn app_missing_from_store_is_skipped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("id", "999"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"resultCount": 0, "results": []})),
        )
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "999");
    let summary = checker(&config).run(&config.app_ids).await;

    assert_eq!(summary.reports[0].app_id, "999");
    assert_eq!(summary.reports[0].outcome, AppOutcome::NotFound);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.0"}));
}

#[tokio::test]
async fn lookup_failure_does_not_block_other_apps() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "1.0"), ("222", "1.0")]).await;
    mount_failing_lookup(&server, "111").await;
    mount_lookup(&server, "222", "1.1").await;
    Mock::given(method("POST"))
        .and(path("/devicekey"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111,222");
    let summary = checker(&config).run(&config.app_ids).await;

    assert!(matches!(summary.reports[0].outcome, AppOutcome::LookupFailed { .. }));
    assert_eq!(summary.reports[1].outcome.label(), "changed+notified");
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(
        read_cache(&cache_path).await,
        serde_json::json!({"111": "1.0", "222": "1.1"})
    );
}

#[tokio::test]
async fn failed_push_still_advances_cache() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    mount_lookup(&server, "111", "2.1").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111");
    let summary = checker(&config).run(&config.app_ids).await;

    assert!(matches!(
        &summary.reports[0].outcome,
        AppOutcome::NotifyFailed { previous, current, .. } if previous == "2.0" && current == "2.1"
    ));
    assert_eq!(summary.status(), RunStatus::Degraded);
    assert_eq!(summary.exit_code(), 2);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({"111": "2.1"}));
}

#[tokio::test]
async fn duplicate_app_id_is_checked_twice_but_notified_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("111", "2.0")]).await;
    mount_lookup(&server, "111", "2.1").await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111,111");
    let summary = checker(&config).run(&config.app_ids).await;

    let labels: Vec<_> = summary.reports.iter().map(|r| r.outcome.label()).collect();
    assert_eq!(labels, vec!["changed+notified", "unchanged"]);
}

#[tokio::test]
async fn every_lookup_failing_fails_the_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    mount_failing_lookup(&server, "111").await;
    mount_failing_lookup(&server, "222").await;

    let config = bark_config(&server, &cache_path, "111,222");
    let summary = checker(&config).run(&config.app_ids).await;

    assert_eq!(summary.status(), RunStatus::Failed);
    assert_ne!(summary.exit_code(), 0);
    assert_eq!(read_cache(&cache_path).await, serde_json::json!({}));
}

#[tokio::test]
async fn cache_save_failure_degrades_the_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    tokio::fs::write(&blocker, b"not a directory").await.unwrap();
    let cache_path = blocker.join("version_cache.json");
    mount_lookup(&server, "111", "2.0").await;

    let config = bark_config(&server, &cache_path, "111");
    let summary = checker(&config).run(&config.app_ids).await;

    assert!(matches!(summary.reports[0].outcome, AppOutcome::Initialized { .. }));
    assert!(summary.cache_error.is_some());
    assert_eq!(summary.status(), RunStatus::Degraded);
    assert_eq!(summary.exit_code(), 2);
}

#[tokio::test]
async fn missing_telegram_chat_id_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let vars: HashMap<&str, String> = HashMap::from([
        ("PUSH_METHOD", "telegram".to_string()),
        ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
        ("APP_IDS", "111".to_string()),
        ("APP_STORE_LOOKUP_URL", format!("{}/lookup", server.uri())),
    ]);
    let err = RunConfig::from_lookup(|key| vars.get(key).cloned()).unwrap_err();

    assert!(matches!(err, ConfigError::MissingCredential("TELEGRAM_CHAT_ID", _)));
}

#[tokio::test]
async fn summary_counts_each_outcome() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("version_cache.json");
    seed_cache(&cache_path, &[("222", "1.0"), ("333", "1.0")]).await;
    mount_lookup(&server, "111", "2.0").await;
    mount_lookup(&server, "222", "1.0").await;
    mount_lookup(&server, "333", "1.1").await;
    mount_failing_lookup(&server, "444").await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("id", "999"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"resultCount": 0, "results": []})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = bark_config(&server, &cache_path, "111,222,333,444,999");
    let summary = checker(&config).run(&config.app_ids).await;

    let counts = summary.counts();
    assert_eq!(
        counts,
        OutcomeCounts {
            initialized: 1,
            unchanged: 1,
            notified: 1,
            notify_failed: 0,
            not_found: 1,
            lookup_failed: 1,
        }
    );
    assert_eq!(counts.skipped(), 2);
    assert_eq!(summary.status(), RunStatus::Success);
}
