//! End-to-end reputation decisions against a real HTTP classifier.

mod common;

use common::{CountingCredentials, FakeClassifierApi, FakeEnricher};
use http::StatusCode;
use loginurl_gate::config::ClassifierConfig;
use loginurl_gate::security::{
    AllowCache, BanList, ChatClassifier, Decision, LocalAssessor, RandomCredentials,
    ReputationService, Secret,
};
use std::sync::Arc;
use std::time::Duration;

const CLEAN: &str = r#"{"is_vpn":false,"is_vps":false,"is_proxy":false,"confidence":10}"#;

fn service(
    enricher: Arc<FakeEnricher>,
    bans: &str,
    api: &FakeClassifierApi,
    timeout_ms: u64,
) -> ReputationService {
    let config = ClassifierConfig {
        base_url: api.base_url(),
        timeout_ms,
        ..ClassifierConfig::default()
    };
    let classifier = ChatClassifier::new(
        &config,
        Arc::new(RandomCredentials::new(vec![Secret::new("test-key-1")])),
    );
    let assessor = LocalAssessor::new(
        enricher,
        Arc::new(BanList::from_text(bans)),
        Arc::new(classifier),
    );
    ReputationService::new(Arc::new(assessor), Arc::new(AllowCache::new()))
}

fn counted_service(
    enricher: Arc<FakeEnricher>,
    bans: &str,
    api: &FakeClassifierApi,
    credentials: Arc<CountingCredentials>,
    max_calls_per_second: u32,
) -> ReputationService {
    let config = ClassifierConfig {
        base_url: api.base_url(),
        timeout_ms: 2000,
        max_calls_per_second,
        ..ClassifierConfig::default()
    };
    let assessor = LocalAssessor::new(
        enricher,
        Arc::new(BanList::from_text(bans)),
        Arc::new(ChatClassifier::new(&config, credentials)),
    );
    ReputationService::new(Arc::new(assessor), Arc::new(AllowCache::new()))
}

#[tokio::test]
async fn test_scenario_a_ban_match_blocks_without_classifier() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let enricher = Arc::new(FakeEnricher::new(&[("1.2.3.4", "Hosting Provider X")]));
    let svc = service(enricher, "hosting provider x\n", &api, 2000);

    assert_eq!(svc.evaluate("1.2.3.4").await, Decision::Blocked);
    assert_eq!(api.calls(), 0);
}

#[tokio::test]
async fn test_scenario_b_clean_verdict_allowed_and_cached() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let enricher = Arc::new(FakeEnricher::new(&[("5.6.7.8", "Residential Broadband")]));
    let svc = service(Arc::clone(&enricher), "hosting provider x\n", &api, 2000);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);

    assert_eq!(enricher.calls(), 1);
    assert_eq!(api.calls(), 1);
    assert_eq!(api.last_auth().as_deref(), Some("Bearer test-key-1"));
}

#[tokio::test]
async fn test_scenario_c_timeout_fails_open() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::from_secs(2)).await;
    let enricher = Arc::new(FakeEnricher::new(&[]));
    let svc = service(enricher, "", &api, 100);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(svc.stats().classifier_unavailable, 1);
}

#[tokio::test]
async fn test_scenario_c_unparseable_reply_fails_open() {
    let api = FakeClassifierApi::spawn("I am unable to classify this address.", Duration::ZERO).await;
    let enricher = Arc::new(FakeEnricher::new(&[]));
    let svc = service(enricher, "", &api, 2000);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(svc.stats().classifier_unavailable, 1);
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn test_flagged_verdict_blocks_every_time() {
    let api = FakeClassifierApi::spawn(
        r#"```json
{"is_vpn":false,"is_vps":true,"is_proxy":false,"presentence":70}
```"#,
        Duration::ZERO,
    )
    .await;
    let enricher = Arc::new(FakeEnricher::new(&[("9.9.9.9", "Cloud Compute Ltd")]));
    let svc = service(enricher, "", &api, 2000);

    assert_eq!(svc.evaluate("9.9.9.9").await, Decision::Blocked);
    assert_eq!(svc.evaluate("9.9.9.9").await, Decision::Blocked);
    // Blocked verdicts are not cached.
    assert_eq!(api.calls(), 2);
    assert!(svc.allow_cache().is_empty());
}

#[tokio::test]
async fn test_lifting_a_ban_takes_effect_immediately() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("banned.txt");
    std::fs::write(&path, "hosting provider x\n").unwrap();

    let bans = Arc::new(BanList::open(&path).unwrap());
    let config = ClassifierConfig {
        base_url: api.base_url(),
        ..ClassifierConfig::default()
    };
    let classifier = ChatClassifier::new(
        &config,
        Arc::new(RandomCredentials::new(vec![Secret::new("k")])),
    );
    let enricher = Arc::new(FakeEnricher::new(&[("1.2.3.4", "Hosting Provider X")]));
    let svc = ReputationService::new(
        Arc::new(LocalAssessor::new(enricher, Arc::clone(&bans), Arc::new(classifier))),
        Arc::new(AllowCache::new()),
    );

    assert_eq!(svc.evaluate("1.2.3.4").await, Decision::Blocked);

    std::fs::write(&path, "\n").unwrap();
    bans.reload().unwrap();
    assert_eq!(svc.evaluate("1.2.3.4").await, Decision::Allowed);
}

#[tokio::test]
async fn test_one_credential_per_clean_classification() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let credentials = Arc::new(CountingCredentials::new("pool-key"));
    let svc = counted_service(Arc::new(FakeEnricher::new(&[])), "", &api, Arc::clone(&credentials), 20);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(credentials.draws(), 1);
    assert_eq!(api.last_auth().as_deref(), Some("Bearer pool-key"));

    // Cached afterwards: no further draw.
    svc.evaluate("5.6.7.8").await;
    assert_eq!(credentials.draws(), 1);
}

#[tokio::test]
async fn test_failed_attempt_draws_no_second_credential() {
    let failing = FakeClassifierApi::spawn_with_status(
        StatusCode::INTERNAL_SERVER_ERROR,
        CLEAN,
        Duration::ZERO,
    )
    .await;
    let credentials = Arc::new(CountingCredentials::new("pool-key"));
    let svc = counted_service(Arc::new(FakeEnricher::new(&[])), "", &failing, Arc::clone(&credentials), 20);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(credentials.draws(), 1);
    assert_eq!(failing.calls(), 1);
    assert_eq!(svc.stats().classifier_unavailable, 1);

    let garbled = FakeClassifierApi::spawn("no idea, sorry", Duration::ZERO).await;
    let credentials = Arc::new(CountingCredentials::new("pool-key"));
    let svc = counted_service(Arc::new(FakeEnricher::new(&[])), "", &garbled, Arc::clone(&credentials), 20);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    assert_eq!(credentials.draws(), 1);
    assert_eq!(garbled.calls(), 1);
    assert_eq!(svc.stats().classifier_unavailable, 1);
}

#[tokio::test]
async fn test_no_credential_drawn_on_ban_match() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let credentials = Arc::new(CountingCredentials::new("pool-key"));
    let enricher = Arc::new(FakeEnricher::new(&[("1.2.3.4", "Hosting Provider X")]));
    let svc = counted_service(enricher, "hosting provider x\n", &api, Arc::clone(&credentials), 20);

    assert_eq!(svc.evaluate("1.2.3.4").await, Decision::Blocked);
    assert_eq!(svc.evaluate("1.2.3.4").await, Decision::Blocked);
    assert_eq!(credentials.draws(), 0);
}

#[tokio::test]
async fn test_no_credential_drawn_when_budget_refuses() {
    let api = FakeClassifierApi::spawn(CLEAN, Duration::ZERO).await;
    let credentials = Arc::new(CountingCredentials::new("pool-key"));
    let svc = counted_service(Arc::new(FakeEnricher::new(&[])), "", &api, Arc::clone(&credentials), 1);

    assert_eq!(svc.evaluate("5.6.7.8").await, Decision::Allowed);
    // Second address within the same second is throttled and fails open.
    assert_eq!(svc.evaluate("5.6.7.9").await, Decision::Allowed);

    assert_eq!(credentials.draws(), 1);
    assert_eq!(api.calls(), 1);
    assert_eq!(svc.stats().classifier_unavailable, 1);
}
