use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use window_stats::aggregator::WindowAggregator;
use window_stats::clock::{Clock, ManualClock};
use window_stats::model::{Statistics, Transaction};
use window_stats::server::{self, AppState};

struct TestServer {
    addr: SocketAddr,
    clock: Arc<ManualClock>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let now = DateTime::from_timestamp(1_700_000_000, 500_000_000).expect("valid instant");
        let clock = Arc::new(ManualClock::new(now));
        let state = AppState::new(Arc::new(WindowAggregator::new()), clock.clone());

        let bind_addr: SocketAddr = "127.0.0.1:0".parse().expect("valid socket addr");
        let listener = server::bind(bind_addr).await.expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(server::serve(listener, state, std::future::pending()));

        Self {
            addr,
            clock,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn post_transaction(&self, amount: f64, timestamp: i64) -> reqwest::Response {
        self.client
            .post(self.url("/transactions"))
            .json(&Transaction::new(amount, timestamp))
            .send()
            .await
            .expect("request should complete")
    }

    async fn statistics(&self) -> Statistics {
        self.client
            .get(self.url("/statistics"))
            .send()
            .await
            .expect("request should complete")
            .json()
            .await
            .expect("statistics json")
    }
}

#[tokio::test]
async fn accepted_transaction_returns_created() {
    let srv = TestServer::start().await;
    let ts = (srv.now() - Duration::seconds(20)).timestamp_millis();
    let resp = srv.post_transaction(100.0, ts).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn stale_transaction_returns_no_content_and_is_not_stored() {
    let srv = TestServer::start().await;
    let ts = (srv.now() - Duration::seconds(61)).timestamp_millis();
    let resp = srv.post_transaction(100.0, ts).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let health: serde_json::Value = srv
        .client
        .get(srv.url("/health"))
        .send()
        .await
        .expect("request should complete")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["buckets"], 0);
}

#[tokio::test]
/// The stale pre-check runs before the aggregator, so a non-positive timestamp
/// reads as stale rather than as a rejection.
async fn non_positive_timestamp_is_treated_as_stale() {
    let srv = TestServer::start().await;
    for ts in [0, -5_000] {
        let resp = srv.post_transaction(10.0, ts).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    let health: serde_json::Value = srv
        .client
        .get(srv.url("/health"))
        .send()
        .await
        .expect("request should complete")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["buckets"], 0);
    assert_eq!(srv.statistics().await, Statistics::empty());
}

#[tokio::test]
async fn zero_amount_is_unprocessable() {
    let srv = TestServer::start().await;
    let ts = (srv.now() - Duration::seconds(30)).timestamp_millis();
    let resp = srv.post_transaction(0.0, ts).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = resp.text().await.expect("body");
    assert!(body.contains("amount"));
}

#[tokio::test]
async fn future_transaction_is_unprocessable() {
    let srv = TestServer::start().await;
    let ts = (srv.now() + Duration::seconds(10)).timestamp_millis();
    let resp = srv.post_transaction(10.0, ts).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(srv.statistics().await, Statistics::empty());
}

#[tokio::test]
async fn malformed_payload_never_reaches_the_aggregator() {
    let srv = TestServer::start().await;
    let resp = srv
        .client
        .post(srv.url("/transactions"))
        .header("content-type", "application/json")
        .body(r#"{"amount": "lots"}"#)
        .send()
        .await
        .expect("request should complete");
    assert!(resp.status().is_client_error());
    assert_eq!(srv.statistics().await, Statistics::empty());
}

#[tokio::test]
async fn statistics_reflect_transactions_in_the_last_minute() {
    let srv = TestServer::start().await;
    let now = srv.now();
    for (amount, ms_ago) in [(50.0, 30), (60.0, 30), (40.0, 40), (40.0, 50)] {
        let ts = (now - Duration::milliseconds(ms_ago)).timestamp_millis();
        assert_eq!(srv.post_transaction(amount, ts).await.status(), StatusCode::CREATED);
    }

    let stats = srv.statistics().await;
    assert_eq!(stats.count, 4);
    assert!((stats.sum - 190.0).abs() < f64::EPSILON);
    assert!((stats.avg - 47.5).abs() < f64::EPSILON);
    assert!((stats.max - 60.0).abs() < f64::EPSILON);
    assert!((stats.min - 40.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn statistics_roll_forward_with_the_clock() {
    let srv = TestServer::start().await;
    let ts = (srv.now() - Duration::seconds(30)).timestamp_millis();
    assert_eq!(srv.post_transaction(100.0, ts).await.status(), StatusCode::CREATED);
    assert_eq!(srv.statistics().await.count, 1);

    srv.clock.advance(Duration::seconds(45));
    assert_eq!(srv.statistics().await, Statistics::empty());
}

#[tokio::test]
async fn empty_statistics_serialize_as_zeros() {
    let srv = TestServer::start().await;
    let body: serde_json::Value = srv
        .client
        .get(srv.url("/statistics"))
        .send()
        .await
        .expect("request should complete")
        .json()
        .await
        .expect("statistics json");
    assert_eq!(
        body,
        json!({ "sum": 0.0, "avg": 0.0, "max": 0.0, "min": 0.0, "count": 0 })
    );
}

#[tokio::test]
async fn clear_storage_resets_statistics() {
    let srv = TestServer::start().await;
    let ts = srv.now().timestamp_millis();
    assert_eq!(srv.post_transaction(100.0, ts).await.status(), StatusCode::CREATED);
    assert_eq!(srv.statistics().await.count, 1);

    let resp = srv
        .client
        .put(srv.url("/clear-storage"))
        .send()
        .await
        .expect("request should complete");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(srv.statistics().await, Statistics::empty());
}
