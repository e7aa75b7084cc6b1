//! HTTP and WebSocket surface over a real listener.
//!
//! Starts the full router on an ephemeral port with in-memory backends and
//! drives it with reqwest and a tungstenite client.

use std::time::Duration;

use futures_util::StreamExt;
use gavel_api::{ApiError, BidResponse, ErrorCode, LockService};
use gavel_core::{Auction, User};
use gavel_storage::MessageBus;
use reqwest::StatusCode;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[path = "support/backends.rs"]
mod backends;
#[path = "support/server.rs"]
mod server;

async fn post_bid(
    client: &reqwest::Client,
    base: &str,
    auction_id: i64,
    amount: i64,
) -> reqwest::Response {
    client
        .post(format!("{base}/api/v1/bid"))
        .json(&json!({"bidderId": 1, "auctionId": auction_id, "amount": amount}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn bid_status_codes() {
    let b = backends::start(100).await;
    let addr = server::spawn_server(b.runtime.state(), &b.config).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let res = post_bid(&client, &base, 1, 150).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: BidResponse = res.json().await.unwrap();
    assert_eq!((body.status.as_str(), body.new_price), ("success", 150));

    let res = post_bid(&client, &base, 1, 120).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = res.json().await.unwrap();
    assert_eq!(err.code, ErrorCode::BidTooLow);
    assert!(err.message.contains("150"));

    let res = post_bid(&client, &base, 999, 150).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: ApiError = res.json().await.unwrap();
    assert_eq!(err.code, ErrorCode::AuctionNotFound);

    let locks = LockService::new(b.kv.clone());
    let held = locks
        .acquire("auction:1", Duration::from_secs(5))
        .await
        .unwrap()
        .expect("free lock");
    let res = post_bid(&client, &base, 1, 500).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let err: ApiError = res.json().await.unwrap();
    assert_eq!(err.code, ErrorCode::LockContended);
    locks.release("auction:1", &held).await.unwrap();

    b.kv.set_available(false);
    let res = post_bid(&client, &base, 1, 500).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    b.kv.set_available(true);

    b.runtime.shutdown().await;
}

#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let b = backends::start(100).await;
    let addr = server::spawn_server(b.runtime.state(), &b.config).await;
    let res = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/bid"))
        .json(&json!({"user_id": 1, "auction_id": 1, "amount": 175}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    b.runtime.shutdown().await;
}

#[tokio::test]
async fn user_and_auction_routes() {
    let b = backends::start(100).await;
    let addr = server::spawn_server(b.runtime.state(), &b.config).await;
    let base = format!("http://{addr}/api/v1");
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{base}/users"))
        .json(&json!({"username": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bob: User = res.json().await.unwrap();
    assert_eq!(bob.username, "bob");

    let res = client
        .post(format!("{base}/users"))
        .json(&json!({"username": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{base}/auctions"))
        .json(&json!({"item_name": "iPhone 15", "current_price": 500}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let phone: Auction = res.json().await.unwrap();
    assert_eq!(phone.current_price, 500);

    let res = client
        .post(format!("{base}/auctions"))
        .json(&json!({"item_name": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let all: Vec<Auction> = client
        .get(format!("{base}/auctions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let res = client.get(format!("{base}/auctions/42")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = client
        .get(format!("{base}/auctions/42/bids"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    b.runtime.shutdown().await;
}

#[tokio::test]
async fn root_health_and_metrics() {
    let b = backends::start(100).await;
    let addr = server::spawn_server(b.runtime.state(), &b.config).await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let root: serde_json::Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["message"], "Auction server is running");

    let ping = client.get(format!("{base}/health/ping")).send().await.unwrap();
    assert_eq!(ping.text().await.unwrap(), "pong");

    let ready = client.get(format!("{base}/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    b.repo.set_available(false);
    let ready = client.get(format!("{base}/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = ready.json().await.unwrap();
    assert_eq!(body["details"]["database"]["status"], "unhealthy");
    assert_eq!(body["details"]["cache"]["status"], "healthy");
    b.repo.set_available(true);

    let metrics = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    assert!(metrics.text().await.unwrap().contains("gavel_http_requests_total"));

    b.runtime.shutdown().await;
}

#[tokio::test]
async fn observer_receives_accepted_bid() {
    let b = backends::start(100).await;
    let state = b.runtime.state();
    let addr = server::spawn_server(state.clone(), &b.config).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/api/v1/ws")).await.unwrap();
    assert!(backends::wait_until(Duration::from_secs(2), || state.registry.len() == 1).await);

    // Wait until the listener is subscribed, using a marker payload.
    let marker = r#"{"auctionId":0,"newPrice":0}"#;
    let mut subscribed = false;
    for _ in 0..100 {
        b.kv.publish(&b.config.price_channel, marker).await.unwrap();
        if let Ok(Some(Ok(Message::Text(_)))) =
            tokio::time::timeout(Duration::from_millis(20), socket.next()).await
        {
            subscribed = true;
            break;
        }
    }
    assert!(subscribed, "listener never subscribed");

    let res = post_bid(&reqwest::Client::new(), &format!("http://{addr}"), 1, 150).await;
    assert_eq!(res.status(), StatusCode::OK);

    let update = loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("update within deadline")
            .expect("socket open")
            .unwrap();
        if let Message::Text(text) = frame {
            if text.as_str() != marker {
                break text;
            }
        }
    };
    assert_eq!(update.as_str(), r#"{"auctionId":1,"newPrice":150}"#);

    drop(socket);
    assert!(backends::wait_until(Duration::from_secs(2), || state.registry.is_empty()).await);

    b.runtime.shutdown().await;
}
