//! Bid Storm Load Client
//!
//! Fires concurrent bids at a running server and tallies the responses.
//!
//! Modes:
//! - `burst` (default): `GAVEL_STORM_COUNT` identical bids of
//!   `GAVEL_STORM_AMOUNT` on one auction. Exactly one should be accepted.
//! - `random`: bids with random amounts in 10000..=100000 from random
//!   bidders in 1..=1000. 200, 400 and 429 are all healthy outcomes;
//!   anything else counts as a failure.
//!
//! Usage:
//!   cargo run -p gavel-api --bin gavel-bid-storm -- [burst|random]

use std::collections::BTreeMap;
use std::time::Instant;

use futures_util::future::join_all;
use gavel_api::PlaceBidRequest;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Burst,
    Random,
}

#[derive(Debug, Clone)]
struct StormConfig {
    base_url: String,
    mode: Mode,
    count: usize,
    amount: i64,
    auction_id: i64,
    bidder_id: i64,
}

impl StormConfig {
    fn from_env_and_args() -> Self {
        let mode = std::env::args()
            .nth(1)
            .or_else(|| std::env::var("GAVEL_STORM_MODE").ok())
            .map(|m| {
                if m.eq_ignore_ascii_case("random") {
                    Mode::Random
                } else {
                    Mode::Burst
                }
            })
            .unwrap_or(Mode::Burst);

        Self {
            base_url: std::env::var("GAVEL_STORM_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/v1".to_string()),
            mode,
            count: env_or("GAVEL_STORM_COUNT", 30usize).max(1),
            amount: env_or("GAVEL_STORM_AMOUNT", 12000),
            auction_id: env_or("GAVEL_STORM_AUCTION", 1),
            bidder_id: env_or("GAVEL_STORM_BIDDER", 1),
        }
    }

    fn requests(&self) -> Vec<PlaceBidRequest> {
        let mut rng = rand::rng();
        (0..self.count)
            .map(|_| match self.mode {
                Mode::Burst => PlaceBidRequest {
                    bidder_id: self.bidder_id,
                    auction_id: self.auction_id,
                    amount: self.amount,
                },
                Mode::Random => PlaceBidRequest {
                    bidder_id: rng.random_range(1..=1000),
                    auction_id: self.auction_id,
                    amount: rng.random_range(10000..=100000),
                },
            })
            .collect()
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// `None` means the request never got a response.
async fn send_bid(client: &reqwest::Client, url: &str, req: &PlaceBidRequest) -> Option<u16> {
    match client.post(url).json(req).send().await {
        Ok(response) => Some(response.status().as_u16()),
        Err(e) => {
            eprintln!("[ERROR] request failed: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let config = StormConfig::from_env_and_args();
    let url = format!("{}/bid", config.base_url.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let requests = config.requests();

    println!(
        "Starting {:?} storm: {} bids against {}",
        config.mode, config.count, url
    );

    let start = Instant::now();
    let results = join_all(requests.iter().map(|req| send_bid(&client, &url, req))).await;
    let elapsed = start.elapsed();

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for result in &results {
        let key = result.map_or_else(|| "no response".to_string(), |s| s.to_string());
        *by_status.entry(key).or_default() += 1;
    }

    println!("{}", "-".repeat(30));
    println!("Elapsed time: {:.4} seconds", elapsed.as_secs_f64());
    for (status, count) in &by_status {
        println!("  {:>12}: {}", status, count);
    }

    let accepted = results.iter().filter(|r| **r == Some(200)).count();
    let passed = match config.mode {
        Mode::Burst => {
            println!("Successful bids (200): {} (expected: 1)", accepted);
            accepted == 1
        }
        Mode::Random => {
            let failures = results
                .iter()
                .filter(|r| !matches!(r, Some(200) | Some(400) | Some(429)))
                .count();
            println!("Unexpected outcomes: {}", failures);
            failures == 0
        }
    };

    if passed {
        println!("Storm passed.");
    } else {
        println!("Storm failed.");
        std::process::exit(1);
    }
}
