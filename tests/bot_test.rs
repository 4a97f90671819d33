//! End-to-end runs against local fakes of the AQI API, Telegram, X and
//! Mastodon.

use aire_bot::config::{
    Config, MastodonConfig, RetryConfig, ScreenshotConfig, SourceConfig, TelegramConfig,
    TwitterConfig,
};
use aire_bot::{Bot, BotError};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Fakes {
    /// `None` makes the AQI API answer 503
    aqi_body: Arc<Mutex<Option<String>>>,
    telegram: Arc<Mutex<Vec<Value>>>,
    statuses: Arc<Mutex<Vec<Value>>>,
}

impl Fakes {
    fn set_sensors(&self, sensors: &[(&str, i64)]) {
        let body: Vec<Value> = sensors
            .iter()
            .map(|(name, index)| json!({"description": name, "source": name, "quality": {"index": index}}))
            .collect();
        *self.aqi_body.lock().unwrap() = Some(Value::Array(body).to_string());
    }

    fn take_down(&self) {
        *self.aqi_body.lock().unwrap() = None;
    }

    fn telegram_texts(&self) -> Vec<String> {
        self.telegram
            .lock()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn aqi(State(fakes): State<Fakes>) -> (StatusCode, String) {
    match fakes.aqi_body.lock().unwrap().clone() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::SERVICE_UNAVAILABLE, "down".to_string()),
    }
}

async fn send_message(State(fakes): State<Fakes>, Json(body): Json<Value>) -> Json<Value> {
    fakes.telegram.lock().unwrap().push(body);
    Json(json!({"ok": true}))
}

async fn create_status(State(fakes): State<Fakes>, Json(body): Json<Value>) -> Json<Value> {
    let mut statuses = fakes.statuses.lock().unwrap();
    statuses.push(body);
    Json(json!({"id": statuses.len().to_string()}))
}

async fn create_tweet() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"title": "Forbidden", "detail": "not permitted"})),
    )
}

async fn spawn_fakes() -> (SocketAddr, Fakes) {
    let fakes = Fakes::default();
    let app = Router::new()
        .route("/api/v1/aqi", get(aqi))
        .route("/bottest-token/sendMessage", post(send_message))
        .route("/api/v1/statuses", post(create_status))
        .route("/2/tweets", post(create_tweet))
        .with_state(fakes.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fakes)
}

fn test_config(addr: SocketAddr, data_path: &Path) -> Config {
    let base = format!("http://{addr}");
    let mut config = Config {
        source: SourceConfig {
            endpoint: format!("{base}/api/v1/aqi"),
            retry: RetryConfig {
                max_attempts: 2,
                backoff_factor_ms: 1,
                max_backoff: Duration::from_millis(5),
                ..RetryConfig::default()
            },
            ..SourceConfig::default()
        },
        screenshot: ScreenshotConfig {
            enabled: false,
            ..ScreenshotConfig::default()
        },
        telegram: Some(TelegramConfig {
            api_base: base.clone(),
            bot_token: "test-token".to_string(),
            chat_id: "42".to_string(),
            network_down_user: "@ops".to_string(),
        }),
        data_path: data_path.to_path_buf(),
        ..Config::default()
    };
    config.publish.twitter = Some(TwitterConfig {
        api_base: base.clone(),
        access_token: "x-token".to_string(),
    });
    config.publish.mastodon = Some(MastodonConfig {
        instance_url: base,
        access_token: "m-token".to_string(),
    });
    config
}

#[tokio::test]
async fn test_runs_detect_changes_and_outages() {
    let (addr, fakes) = spawn_fakes().await;
    let dir = tempfile::tempdir().unwrap();
    let mut bot = Bot::from_config(test_config(addr, dir.path())).unwrap();
    assert_eq!(bot.publisher_names(), vec!["twitter", "mastodon"]);

    // First run: no previous snapshot, the failing primary platform does not
    // stop the secondary one
    fakes.set_sensors(&[("Luque", 80), ("Asunción", 170), ("Limpio", 20)]);
    let report = bot.run().await.unwrap();

    assert!(report.diff.is_none());
    assert!(fakes.telegram_texts().is_empty());
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].platform, "twitter");
    assert!(!report.outcomes[0].is_success());
    assert_eq!(report.outcomes[1].platform, "mastodon");
    assert!(report.outcomes[1].is_success());

    let statuses = fakes.statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    let text = statuses[0]["status"].as_str().unwrap();
    assert!(text.starts_with("Koa nde aire? #AireLibre"));
    let worst = text.find("Asunción: 170").unwrap();
    let best = text.find("Limpio: 20").unwrap();
    assert!(worst < best);

    // Second run: one sensor went offline
    fakes.set_sensors(&[("Luque", 85), ("Limpio", 25)]);
    let report = bot.run().await.unwrap();

    let diff = report.diff.expect("snapshot from the first run");
    assert!(diff.appeared.is_none());
    assert_eq!(diff.disappeared.iter().collect::<Vec<_>>(), vec!["Asunción"]);
    let texts = fakes.telegram_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Caídos: Asunción"));
    assert_eq!(fakes.telegram.lock().unwrap()[0]["chat_id"], "42");

    // Third run: the source is down
    fakes.take_down();
    let result = bot.run().await;

    assert!(matches!(result, Err(BotError::Fetch(_))));
    let texts = fakes.telegram_texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[1], "-- HEY!!! Network down @ops");

    let stats = bot.stats().stats();
    assert_eq!(stats.runs, 3);
    assert_eq!(stats.fetch_failures, 1);
    assert_eq!(stats.alerts_sent, 2);
    assert_eq!(stats.posts_published, 2);
    assert_eq!(stats.publish_failures, 2);
    assert!(dir.path().join("stats.json").exists());
    assert!(dir.path().join("sensors.json").exists());
}

#[tokio::test]
async fn test_empty_payload_publishes_nothing() {
    let (addr, fakes) = spawn_fakes().await;
    let dir = tempfile::tempdir().unwrap();
    let mut bot = Bot::from_config(test_config(addr, dir.path())).unwrap();

    fakes.set_sensors(&[]);
    let report = bot.run().await.unwrap();

    assert!(report.readings.is_empty());
    assert!(report.outcomes.is_empty());
    assert!(fakes.statuses.lock().unwrap().is_empty());
}
