//! End-to-end exercises of the expired-token path against a scripted local
//! provider: canned JSON bodies served per endpoint, with hit counters to pin
//! down exactly how many calls a pass makes.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use vitalsync::db::HealthStorage;
use vitalsync::providers::{FitbitClient, HealthPlanetClient};
use vitalsync::{Config, SyncService};

const EXPIRED_BODY: &str =
    r#"{"errors":[{"errorType":"expired_token","message":"Access token expired"}],"success":false}"#;
const STEPS_4321_BODY: &str = r#"{"activities-steps":[{"value":"4321"}]}"#;
const TOKEN_BODY: &str =
    r#"{"access_token":"access-1","refresh_token":"refresh-1","token_type":"Bearer","expires_in":28800}"#;

/// Scripted responses for one provider process. Bodies are popped per request
/// in order; an unscripted request gets a generic error payload and still
/// counts as a hit.
#[derive(Default)]
struct ProviderScript {
    steps_bodies: Mutex<VecDeque<&'static str>>,
    token_bodies: Mutex<VecDeque<&'static str>>,
    steps_hits: AtomicUsize,
    token_hits: AtomicUsize,
    total_hits: AtomicUsize,
}

impl ProviderScript {
    fn new(steps: &[&'static str], token: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            steps_bodies: Mutex::new(steps.iter().copied().collect()),
            token_bodies: Mutex::new(token.iter().copied().collect()),
            ..Self::default()
        })
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn serve_one(mut stream: tokio::net::TcpStream, script: Arc<ProviderScript>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > 64 * 1024 {
            return;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();

    // drain the request body so the client finishes writing cleanly
    let wanted = head_end + content_length(&head);
    while buf.len() < wanted {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let path = head.split_whitespace().nth(1).unwrap_or("");
    script.total_hits.fetch_add(1, Ordering::SeqCst);
    let body = if path.contains("/oauth2/token") {
        script.token_hits.fetch_add(1, Ordering::SeqCst);
        script.token_bodies.lock().unwrap().pop_front()
    } else {
        script.steps_hits.fetch_add(1, Ordering::SeqCst);
        script.steps_bodies.lock().unwrap().pop_front()
    }
    .unwrap_or(r#"{"errors":[{"errorType":"request","message":"unscripted request"}]}"#);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn spawn_provider(script: Arc<ProviderScript>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind scripted provider");
    let addr = listener.local_addr().expect("scripted provider addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_one(stream, script.clone()));
        }
    });

    Url::parse(&format!("http://{addr}/")).expect("scripted provider url")
}

fn temp_db_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut path = std::env::temp_dir();
    path.push(format!(
        "vitalsync-{}-{}-{}.sqlite",
        label,
        std::process::id(),
        nanos
    ));
    path
}

async fn service_against(provider_base: &Url, database_url: String) -> (SyncService, HealthStorage) {
    let cfg = Config {
        database_url,
        fitbit_client_id: "client-id".to_string(),
        fitbit_client_secret: "client-secret".to_string(),
        fitbit_api_base: provider_base.clone(),
        fitbit_token_url: provider_base.join("oauth2/token").expect("token url"),
        healthplanet_api_base: provider_base.clone(),
        ..Config::default()
    };

    let storage = HealthStorage::connect(&cfg.database_url)
        .await
        .expect("open temp sqlite");
    storage.init_schema().await.expect("init schema");

    let service = SyncService::new(
        storage.clone(),
        FitbitClient::new(&cfg),
        HealthPlanetClient::new(&cfg),
    );
    (service, storage)
}

async fn seed_fitbit_user(storage: &HealthStorage, access: &str, refresh: &str) -> i64 {
    let res = sqlx::query(
        "INSERT INTO user_credentials (fitbit_user_id, fitbit_access, fitbit_refresh) VALUES (?, ?, ?)",
    )
    .bind("FB-A")
    .bind(access)
    .bind(refresh)
    .execute(storage.pool())
    .await
    .expect("seed user");
    res.last_insert_rowid()
}

#[tokio::test]
async fn expired_token_refreshes_once_and_retries_once() {
    let script = ProviderScript::new(&[EXPIRED_BODY, STEPS_4321_BODY], &[TOKEN_BODY]);
    let base = spawn_provider(script.clone()).await;

    let db_path = temp_db_path("refresh-retry");
    let (service, storage) = service_against(&base, format!("sqlite:{}", db_path.display())).await;
    let id = seed_fitbit_user(&storage, "stale-access", "refresh-0").await;

    service.run_pass().await.expect("pass should complete");

    assert_eq!(script.steps_hits.load(Ordering::SeqCst), 2);
    assert_eq!(script.token_hits.load(Ordering::SeqCst), 1);

    let today = Local::now().date_naive();
    let row = storage
        .get_summary(id, today)
        .await
        .expect("read summary")
        .expect("summary row should exist");
    assert_eq!(row.steps, 4321);

    // the fresh pair was persisted before the retry
    let creds = storage.list_credentials().await.expect("list credentials");
    assert_eq!(creds[0].fitbit_access.as_deref(), Some("access-1"));
    assert_eq!(creds[0].fitbit_refresh.as_deref(), Some("refresh-1"));

    let _ = fs::remove_file(&db_path);
}

#[tokio::test]
async fn second_expiry_on_retry_degrades_without_another_exchange() {
    let script = ProviderScript::new(&[EXPIRED_BODY, EXPIRED_BODY], &[TOKEN_BODY]);
    let base = spawn_provider(script.clone()).await;

    let db_path = temp_db_path("second-expiry");
    let (service, storage) = service_against(&base, format!("sqlite:{}", db_path.display())).await;
    let id = seed_fitbit_user(&storage, "stale-access", "refresh-0").await;

    service.run_pass().await.expect("pass should complete");

    assert_eq!(script.steps_hits.load(Ordering::SeqCst), 2);
    // exactly one exchange; the retry's expiry is not refreshed again
    assert_eq!(script.token_hits.load(Ordering::SeqCst), 1);

    let today = Local::now().date_naive();
    let row = storage
        .get_summary(id, today)
        .await
        .expect("read summary")
        .expect("summary row should exist");
    assert_eq!(row.steps, 0);

    let _ = fs::remove_file(&db_path);
}

#[tokio::test]
async fn failed_exchange_leaves_stored_tokens_untouched() {
    // unscripted token endpoint: the exchange gets an error payload
    let script = ProviderScript::new(&[EXPIRED_BODY], &[]);
    let base = spawn_provider(script.clone()).await;

    let db_path = temp_db_path("failed-exchange");
    let (service, storage) = service_against(&base, format!("sqlite:{}", db_path.display())).await;
    let id = seed_fitbit_user(&storage, "stale-access", "refresh-0").await;

    service.run_pass().await.expect("pass should complete");

    assert_eq!(script.steps_hits.load(Ordering::SeqCst), 1);
    assert_eq!(script.token_hits.load(Ordering::SeqCst), 1);

    let creds = storage.list_credentials().await.expect("list credentials");
    assert_eq!(creds[0].fitbit_access.as_deref(), Some("stale-access"));
    assert_eq!(creds[0].fitbit_refresh.as_deref(), Some("refresh-0"));

    let today = Local::now().date_naive();
    let row = storage
        .get_summary(id, today)
        .await
        .expect("read summary")
        .expect("summary row should exist");
    assert_eq!(row.steps, 0);

    let _ = fs::remove_file(&db_path);
}

#[tokio::test]
async fn users_without_tokens_trigger_no_provider_calls() {
    let script = ProviderScript::new(&[], &[]);
    let base = spawn_provider(script.clone()).await;

    let db_path = temp_db_path("no-calls");
    let (service, storage) = service_against(&base, format!("sqlite:{}", db_path.display())).await;

    let res = sqlx::query("INSERT INTO user_credentials (fitbit_user_id) VALUES (?)")
        .bind("FB-A")
        .execute(storage.pool())
        .await
        .expect("seed user");
    let id = res.last_insert_rowid();

    service.run_pass().await.expect("pass should complete");

    assert_eq!(script.total_hits.load(Ordering::SeqCst), 0);

    let today = Local::now().date_naive();
    let row = storage
        .get_summary(id, today)
        .await
        .expect("read summary")
        .expect("summary row should exist");
    assert_eq!(row.steps, 0);
    assert_eq!(row.weight, 0.0);

    let _ = fs::remove_file(&db_path);
}
