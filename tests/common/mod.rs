// Each test binary compiles this module and uses a different subset of it.
#![allow(dead_code)]

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use docshare::auth::jwt::JwtService;
use docshare::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use docshare::db::{self, PgPool};
use docshare::ipfs::{ContentStore, StoredContent};
use docshare::ledger::{Ledger, LedgerError, LedgerReceipt};
use docshare::mailer::{MailMessage, Mailer};
use docshare::models::Job;
use docshare::routes;
use docshare::state::AppState;
use docshare::{default_handlers, Worker};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tower::util::ServiceExt;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TEST_PASSWORD: &str = "Secur3#Pass";

#[derive(Default)]
pub struct FakeContentStore {
    added: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn add(&self, bytes: Vec<u8>) -> Result<StoredContent> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("content store unavailable");
        }
        let cid = format!("bafy{}", &hex::encode(Sha256::digest(&bytes))[..32]);
        self.added.lock().await.push(bytes);
        Ok(StoredContent {
            path: format!("https://gateway.test/ipfs/{cid}/uploadedFile"),
            cid,
        })
    }
}

impl FakeContentStore {
    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn added_count(&self) -> usize {
        self.added.lock().await.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCall {
    pub aadhar: String,
    pub file_name: String,
    pub ipfs_path: String,
}

#[derive(Default)]
pub struct FakeLedger {
    calls: Mutex<Vec<LedgerCall>>,
    fail: AtomicBool,
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn store_document(
        &self,
        aadhar: &str,
        file_name: &str,
        ipfs_path: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let mut calls = self.calls.lock().await;
        calls.push(LedgerCall {
            aadhar: aadhar.to_string(),
            file_name: file_name.to_string(),
            ipfs_path: ipfs_path.to_string(),
        });
        let hash = format!("0xtx{:04}", calls.len());
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Reverted(hash));
        }
        Ok(LedgerReceipt {
            transaction_hash: hash,
            block_number: Some(calls.len() as u64),
        })
    }
}

impl FakeLedger {
    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().await.clone()
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: AtomicBool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("relay refused message");
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

impl FakeMailer {
    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    pub content: Arc<FakeContentStore>,
    pub ledger: Arc<FakeLedger>,
    pub mailer: Arc<FakeMailer>,
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is not set so suites can skip.
    pub async fn new() -> Result<Option<Self>> {
        Self::build(true).await
    }

    pub async fn without_ledger() -> Result<Option<Self>> {
        Self::build(false).await
    }

    async fn build(ledger_enabled: bool) -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ipfs_api_url: "http://ipfs.invalid".to_string(),
            ipfs_gateway_url: "https://gateway.test".to_string(),
            ledger_endpoint: None,
            ledger_contract: None,
            ledger_api_key: None,
            ledger_poll_interval_ms: 10,
            ledger_confirmation_timeout_secs: 1,
            mail_relay_url: None,
            mail_relay_api_key: None,
            mail_from: "no-reply@docshare.test".to_string(),
            embedded_worker: false,
            worker_poll_interval_ms: 10,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let content = Arc::new(FakeContentStore::default());
        let ledger = Arc::new(FakeLedger::default());
        let mailer = Arc::new(FakeMailer::default());
        let jwt = JwtService::from_config(&config)?;

        let content_for_state: Arc<dyn ContentStore> = content.clone();
        let ledger_for_state: Option<Arc<dyn Ledger>> = if ledger_enabled {
            Some(ledger.clone() as Arc<dyn Ledger>)
        } else {
            None
        };
        let mailer_for_state: Arc<dyn Mailer> = mailer.clone();

        let state = AppState::new(
            pool,
            config,
            content_for_state,
            ledger_for_state,
            mailer_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            content,
            ledger,
            mailer,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub async fn register(&self, full_name: &str, email: &str, aadhar: &str) -> Result<()> {
        let response = self
            .post_json(
                "/register",
                &json!({
                    "fullName": full_name,
                    "Email": email,
                    "Telephone": "9876543210",
                    "Aadhar": aadhar,
                    "Password": TEST_PASSWORD,
                }),
                None,
            )
            .await?;
        ensure_status(response, StatusCode::OK).await?;
        Ok(())
    }

    /// Uploads `content` for `aadhar` and returns the upload response body.
    pub async fn upload(&self, aadhar: &str, file_name: &str, content: &[u8]) -> Result<Value> {
        let response = self
            .post_json(
                "/uploadToIpfs",
                &json!({
                    "fileContent": STANDARD.encode(content),
                    "fileName": file_name,
                    "userAadhar": aadhar,
                    "fileSizeKB": content.len() as f64 / 1024.0,
                }),
                None,
            )
            .await?;
        ensure_status(response, StatusCode::OK).await
    }

    pub async fn login_token(&self, aadhar: &str, password: &str) -> Result<String> {
        let response = self
            .post_json(
                "/login",
                &json!({ "Aadhar": aadhar, "Password": password }),
                None,
            )
            .await?;
        let body = ensure_status(response, StatusCode::OK).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response missing access_token"))
    }

    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use docshare::schema::jobs;
            let rows = jobs::table
                .filter(jobs::job_type.eq(&ty))
                .order(jobs::created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    /// Runs queued jobs through the notification worker until none are due.
    pub async fn drain_jobs(&self) -> Result<usize> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        );
        let mut processed = 0;
        while worker.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path, None).await?;
        let body = ensure_status(response, StatusCode::OK).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body was not json")
}

/// Fails with the response body when the status does not match.
pub async fn ensure_status(response: hyper::Response<Body>, expected: StatusCode) -> Result<Value> {
    let status = response.status();
    let body = body_json(response).await?;
    if status != expected {
        bail!("expected {expected}, got {status}: {body}");
    }
    Ok(body)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&pool)?;
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE approved_requests, document_access_requests, document_paths, jobs, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
