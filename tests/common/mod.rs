#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use inkpost::config::{Config, Environment};
use inkpost::db;
use inkpost::images::LocalImageHost;
use inkpost::mail::{Mail, MailError, Mailer};
use inkpost::state::{AppState, DbPool};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const PASSWORD: &str = "password123";

/// Smallest thing that passes for a PNG upload.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// Keeps every mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Mail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// A mail relay that is always down.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _mail: Mail) -> Result<(), MailError> {
        Err(MailError::Transport("mail relay unavailable".into()))
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub pool: DbPool,
    pub mails: Arc<RecordingMailer>,
    handle: tokio::task::JoinHandle<()>,
    dir: TempDir,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}, None).await
    }

    /// Same router as production on an ephemeral port, backed by a fresh
    /// database in a temp dir.
    pub async fn spawn_with(
        configure: impl FnOnce(&mut Config),
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_data_dir(dir.path());
        config.server.environment = Environment::Test;
        config.auth.bcrypt_cost = 4;
        configure(&mut config);

        let pool = db::create_pool(&config.db_path(), config.database.pool_size)
            .expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let mails = Arc::new(RecordingMailer::default());
        let mailer = mailer.unwrap_or_else(|| mails.clone() as Arc<dyn Mailer>);
        let images = Arc::new(LocalImageHost::new(config.uploads_path(), config.uploads_url()));
        let state = AppState::new(pool.clone(), config, mailer, images);
        let app = inkpost::app::build_router(state).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            pool,
            mails,
            handle,
            dir,
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    /// Number of image files currently stored under the uploads dir.
    pub fn stored_images(&self) -> usize {
        match std::fs::read_dir(self.dir.path().join("uploads")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        let conn = self.pool.get().unwrap();
        conn.query_row(
            "SELECT is_admin FROM users WHERE id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    pub fn last_mail(&self) -> Mail {
        self.mails
            .sent
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no mail was sent")
    }

    pub fn mail_count(&self) -> usize {
        self.mails.sent.lock().unwrap().len()
    }

    /// API path behind the verification link in the last mail.
    pub fn last_verify_path(&self) -> String {
        let segments = link_segments(&self.last_mail());
        let n = segments.len();
        assert_eq!(segments[n - 2], "verify");
        format!("/auth/{}/verify/{}", segments[n - 3], segments[n - 1])
    }

    /// API path behind the reset link in the last mail.
    pub fn last_reset_path(&self) -> String {
        let segments = link_segments(&self.last_mail());
        let n = segments.len();
        assert_eq!(segments[n - 3], "reset-password");
        format!("/password/reset/{}/{}", segments[n - 2], segments[n - 1])
    }

    pub async fn register(&self, username: &str, email: &str) -> Response {
        self.client
            .post(self.api("/auth/register"))
            .json(&json!({ "username": username, "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.api("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut request = self.client.get(self.api(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    /// Register, follow the verification link and log in.
    pub async fn signup(&self, username: &str) -> TestUser {
        let email = format!("{username}@example.com");
        let res = self.register(username, &email).await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = self.get(&self.last_verify_path(), None).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = self.login(&email, PASSWORD).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();

        TestUser {
            id: body["result"]["id"].as_str().unwrap().to_string(),
            token: body["result"]["token"].as_str().unwrap().to_string(),
            email,
        }
    }

    pub async fn create_category(&self, token: &str, title: &str) -> Response {
        self.client
            .post(self.api("/categories"))
            .bearer_auth(token)
            .json(&json!({ "title": title }))
            .send()
            .await
            .unwrap()
    }

    pub async fn create_post(
        &self,
        token: &str,
        title: &str,
        description: &str,
        category: Option<&str>,
    ) -> Response {
        let mut form = Form::new()
            .text("title", title.to_string())
            .text("description", description.to_string())
            .part("image", png_part());
        if let Some(category) = category {
            form = form.text("category", category.to_string());
        }
        self.client
            .post(self.api("/posts"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    /// Create a post and return its JSON.
    pub async fn post(&self, token: &str, title: &str) -> Value {
        let res = self
            .create_post(token, title, "A description that is long enough.", None)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    pub async fn comment(&self, token: &str, post_id: &str, text: &str) -> Response {
        self.client
            .post(self.api("/comments"))
            .bearer_auth(token)
            .json(&json!({ "postId": post_id, "text": text }))
            .send()
            .await
            .unwrap()
    }

    pub async fn toggle_like(&self, token: &str, post_id: &str) -> Response {
        self.client
            .put(self.api(&format!("/posts/{post_id}/like")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn png_part() -> Part {
    Part::bytes(PNG.to_vec())
        .file_name("cover.png")
        .mime_str("image/png")
        .unwrap()
}

fn link_segments(mail: &Mail) -> Vec<String> {
    let start = mail.html.find("href=\"").expect("mail has no link") + "href=\"".len();
    let end = start + mail.html[start..].find('"').unwrap();
    mail.html[start..end].split('/').map(str::to_string).collect()
}
