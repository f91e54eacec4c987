mod common;

use std::sync::Arc;

use common::{FailingMailer, TestServer, PASSWORD};
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn first_registrant_is_admin_and_client_flag_is_ignored() {
    let srv = TestServer::spawn().await;

    let alice = srv.signup("alice").await;
    assert!(srv.is_admin(&alice.id), "first user should become admin");

    let res = srv
        .client
        .post(srv.api("/auth/register"))
        .json(&json!({
            "username": "mallory",
            "email": "mallory@example.com",
            "password": PASSWORD,
            "isAdmin": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let conn = srv.pool.get().unwrap();
    let is_admin: bool = conn
        .query_row(
            "SELECT is_admin FROM users WHERE email = 'mallory@example.com'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!is_admin, "client-supplied isAdmin must be ignored");
}

#[tokio::test]
async fn duplicate_email_is_a_conflict_regardless_of_case() {
    let srv = TestServer::spawn().await;

    assert_eq!(
        srv.register("alice", "alice@example.com").await.status(),
        StatusCode::CREATED
    );
    let res = srv.register("alice2", "ALICE@example.com").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "user already exists");
    assert_eq!(srv.count("users"), 1);
}

#[tokio::test]
async fn invalid_registration_lists_every_bad_field() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.api("/auth/register"))
        .json(&json!({ "username": "a", "email": "nope", "password": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = res.json().await.unwrap();
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "password", "username"]);
    assert_eq!(srv.count("users"), 0);
}

#[tokio::test]
async fn unverified_login_resends_the_link() {
    let srv = TestServer::spawn().await;
    srv.register("alice", "alice@example.com").await;
    assert_eq!(srv.mail_count(), 1);

    let res = srv.login("alice@example.com", PASSWORD).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "we sent you an email, please verify your email address"
    );
    assert_eq!(srv.mail_count(), 2);

    // Only the latest link is live.
    let res = srv.get(&srv.last_verify_path(), None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn verification_link_works_once() {
    let srv = TestServer::spawn().await;
    srv.register("alice", "alice@example.com").await;
    let path = srv.last_verify_path();

    let res = srv.get(&path, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "your account verified");

    let res = srv.get(&path, None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "invalid link");
}

#[tokio::test]
async fn expired_verification_link_is_rejected() {
    let srv = TestServer::spawn().await;
    srv.register("alice", "alice@example.com").await;
    let path = srv.last_verify_path();

    srv.pool
        .get()
        .unwrap()
        .execute(
            "UPDATE verification_tokens SET expires_at = datetime('now', '-1 hours')",
            [],
        )
        .unwrap();

    let res = srv.get(&path, None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        srv.login("alice@example.com", PASSWORD).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn login_returns_token_and_cookie() {
    let srv = TestServer::spawn().await;
    srv.signup("alice").await;

    let res = srv.login("alice@example.com", PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("authToken="));
    assert!(cookie.contains("HttpOnly"));
    assert!(!cookie.contains("Secure"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["username"], "alice");
    assert!(body["result"]["token"].as_str().unwrap().len() > 20);
    assert!(body["result"].get("passwordHash").is_none());
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let srv = TestServer::spawn().await;
    srv.signup("alice").await;

    for (email, password) in [
        ("alice@example.com", "not-the-password"),
        ("nobody@example.com", PASSWORD),
    ] {
        let res = srv.login(email, password).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"], "invalid email or password");
    }
}

#[tokio::test]
async fn logout_clears_both_cookies() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.api("/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cookies: Vec<String> = res
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("authToken=;")));
    assert!(cookies.iter().any(|c| c.starts_with("userInfo=;")));
    for cookie in &cookies {
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }
}

#[tokio::test]
async fn password_reset_link_is_single_use() {
    let srv = TestServer::spawn().await;
    srv.signup("alice").await;

    let res = srv
        .client
        .post(srv.api("/password/reset-link"))
        .json(&json!({ "email": "alice@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let path = srv.last_reset_path();

    assert_eq!(srv.get(&path, None).await.status(), StatusCode::OK);

    let reset = |password: &'static str| {
        srv.client
            .post(srv.api(&path))
            .json(&json!({ "password": password }))
            .send()
    };
    assert_eq!(reset("brand-new-secret").await.unwrap().status(), StatusCode::OK);

    let res = reset("another-secret").await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "invalid link");
    assert_eq!(srv.get(&path, None).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(
        srv.login("alice@example.com", PASSWORD).await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        srv.login("alice@example.com", "brand-new-secret").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn reset_link_for_unknown_email_is_404() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.api("/password/reset-link"))
        .json(&json!({ "email": "nobody@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.mail_count(), 0);
}

#[tokio::test]
async fn mail_failure_is_500_but_user_is_kept() {
    let srv = TestServer::spawn_with(|_| {}, Some(Arc::new(FailingMailer))).await;

    let res = srv.register("alice", "alice@example.com").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Internal server error");
    assert!(body["stack"].as_str().unwrap().contains("Mail"));

    assert_eq!(srv.count("users"), 1);
    assert_eq!(srv.count("verification_tokens"), 1);
}
