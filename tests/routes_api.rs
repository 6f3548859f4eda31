#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use kudos::auth::create_jwt;
use kudos::config::Config;
use kudos::repo::inmem::InMemRepo;
use kudos::routes::{config as api_routes, AppState};
use kudos::security::SecurityHeaders;
use serial_test::serial;
use std::sync::Arc;

const ADMIN_EMAIL: &str = "rh.admin@example.com";
const ADMIN_PASSWORD: &str = "0p3n-sesame-please";

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("ADMIN_EMAIL", ADMIN_EMAIL);
    std::env::set_var("ADMIN_PASSWORD", ADMIN_PASSWORD);
}

fn state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        config: Config::from_env().unwrap(),
    }
}

fn admin_token() -> String {
    create_jwt(ADMIN_EMAIL).unwrap()
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(web::Data::new(state()))
                .configure(api_routes),
        )
        .await
    };
}

fn valid_note(body: &str) -> serde_json::Value {
    serde_json::json!({
        "remetente_nome": "Ana",
        "destinatario_nome": "Bruno",
        "mensagem": body,
    })
}

#[actix_web::test]
#[serial]
async fn health_reports_connected_backend() {
    setup_env();
    let app = app!();

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["database"], "connected");
}

#[actix_web::test]
#[serial]
async fn login_validates_and_checks_credentials() {
    setup_env();
    let app = app!();

    // missing password
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&serde_json::json!({"email": ADMIN_EMAIL}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["success"], false);

    // wrong password: 401, same error as a wrong email
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&serde_json::json!({"email": ADMIN_EMAIL, "password": "nope"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let wrong_pw: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&serde_json::json!({"email": "who@else.test", "password": ADMIN_PASSWORD}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    let wrong_email: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(wrong_pw["error"], wrong_email["error"]);

    // correct pair: token plus user claims
    let req = test::TestRequest::post()
        .uri("/api/login")
        .set_json(&serde_json::json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["user"]["role"], "admin");
    let token = v["token"].as_str().unwrap().to_string();

    // the issued token passes verify-token
    let req = test::TestRequest::get()
        .uri("/api/verify-token")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["user"]["email"], ADMIN_EMAIL);
}

#[actix_web::test]
#[serial]
async fn public_create_validates_required_fields() {
    setup_env();
    let app = app!();

    // valid submission
    let req = test::TestRequest::post()
        .uri("/api/messages/public")
        .set_json(&valid_note("great talk"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["data"]["status"], "active");
    assert_eq!(v["data"]["is_printed"], false);
    assert!(v["data"]["printed_at"].is_null());

    // empty and missing fields are both a 400, storage untouched
    for bad in [
        serde_json::json!({"remetente_nome": "Ana", "destinatario_nome": "Bruno", "mensagem": ""}),
        serde_json::json!({"remetente_nome": "Ana", "destinatario_nome": "Bruno", "mensagem": "   "}),
        serde_json::json!({"destinatario_nome": "Bruno", "mensagem": "hi"}),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/messages/public")
            .set_json(&bad)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    let req = test::TestRequest::get().uri("/api/messages").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 1);
}

#[actix_web::test]
#[serial]
async fn protected_routes_distinguish_missing_from_invalid_token() {
    setup_env();
    let app = app!();

    // no Authorization header at all
    let req = test::TestRequest::get().uri("/api/messages/ordered").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // header present but not a valid token
    let req = test::TestRequest::get()
        .uri("/api/messages/ordered")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // real token
    let req = test::TestRequest::get()
        .uri("/api/messages/ordered")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // mutations are gated the same way
    let req = test::TestRequest::delete().uri("/api/messages/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn message_lifecycle_and_notification_polling() {
    setup_env();
    let app = app!();
    let token = admin_token();

    for body in ["first", "second", "third"] {
        let req = test::TestRequest::post()
            .uri("/api/messages")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .set_json(&valid_note(body))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }

    // public list: newest first
    let req = test::TestRequest::get().uri("/api/messages").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 3);
    assert_eq!(v["data"][0]["mensagem"], "third");

    // print the middle message
    let req = test::TestRequest::put()
        .uri("/api/messages/2/printed")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["data"]["is_printed"], true);
    assert!(!v["data"]["printed_at"].is_null());

    // ordered view: unprinted 3 and 1 first, printed 2 last
    let req = test::TestRequest::get()
        .uri("/api/messages/ordered")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let ids: Vec<i64> = v["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 1, 2]);

    // poll for anything newer than id 1
    let req = test::TestRequest::get()
        .uri("/api/messages/new?since_id=1&limit=50")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let ids: Vec<i64> = v["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2]);

    // two messages still unprinted
    let req = test::TestRequest::get()
        .uri("/api/messages/unread-count")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 2);

    // latest summaries carry no body
    let req = test::TestRequest::get()
        .uri("/api/messages/latest?limit=2")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 2);
    assert!(v["data"][0].get("mensagem").is_none());

    // delete one, then it is gone
    let req = test::TestRequest::delete()
        .uri("/api/messages/1")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::delete()
        .uri("/api/messages/1")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // bulk delete sweeps the remaining two, and only those
    let req = test::TestRequest::delete()
        .uri("/api/messages")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 2);

    let req = test::TestRequest::delete()
        .uri("/api/messages")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["count"], 0);
}

#[actix_web::test]
#[serial]
async fn update_changes_text_fields_only() {
    setup_env();
    let app = app!();
    let token = admin_token();

    let req = test::TestRequest::post()
        .uri("/api/messages/public")
        .set_json(&valid_note("typo herre"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let id = v["data"]["id"].as_i64().unwrap();

    // empty payload is a validation error
    let req = test::TestRequest::put()
        .uri(&format!("/api/messages/{id}"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // partial update fixes the body and leaves the names alone
    let req = test::TestRequest::put()
        .uri(&format!("/api/messages/{id}"))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"mensagem": "typo here"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["data"]["mensagem"], "typo here");
    assert_eq!(v["data"]["remetente_nome"], "Ana");

    // unknown id
    let req = test::TestRequest::put()
        .uri("/api/messages/999")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"mensagem": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn stats_reflect_active_rows() {
    setup_env();
    let app = app!();
    let token = admin_token();

    // empty set: all zeros
    let req = test::TestRequest::get().uri("/api/stats").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["data"]["total"], 0);
    assert_eq!(v["data"]["uniqueRecipients"], 0);

    // three notes to two recipients, one printed, one deleted
    for (recipient, body) in [("Bruno", "a"), ("Bruno", "b"), ("Carla", "c")] {
        let req = test::TestRequest::post()
            .uri("/api/messages/public")
            .set_json(&serde_json::json!({
                "remetente_nome": "Ana",
                "destinatario_nome": recipient,
                "mensagem": body,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }
    let req = test::TestRequest::put()
        .uri("/api/messages/3/printed")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    test::call_service(&app, req).await;
    let req = test::TestRequest::delete()
        .uri("/api/messages/1")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/api/stats").to_request();
    let resp = test::call_service(&app, req).await;
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["data"]["total"], 2);
    assert_eq!(v["data"]["printed"], 1);
    assert_eq!(v["data"]["uniqueRecipients"], 2);
    assert_eq!(v["data"]["recent"], 2);
}
