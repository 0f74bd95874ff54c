//! HTTP-level tests for the job and asset endpoints, driven through the
//! full middleware stack with an in-memory store.

mod common;

use std::time::Duration;

use atelier_provider::ProviderError;
use axum::http::{Method, StatusCode};
use common::{
    body_json, build_test_app, build_test_app_with, get, post, post_json, send, submit_body,
    test_config, OTHER_SCOPE,
};
use serde_json::json;

async fn submit(app: &common::TestApp, variations: i32) -> i64 {
    let response = post_json(&app.router, "/api/v1/jobs", submit_body(variations)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["job_id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_reports_ok_with_request_id() {
    let app = build_test_app();
    let response = get(&app.router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json.get("db_healthy").is_none());
}

#[tokio::test]
async fn submitted_job_starts_queued() {
    let app = build_test_app();
    let job_id = submit(&app, 2).await;

    let json = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(json["data"]["id"], job_id);
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["variations"], 2);
    assert!(json["data"].get("result").is_none());
}

#[tokio::test]
async fn missing_scope_header_is_unauthorized() {
    let app = build_test_app();
    let response = send(
        &app.router,
        Method::POST,
        "/api/v1/jobs",
        None,
        Some(submit_body(1)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let app = build_test_app();

    let response = post_json(&app.router, "/api/v1/jobs", submit_body(0)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    let mut blank = submit_body(1);
    blank["prompt"] = json!("   ");
    let response = post_json(&app.router, "/api/v1/jobs", blank).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app.router,
        Method::POST,
        "/api/v1/jobs",
        Some(77),
        Some(submit_body(1)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNKNOWN_SCOPE");

    let listed = body_json(get(&app.router, "/api/v1/jobs").await).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn dispatch_completes_jobs_and_assets_resolve() {
    let app = build_test_app();
    let job_id = submit(&app, 3).await;

    let summary = body_json(post(&app.router, "/api/v1/jobs/dispatch").await).await;
    assert_eq!(
        summary["data"],
        json!({"processed": 1, "successful": 1, "failed": 0, "canceled": 0, "unrecorded": 0})
    );

    let job = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(job["data"]["status"], "done");
    let ids: Vec<String> = job["data"]["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);

    let uri = format!("/api/v1/assets?ids={}", ids.join(","));
    let assets = body_json(get(&app.router, &uri).await).await;
    let assets = assets["data"].as_array().unwrap();
    assert_eq!(assets.len(), 3);
    for (i, asset) in assets.iter().enumerate() {
        assert_eq!(asset["variation_index"], i as i64);
        assert!(asset["location"].as_str().unwrap().starts_with("memory://"));
    }

    let empty = body_json(post(&app.router, "/api/v1/jobs/dispatch").await).await;
    assert_eq!(empty["data"]["processed"], 0);
}

#[tokio::test]
async fn provider_errors_surface_on_the_job() {
    let app = build_test_app_with(
        test_config(),
        Some(ProviderError::RateLimited {
            message: "quota".into(),
            retry_after_secs: None,
        }),
    );
    let job_id = submit(&app, 1).await;
    post(&app.router, "/api/v1/jobs/dispatch").await;

    let job = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
    assert_eq!(job["data"]["status"], "failed");
    assert_eq!(job["data"]["error"]["code"], "rate_limited");
    assert!(job["data"].get("result").is_none());
}

#[tokio::test]
async fn cancel_is_idempotent_and_terminal_noop() {
    let app = build_test_app();
    let job_id = submit(&app, 1).await;
    let uri = format!("/api/v1/jobs/{job_id}/cancel");

    let first = body_json(post(&app.router, &uri).await).await;
    assert_eq!(first["data"], json!({"canceled": true, "status": "canceled"}));

    let second = body_json(post(&app.router, &uri).await).await;
    assert_eq!(second["data"], json!({"canceled": false, "status": "canceled"}));

    let done_id = submit(&app, 1).await;
    post(&app.router, "/api/v1/jobs/dispatch").await;
    let response = post(&app.router, &format!("/api/v1/jobs/{done_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"],
        json!({"canceled": false, "status": "done"})
    );
}

#[tokio::test]
async fn jobs_of_other_scopes_are_not_found() {
    let app = build_test_app();
    let job_id = submit(&app, 1).await;

    for (method, uri) in [
        (Method::GET, format!("/api/v1/jobs/{job_id}")),
        (Method::POST, format!("/api/v1/jobs/{job_id}/cancel")),
    ] {
        let response = send(&app.router, method, &uri, Some(OTHER_SCOPE), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    let response = get(&app.router, "/api/v1/jobs/9999").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = build_test_app();
    let first = submit(&app, 1).await;
    let second = submit(&app, 1).await;
    post(&app.router, &format!("/api/v1/jobs/{first}/cancel")).await;

    let queued = body_json(get(&app.router, "/api/v1/jobs?status=queued").await).await;
    let queued = queued["data"].as_array().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0]["id"], second);

    let all = body_json(get(&app.router, "/api/v1/jobs?limit=10").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_asset_ids_are_bad_requests() {
    let app = build_test_app();
    let response = get(&app.router, "/api/v1/assets?ids=1,abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn submission_triggers_an_immediate_dispatch() {
    let mut config = test_config();
    config.dispatch_on_submit = true;
    let app = build_test_app_with(config, None);
    let job_id = submit(&app, 1).await;

    let mut status = String::new();
    for _ in 0..100 {
        let job = body_json(get(&app.router, &format!("/api/v1/jobs/{job_id}")).await).await;
        status = job["data"]["status"].as_str().unwrap().to_string();
        if status == "done" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, "done");
}
