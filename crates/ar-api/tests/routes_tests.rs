//! HTTP surface tests against in-memory store and queue fakes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use ar_api::{AppState, ResultStreamer};
use ar_common::{codec, Problem, ProblemData, ProblemName, ProblemStatus, ProblemType};
use ar_config::AppConfig;
use ar_queue::mock::MemoryQueue;
use ar_store::{MemoryStore, ProblemStore};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    queue: Arc<MemoryQueue>,
    streamer: ResultStreamer,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let streamer = ResultStreamer::default();
    let state = AppState::new(
        store.clone(),
        queue.clone(),
        streamer.clone(),
        Arc::new(AppConfig::default()),
    );
    TestApp {
        router: ar_api::build_router(state),
        store,
        queue,
        streamer,
    }
}

fn canonical_rows() -> Vec<&'static str> {
    vec![
        "530070000",
        "600195000",
        "098000060",
        "800060003",
        "400803001",
        "700020006",
        "060000280",
        "000419005",
        "000080079",
    ]
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_submit_ip_sudoku_returns_201_with_task_id() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_json(
            "/problems/ip/sudoku",
            serde_json::json!({ "grid": canonical_rows() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let task_id = body["task_id"].as_str().unwrap();
    assert_eq!(task_id.len(), 32);

    // persisted as IN_QUEUE and enqueued exactly once
    let record = app.store.load(task_id).await.unwrap().unwrap();
    assert_eq!(record.status, ProblemStatus::InQueue);
    assert_eq!(record.problem_type, ProblemType::Ip);
    assert_eq!(app.queue.work_messages().len(), 1);
}

#[tokio::test]
async fn test_submit_sat_sudoku_selects_sat_pipeline() {
    let app = test_app();
    let response = app
        .router
        .oneshot(post_json(
            "/problems/sat/sudoku",
            serde_json::json!({ "grid": canonical_rows() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let published = codec::decode_problem(&app.queue.work_messages()[0]).unwrap();
    assert_eq!(published.problem_id, body["task_id"].as_str().unwrap());
    assert_eq!(published.problem_type, ProblemType::Sat);
}

#[tokio::test]
async fn test_malformed_submission_never_reaches_coordinator() {
    let app = test_app();
    let mut rows = canonical_rows();
    rows[3] = "53007000"; // 8 characters

    let response = app
        .router
        .oneshot(post_json(
            "/problems/ip/sudoku",
            serde_json::json!({ "grid": rows }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // no KV write, no queue publish
    assert!(app.store.scan_ids().await.unwrap().is_empty());
    assert!(app.queue.work_messages().is_empty());
}

#[tokio::test]
async fn test_get_problem_round_trip_and_404() {
    let app = test_app();
    let mut grid = vec![vec![0u8; 9]; 9];
    grid[0][0] = 5;
    let problem = Problem::new(
        "deadbeef".to_string(),
        ProblemType::Ip,
        ProblemName::Sudoku,
        ProblemData::Sudoku { grid },
    );
    app.store.save(&problem).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/problems/deadbeef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["problem_id"], "deadbeef");
    assert_eq!(body["status"], "CREATED");

    let missing = app
        .router
        .oneshot(
            Request::builder()
                .uri("/problems/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_print_problem_renders_grid() {
    let app = test_app();
    let mut grid = vec![vec![0u8; 9]; 9];
    grid[0][0] = 5;
    grid[0][1] = 3;
    let problem = Problem::new(
        "printme".to_string(),
        ProblemType::Sat,
        ProblemName::Sudoku,
        ProblemData::Sudoku { grid },
    );
    app.store.save(&problem).await.unwrap();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/problems/print/printme")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("5 3 _"));
    assert!(text.contains("------|-------|------"));
}

#[tokio::test]
async fn test_ping_and_root() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"pong");

    let response = app
        .router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["name"], "Automated Reasoning API");
    assert_eq!(body["environment"], "local");
}

#[tokio::test]
async fn test_subscribe_stream_greets_and_times_out() {
    let app = test_app();
    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/problems/subscribe/sub-1?ttl=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache"
    );
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    // with no results published, the stream is: connected frame, then the
    // terminal timeout frame after ~1s
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#""type":"connected""#));
    assert!(text.contains(r#""problem_id":"sub-1""#));
    assert!(text.contains(r#""type":"timeout""#));
}

#[tokio::test]
async fn test_subscribe_stream_delivers_published_result() {
    let app = test_app();
    let streamer = app.streamer.clone();

    let response_future = app.router.oneshot(
        Request::builder()
            .uri("/problems/subscribe/sub-2?ttl=1")
            .body(Body::empty())
            .unwrap(),
    );

    let publisher = tokio::spawn(async move {
        // wait for the subscriber to register, then publish one result
        for _ in 0..50 {
            if streamer.subscriber_count("sub-2") > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        streamer.publish("sub-2", &serde_json::json!({"status": "SOLVED"}));
    });

    let response = response_future.await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    publisher.await.unwrap();

    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#""type":"connected""#));
    assert!(text.contains(r#""status":"SOLVED""#));
}
