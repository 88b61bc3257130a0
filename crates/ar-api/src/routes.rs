//! HTTP surface.
//!
//! - `POST /problems/ip/sudoku`, `POST /problems/sat/sudoku`: submit a grid.
//! - `GET /problems/{id}`: problem record as JSON.
//! - `GET /problems/print/{id}`: plain-text pretty grid.
//! - `GET /problems/subscribe/{id}?ttl=<sec>`: SSE stream of result events.
//! - `GET /ping`, `GET /`: health and metadata.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use ar_common::{Grid, ProblemData, ProblemName, ProblemType};

use crate::error::ApiError;
use crate::state::AppState;
use crate::streamer::Subscription;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/problems/ip/sudoku", post(post_ip_sudoku))
        .route("/problems/sat/sudoku", post(post_sat_sudoku))
        .route("/problems/:problem_id", get(get_problem))
        .route("/problems/print/:problem_id", get(print_problem))
        .route("/problems/subscribe/:problem_id", get(subscribe_problem))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "Automated Reasoning API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Solves CSP/SAT/IP problem submissions through a worker fleet.",
        "environment": state.config.environment,
        "timezone": state.config.timezone,
    }))
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Deserialize)]
struct SudokuCreateRequest {
    grid: Vec<String>,
}

/// Parse and validate the 9x9 grid of `[0-9_]` characters; underscores mark
/// empty cells and map to 0.
fn parse_grid(rows: &[String]) -> Result<Grid, ApiError> {
    if rows.len() != 9 {
        return Err(ApiError::Validation(format!(
            "grid must have exactly 9 rows, got {}",
            rows.len()
        )));
    }
    let mut grid = Vec::with_capacity(9);
    for (i, row) in rows.iter().enumerate() {
        if row.chars().count() != 9 {
            return Err(ApiError::Validation(format!(
                "row {} must have exactly 9 characters",
                i
            )));
        }
        let mut cells = Vec::with_capacity(9);
        for c in row.chars() {
            match c {
                '_' => cells.push(0),
                '0'..='9' => cells.push(c as u8 - b'0'),
                other => {
                    return Err(ApiError::Validation(format!(
                        "row {} contains invalid character '{}'",
                        i, other
                    )))
                }
            }
        }
        grid.push(cells);
    }
    Ok(grid)
}

async fn submit_sudoku(
    state: &AppState,
    problem_type: ProblemType,
    request: SudokuCreateRequest,
) -> Result<impl IntoResponse, ApiError> {
    let grid = parse_grid(&request.grid)?;
    let problem_id = state
        .coordinator
        .submit(problem_type, ProblemName::Sudoku, ProblemData::Sudoku { grid })
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "task_id": problem_id }))))
}

async fn post_ip_sudoku(
    State(state): State<AppState>,
    Json(request): Json<SudokuCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    submit_sudoku(&state, ProblemType::Ip, request).await
}

async fn post_sat_sudoku(
    State(state): State<AppState>,
    Json(request): Json<SudokuCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    submit_sudoku(&state, ProblemType::Sat, request).await
}

async fn get_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let problem = state
        .store
        .load(&problem_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(problem))
}

async fn print_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
) -> Result<String, ApiError> {
    let problem = state
        .store
        .load(&problem_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(problem.display_text())
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    ttl: Option<u64>,
}

enum StreamPhase {
    Greet,
    Listen,
    Closed,
}

struct StreamState {
    subscription: Subscription,
    ttl: Duration,
    phase: StreamPhase,
}

async fn subscribe_problem(
    State(state): State<AppState>,
    Path(problem_id): Path<String>,
    Query(params): Query<SubscribeParams>,
) -> impl IntoResponse {
    let ttl = Duration::from_secs(
        params
            .ttl
            .unwrap_or(state.config.stream.default_ttl_secs)
            .max(1),
    );
    let subscription = state.streamer.subscribe(&problem_id);

    let stream = event_stream(StreamState {
        subscription,
        ttl,
        phase: StreamPhase::Greet,
    });

    (
        AppendHeaders([
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ]),
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

/// Frames: an initial `connected`, one `data` frame per result event, a
/// terminal `timeout` after `ttl` with no delivery. Client disconnect drops
/// the stream, which closes the subscription.
fn event_stream(state: StreamState) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(state, |mut state| async move {
        match state.phase {
            StreamPhase::Greet => {
                state.phase = StreamPhase::Listen;
                let frame = json!({
                    "type": "connected",
                    "problem_id": state.subscription.problem_id(),
                    "ttl": state.ttl.as_secs(),
                });
                Some((Ok(Event::default().data(frame.to_string())), state))
            }
            StreamPhase::Listen => {
                match tokio::time::timeout(state.ttl, state.subscription.recv()).await {
                    Ok(Some(payload)) => {
                        Some((Ok(Event::default().data(payload.to_string())), state))
                    }
                    Ok(None) => None,
                    Err(_) => {
                        state.phase = StreamPhase::Closed;
                        let frame = json!({
                            "type": "timeout",
                            "message": "no messages received within TTL",
                            "ttl": state.ttl.as_secs(),
                        });
                        Some((Ok(Event::default().data(frame.to_string())), state))
                    }
                }
            }
            StreamPhase::Closed => None,
        }
    })
}
