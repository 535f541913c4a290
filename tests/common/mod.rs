//! In-process mock QuayDB server used by the integration tests.
//! Speaks just enough of the HTTP SQL protocol for the driver to exercise
//! login, execution, transaction setters, metadata and blob transfer.

// Each test binary uses a different subset of this module.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::task::JoinHandle;

pub const TOKEN: &str = "tok-1";

#[derive(Default)]
pub struct MockState {
    /// gzip negotiated at login; applied to every scalar/tabular body.
    pub gzip: bool,
    pub logged_out: bool,
    /// Committed blob objects.
    pub blobs: HashMap<String, Vec<u8>>,
    /// Objects mid-upload.
    pub partial: HashMap<String, Vec<u8>>,
    /// Number of non-final upload chunk requests received.
    pub upload_chunks: usize,
    /// When set, set_auto_commit answers with a remote fault.
    pub fail_set_autocommit: bool,
}

pub type Shared = Arc<Mutex<MockState>>;

// Abort the server task when a test ends, pass or fail.
pub struct Guard(pub JoinHandle<()>);
impl Drop for Guard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn encode(state: &MockState, body: String) -> Vec<u8> {
    if state.gzip {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap()
    } else {
        body.into_bytes()
    }
}

fn fault(state: &MockState, http: StatusCode, id: i64, msg: &str) -> (StatusCode, Vec<u8>) {
    let body = format!(r#"{{"status":"FAIL","error_id":{id},"error_message":"{msg}"}}"#);
    (http, encode(state, body))
}

fn check_session(state: &MockState, form: &HashMap<String, String>) -> Option<(StatusCode, Vec<u8>)> {
    if state.logged_out || form.get("session_id").map(|s| s.as_str()) != Some(TOKEN) {
        return Some(fault(state, StatusCode::UNAUTHORIZED, 1002, "invalid session"));
    }
    None
}

async fn login(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let mut state = shared.lock().unwrap();
    if form.get("user").map(|s| s.as_str()) != Some("quay")
        || form.get("password").map(|s| s.as_str()) != Some("quay")
    {
        // Login exchange is always plain.
        return (
            StatusCode::OK,
            br#"{"status":"FAIL","error_id":1001,"error_message":"bad credentials"}"#.to_vec(),
        );
    }
    state.gzip = form.get("gzip").map(|s| s.as_str()) == Some("true");
    state.logged_out = false;
    (
        StatusCode::OK,
        format!(r#"{{"status":"OK","session_id":"{TOKEN}"}}"#).into_bytes(),
    )
}

async fn logout(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let mut state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    state.logged_out = true;
    (StatusCode::OK, encode(&state, r#"{"status":"OK"}"#.to_string()))
}

const PEOPLE: &str = r#"{"status":"OK","row_count":3,
  "columns":["CUSTOMER_ID","NAME","CREATED","SCORE"],
  "rows":[["1","Alice","1700000000123","1.5"],
          ["2","NULL","1700000000456","2.5"],
          ["3","Bob","1700000000789","NULL"]]}"#;

async fn execute_query(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    let sql = form.get("sql").cloned().unwrap_or_default();
    if sql.contains("bad") {
        return fault(&state, StatusCode::OK, 4, "bad syntax");
    }
    (StatusCode::OK, encode(&state, PEOPLE.to_string()))
}

async fn execute_prepared(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    // Echo the bound parameters back as one row so tests can inspect the
    // wire encoding end to end.
    let count: usize = form.get("param_count").and_then(|c| c.parse().ok()).unwrap_or(0);
    let mut cols = Vec::new();
    let mut cells = Vec::new();
    for i in 1..=count {
        cols.push(format!("\"P{i}\""));
        let field = form.get(&format!("p{i}")).cloned().unwrap_or_default();
        cells.push(format!("{}", serde_json::to_string(&field).unwrap()));
    }
    let body = format!(
        r#"{{"status":"OK","row_count":1,"columns":[{}],"rows":[[{}]]}}"#,
        cols.join(","),
        cells.join(",")
    );
    (StatusCode::OK, encode(&state, body))
}

async fn execute(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    let sql = form.get("sql").cloned().unwrap_or_default();
    if sql.contains("bad") {
        return fault(&state, StatusCode::OK, 4, "bad syntax");
    }
    if sql.contains("denied") {
        return fault(&state, StatusCode::INTERNAL_SERVER_ERROR, 1102, "denied");
    }
    (StatusCode::OK, encode(&state, r#"{"status":"OK","update_count":3}"#.to_string()))
}

async fn scalar_ok(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    (StatusCode::OK, encode(&state, r#"{"status":"OK"}"#.to_string()))
}

async fn set_auto_commit(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    if state.fail_set_autocommit {
        return fault(&state, StatusCode::OK, 9, "not allowed");
    }
    (StatusCode::OK, encode(&state, r#"{"status":"OK"}"#.to_string()))
}

async fn get_metadata(
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    let topic = form.get("topic").cloned().unwrap_or_default();
    let body = format!(
        r#"{{"status":"OK","row_count":1,"columns":["TOPIC"],"rows":[["{topic}"]]}}"#
    );
    (StatusCode::OK, encode(&state, body))
}

async fn blob_upload(
    Path(id): Path<String>,
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let mut state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    let last = form.get("last").map(|s| s.as_str()) == Some("true");
    let data = form.get("data").cloned().unwrap_or_default();
    if last {
        let bytes = state.partial.remove(&id).unwrap_or_default();
        state.blobs.insert(id, bytes);
    } else {
        let chunk = match BASE64.decode(data.as_bytes()) {
            Ok(c) => c,
            Err(_) => return fault(&state, StatusCode::BAD_REQUEST, 2001, "bad chunk"),
        };
        state.partial.entry(id).or_default().extend_from_slice(&chunk);
        state.upload_chunks += 1;
    }
    (StatusCode::OK, encode(&state, r#"{"status":"OK"}"#.to_string()))
}

async fn blob_download(
    Path(id): Path<String>,
    State(shared): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Vec<u8>) {
    let state = shared.lock().unwrap();
    if let Some(resp) = check_session(&state, &form) {
        return resp;
    }
    match state.blobs.get(&id) {
        // Raw bytes, never compressed.
        Some(bytes) => (StatusCode::OK, bytes.clone()),
        None => (
            StatusCode::NOT_FOUND,
            format!(r#"{{"status":"FAIL","error_id":2002,"error_message":"no such object: {id}"}}"#)
                .into_bytes(),
        ),
    }
}

/// Start the mock server on an ephemeral localhost port.
/// Returns (guard, base_url, shared_state); dropping the guard stops it.
pub async fn start_mock() -> (Guard, String, Shared) {
    let shared: Shared = Arc::new(Mutex::new(MockState::default()));
    let app = Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/execute", post(execute))
        .route("/execute_query", post(execute_query))
        .route("/execute_prepared", post(execute_prepared))
        .route("/execute_call", post(execute_query))
        .route("/commit", post(scalar_ok))
        .route("/rollback", post(scalar_ok))
        .route("/set_auto_commit", post(set_auto_commit))
        .route("/set_isolation", post(scalar_ok))
        .route("/set_holdability", post(scalar_ok))
        .route("/get_metadata", post(get_metadata))
        .route("/blob_upload/{id}", post(blob_upload))
        .route("/blob_download/{id}", post(blob_download))
        .with_state(Arc::clone(&shared));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock server task error: {e:?}");
        }
    });
    (Guard(handle), format!("http://127.0.0.1:{port}"), shared)
}
