use std::io;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use futures::StreamExt;
use log::{debug, error, warn};
use serde::Deserialize;
use shared::{ActionResponse, MissionList, MissionView, ResponseStatus, StudentView};

use crate::error::Error;
use crate::lifecycle::{self, LockOutcome};
use crate::mission::{Mission, Student};
use crate::status::{self, SubmissionStatus};
use crate::store::{Snapshot, Store};

#[derive(Clone)]
struct AppState {
    store: Store,
}

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/missions", get(list_missions))
        .route("/missions/:key", get(show_mission).post(upload))
        .route("/missions/:key/lock", post(lock))
        .route("/missions/:key/check", get(check))
        .with_state(AppState { store })
}

fn action(code: StatusCode, status: ResponseStatus, message: impl Into<String>) -> Response {
    (code, Json(ActionResponse::new(status, message))).into_response()
}

fn unauthenticated() -> Response {
    action(
        StatusCode::UNAUTHORIZED,
        ResponseStatus::Unauthenticated,
        "Please log in first.",
    )
}

fn not_found() -> Response {
    action(StatusCode::NOT_FOUND, ResponseStatus::NotFound, "Not found.")
}

fn error_response(error: Error) -> Response {
    let code = match &error {
        Error::SubmissionClosed => StatusCode::FORBIDDEN,
        Error::WrongExtension { .. } => StatusCode::BAD_REQUEST,
        Error::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::NothingToLock => StatusCode::CONFLICT,
        Error::Storage(_) | Error::RosterEmpty => {
            error!("Request failed: {}", error);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    action(code, error.status(), error.to_string())
}

/// The student named by the identity header, if the roster knows them.
fn authenticate(headers: &HeaderMap, snapshot: &Snapshot) -> Result<Student, Response> {
    let Some(value) = headers.get(shared::STUDENT_HEADER) else {
        debug!("Authentication error: {} not provided", shared::STUDENT_HEADER);
        return Err(unauthenticated());
    };
    let Ok(id) = value.to_str() else {
        warn!("Authentication error: {} is not text", shared::STUDENT_HEADER);
        return Err(unauthenticated());
    };
    snapshot.student(id).ok_or_else(|| {
        debug!("Authentication error: unknown student {}", id);
        unauthenticated()
    })
}

fn find_mission(snapshot: &Snapshot, key: &str) -> Result<Mission, Response> {
    snapshot.missions.get(key).cloned().ok_or_else(not_found)
}

/// Run filesystem work off the async executor.
async fn blocking<T: Send + 'static>(
    work: impl FnOnce() -> Result<T, Error> + Send + 'static,
) -> Result<T, Error> {
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(join_error) => Err(Error::Storage(io::Error::new(
            io::ErrorKind::Other,
            join_error,
        ))),
    }
}

async fn resolve(
    store: &Store,
    snapshot: &Snapshot,
    student: &Student,
    mission: &Mission,
) -> Result<SubmissionStatus, Error> {
    let received_path = store.layout().received_path.clone();
    let roster_size = snapshot.students.len();
    let (student, mission) = (student.clone(), mission.clone());
    blocking(move || status::resolve(&received_path, &student, &mission, roster_size)).await
}

fn mission_view(mission: &Mission, status: SubmissionStatus, has_checker: bool) -> MissionView {
    MissionView {
        key: mission.url_key.clone(),
        name: mission.name.clone(),
        description: mission.description.clone(),
        deadline: mission.deadline.to_rfc3339(),
        extension: mission.extension.clone(),
        max_size: mission.max_size,
        state: status.state,
        file_size: status.file.as_ref().map(|file| file.size),
        submitted_at: status.file.as_ref().map(|file| file.submitted_at.to_rfc3339()),
        finish_rate: status.finish_rate,
        seconds_remaining: status.time_remaining.num_seconds(),
        available: status.available,
        submitted: status.submitted,
        has_checker,
    }
}

#[derive(Deserialize)]
struct LoginQuery {
    id: String,
}

async fn login(State(state): State<AppState>, Query(query): Query<LoginQuery>) -> Response {
    match state.store.snapshot().student(&query.id) {
        Some(student) => Json(StudentView {
            id: student.id,
            name: student.name,
        })
        .into_response(),
        None => action(
            StatusCode::UNAUTHORIZED,
            ResponseStatus::Unauthenticated,
            "Unknown student id, please check it and try again.",
        ),
    }
}

async fn list_missions(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let snapshot = state.store.snapshot();
    let student = match authenticate(&headers, &snapshot) {
        Ok(student) => student,
        Err(response) => return response,
    };

    let mut keys: Vec<&String> = snapshot.missions.keys().collect();
    keys.sort();
    let mut missions = Vec::with_capacity(keys.len());
    for key in keys {
        let mission = &snapshot.missions[key];
        let status = match resolve(&state.store, &snapshot, &student, mission).await {
            Ok(status) => status,
            Err(error) => return error_response(error),
        };
        missions.push(mission_view(mission, status, snapshot.checkers.contains_key(key)));
    }
    let progress = if missions.is_empty() {
        None
    } else {
        let submitted = missions.iter().filter(|mission| mission.submitted).count();
        Some(100.0 * submitted as f64 / missions.len() as f64)
    };

    Json(MissionList {
        student: StudentView {
            id: student.id,
            name: student.name,
        },
        now: Local::now().to_rfc3339(),
        progress,
        missions,
    })
    .into_response()
}

async fn show_mission(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let snapshot = state.store.snapshot();
    let student = match authenticate(&headers, &snapshot) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let mission = match find_mission(&snapshot, &key) {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    match resolve(&state.store, &snapshot, &student, &mission).await {
        Ok(status) => {
            Json(mission_view(&mission, status, snapshot.checkers.contains_key(&key))).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Deserialize)]
struct UploadQuery {
    filename: String,
}

/// Buffer at most `limit + 1` bytes of the body, enough to tell whether it is too large.
async fn read_capped(body: Body, limit: u64) -> Result<Vec<u8>, axum::Error> {
    let cap = usize::try_from(limit.saturating_add(1)).unwrap_or(usize::MAX);
    let mut buffer = Vec::new();
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = cap - buffer.len();
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buffer.len() == cap {
            break;
        }
    }
    Ok(buffer)
}

async fn upload(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let snapshot = state.store.snapshot();
    let student = match authenticate(&headers, &snapshot) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let mission = match find_mission(&snapshot, &key) {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let payload = match read_capped(body, mission.max_size).await {
        Ok(payload) => payload,
        Err(error) => {
            warn!("Upload of {} for {} interrupted: {}", student.id, key, error);
            return action(
                StatusCode::BAD_REQUEST,
                ResponseStatus::StorageError,
                "The upload did not complete.",
            );
        }
    };

    let received_path = state.store.layout().received_path.clone();
    let result = blocking(move || {
        lifecycle::accept_upload(&received_path, &student, &mission, &payload[..], &query.filename)
    })
    .await;
    match result {
        Ok(_) => action(StatusCode::CREATED, ResponseStatus::Ok, "Upload succeeded."),
        Err(error) => error_response(error),
    }
}

async fn lock(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let snapshot = state.store.snapshot();
    let student = match authenticate(&headers, &snapshot) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let mission = match find_mission(&snapshot, &key) {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let received_path = state.store.layout().received_path.clone();
    match blocking(move || lifecycle::lock(&received_path, &student, &mission)).await {
        Ok(LockOutcome::Locked) => action(StatusCode::OK, ResponseStatus::Ok, "Locked."),
        Ok(LockOutcome::AlreadyLocked) => {
            action(StatusCode::OK, ResponseStatus::Ok, "Already locked.")
        }
        Err(error) => error_response(error),
    }
}

async fn check(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let snapshot = state.store.snapshot();
    let student = match authenticate(&headers, &snapshot) {
        Ok(student) => student,
        Err(response) => return response,
    };
    let mission = match find_mission(&snapshot, &key) {
        Ok(mission) => mission,
        Err(response) => return response,
    };
    let Some(checker) = snapshot.checkers.get(&key).cloned() else {
        return not_found();
    };
    let status = match resolve(&state.store, &snapshot, &student, &mission).await {
        Ok(status) => status,
        Err(error) => return error_response(error),
    };
    let Some(file) = status.file else {
        return action(
            StatusCode::NOT_FOUND,
            ResponseStatus::NotFound,
            "Nothing submitted yet, please submit first.",
        );
    };
    match blocking(move || Ok(checker.check(&file.path))).await {
        Ok(report) => Html(report).into_response(),
        Err(error) => error_response(error),
    }
}
