use serde::{Deserialize, Serialize};

pub static CONFIG_QUALIFIER: &str = "";
pub static CONFIG_ORGANIZATION: &str = "Collector";
pub static CONFIG_APPLICATION: &str = "Collector";

/// Header carrying the (trusted) student identifier of a request.
pub static STUDENT_HEADER: &str = "x-student-id";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Empty,
    Uploaded,
    Locked,
}

impl SubmissionState {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionState::Uploaded | SubmissionState::Locked)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StudentView {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MissionView {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub deadline: String,
    pub extension: String,
    pub max_size: u64,
    pub state: SubmissionState,
    pub file_size: Option<u64>,
    pub submitted_at: Option<String>,
    pub finish_rate: f64,
    pub seconds_remaining: i64,
    pub available: bool,
    pub submitted: bool,
    pub has_checker: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MissionList {
    pub student: StudentView,
    pub now: String,
    /// Share of missions with a submission, absent when there are no missions.
    pub progress: Option<f64>,
    pub missions: Vec<MissionView>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ResponseStatus {
    FileTooLarge,
    InternalError,
    NotFound,
    NothingToLock,
    Ok,
    StorageError,
    SubmissionClosed,
    Unauthenticated,
    WrongExtension,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ActionResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl ActionResponse {
    pub fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}
