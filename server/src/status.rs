use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use shared::SubmissionState;

use crate::error::Error;
use crate::mission::{Mission, Student};

#[derive(Clone, Debug, PartialEq)]
pub struct SubmittedFile {
    pub path: PathBuf,
    pub size: u64,
    pub submitted_at: DateTime<Local>,
}

/// State of one student's work on one mission, derived from the filesystem on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionStatus {
    pub state: SubmissionState,
    pub file: Option<SubmittedFile>,
    /// Percentage of the roster that has submitted, 0 to 100.
    pub finish_rate: f64,
    /// Negative once the deadline has passed.
    pub time_remaining: Duration,
    pub available: bool,
    pub submitted: bool,
}

fn submitted_file(path: PathBuf) -> std::io::Result<Option<SubmittedFile>> {
    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error),
    };
    Ok(Some(SubmittedFile {
        size: metadata.len(),
        submitted_at: DateTime::from(metadata.modified()?),
        path,
    }))
}

/// Classify the files of a student for a mission, creating the storage directory if needed.
pub fn file_state(
    received_path: &Path,
    student: &Student,
    mission: &Mission,
) -> Result<(SubmissionState, Option<SubmittedFile>), Error> {
    fs::create_dir_all(mission.storage_dir(received_path))?;
    if let Some(file) = submitted_file(mission.confirmed_path(received_path, student))? {
        return Ok((SubmissionState::Locked, Some(file)));
    }
    if let Some(file) = submitted_file(mission.unconfirmed_path(received_path, student))? {
        return Ok((SubmissionState::Uploaded, Some(file)));
    }
    Ok((SubmissionState::Empty, None))
}

/// A locked submission is final; otherwise work is accepted until the deadline.
pub fn is_available(state: SubmissionState, time_remaining: Duration) -> bool {
    if state == SubmissionState::Locked {
        return false;
    }
    time_remaining >= Duration::zero()
}

/// Everything the student page shows for one mission.
///
/// The roster must not be empty: the finish rate is a share of it, so an empty
/// roster is `Error::RosterEmpty`. HTTP callers always pass the roster the
/// authenticated student was found in.
pub fn resolve(
    received_path: &Path,
    student: &Student,
    mission: &Mission,
    roster_size: usize,
) -> Result<SubmissionStatus, Error> {
    resolve_at(received_path, student, mission, roster_size, Local::now())
}

pub fn resolve_at(
    received_path: &Path,
    student: &Student,
    mission: &Mission,
    roster_size: usize,
    now: DateTime<Local>,
) -> Result<SubmissionStatus, Error> {
    let (state, file) = file_state(received_path, student, mission)?;
    let time_remaining = mission.deadline.signed_duration_since(now);
    Ok(SubmissionStatus {
        state,
        file,
        finish_rate: finish_rate(received_path, mission, roster_size)?,
        time_remaining,
        available: is_available(state, time_remaining),
        submitted: state.is_submitted(),
    })
}

/// The student a submission file belongs to, as `{id}-{name}`.
fn submission_owner<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    if file_name.starts_with('.') {
        return None;
    }
    let (stem, file_extension) = file_name.rsplit_once('.')?;
    if file_extension != extension {
        return None;
    }
    Some(stem.strip_suffix(".unconfirmed").unwrap_or(stem))
}

/// Percentage of the roster with a submission in the mission's storage directory.
///
/// Counts distinct students, so a locked and a pending file of the same student
/// count once. Hidden files (uploads in progress) are not submissions.
pub fn finish_rate(received_path: &Path, mission: &Mission, roster_size: usize) -> Result<f64, Error> {
    if roster_size == 0 {
        return Err(Error::RosterEmpty);
    }
    let storage_dir = mission.storage_dir(received_path);
    fs::create_dir_all(&storage_dir)?;
    let mut owners = HashSet::new();
    for entry in fs::read_dir(&storage_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(owner) = submission_owner(file_name, &mission.extension) {
            owners.insert(owner.to_string());
        }
    }
    Ok(100.0 * owners.len() as f64 / roster_size as f64)
}
