use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use shared::SubmissionState;
use tempfile::NamedTempFile;

use crate::error::Error;
use crate::mission::{Mission, Student};
use crate::status::{self, SubmittedFile};

#[derive(Debug, PartialEq, Eq)]
pub enum LockOutcome {
    Locked,
    AlreadyLocked,
}

/// Store an upload as the student's pending submission, replacing any earlier one.
///
/// Uploads larger than the mission's size limit are rejected, not truncated.
pub fn accept_upload(
    received_path: &Path,
    student: &Student,
    mission: &Mission,
    upload: impl Read,
    file_name: &str,
) -> Result<SubmittedFile, Error> {
    let (state, _) = status::file_state(received_path, student, mission)?;
    if !status::is_available(state, mission.deadline.signed_duration_since(Local::now())) {
        return Err(Error::SubmissionClosed);
    }
    if !mission.accepts_file_name(file_name) {
        return Err(Error::WrongExtension {
            expected: mission.extension.clone(),
        });
    }

    let target = mission.unconfirmed_path(received_path, student);
    let size = match write_pending(&mission.storage_dir(received_path), &target, upload, mission.max_size) {
        Ok(Some(size)) => size,
        Ok(None) => {
            info!(
                "{} exceeded the size limit of {}",
                student.id, mission.url_key
            );
            return Err(Error::FileTooLarge {
                limit: mission.max_size,
            });
        }
        Err(err) => {
            error!(
                "Could not store upload of {} for {}: {}",
                student.id, mission.url_key, err
            );
            return Err(Error::Storage(err));
        }
    };
    info!(
        "{} uploaded {} bytes for {}",
        student.id, size, mission.url_key
    );

    // The upload is committed at this point; a failing stat must not report otherwise.
    let submitted_at = match fs::metadata(&target).and_then(|metadata| metadata.modified()) {
        Ok(modified) => DateTime::from(modified),
        Err(err) => {
            warn!("Could not read modification time of {}: {}", target.display(), err);
            Local::now()
        }
    };
    Ok(SubmittedFile {
        path: target,
        size,
        submitted_at,
    })
}

/// Copy the upload into a hidden temporary file next to the target and rename it
/// into place. Returns `None` without touching the target when the upload is too large.
fn write_pending(
    directory: &Path,
    target: &Path,
    upload: impl Read,
    max_size: u64,
) -> io::Result<Option<u64>> {
    let mut temporary = NamedTempFile::new_in(directory)?;
    let size = io::copy(&mut upload.take(max_size.saturating_add(1)), &mut temporary)?;
    if size > max_size {
        return Ok(None);
    }
    temporary.flush()?;
    temporary.as_file().sync_all()?;
    temporary.persist(target).map_err(|err| err.error)?;
    Ok(Some(size))
}

/// Make the pending submission final by renaming it to the confirmed name.
pub fn lock(received_path: &Path, student: &Student, mission: &Mission) -> Result<LockOutcome, Error> {
    let (state, _) = status::file_state(received_path, student, mission)?;
    match state {
        SubmissionState::Locked => Ok(LockOutcome::AlreadyLocked),
        SubmissionState::Empty => Err(Error::NothingToLock),
        SubmissionState::Uploaded => {
            let unconfirmed = mission.unconfirmed_path(received_path, student);
            let confirmed = mission.confirmed_path(received_path, student);
            if let Err(err) = fs::rename(&unconfirmed, &confirmed) {
                error!(
                    "Could not lock {} for {}: {}",
                    unconfirmed.display(),
                    student.id,
                    err
                );
                return Err(Error::Storage(err));
            }
            info!("{} locked {}", student.id, mission.url_key);
            Ok(LockOutcome::Locked)
        }
    }
}
