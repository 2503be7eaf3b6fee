use std::path::{Path, PathBuf};

pub static DB_SUBPATH: &str = "db";
pub static RECEIVED_SUBPATH: &str = "received";
pub static STUDENTS_FILE: &str = "students.json";
pub static MISSIONS_SUBPATH: &str = "missions";

/// Extension of mission definition files.
pub static MISSION_EXTENSION: &str = "json";
/// Extension of checker descriptor files.
pub static CHECKER_EXTENSION: &str = "yaml";

/// Where everything lives on disk, derived from a single root directory.
#[derive(Clone, Debug)]
pub struct Layout {
    pub db_path: PathBuf,
    pub received_path: PathBuf,
    pub students_path: PathBuf,
    pub missions_path: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        let db_path = root.join(DB_SUBPATH);
        Self {
            received_path: root.join(RECEIVED_SUBPATH),
            students_path: db_path.join(STUDENTS_FILE),
            missions_path: db_path.join(MISSIONS_SUBPATH),
            db_path,
        }
    }

    /// Create the watched directories so the watcher has something to attach to.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.missions_path)?;
        std::fs::create_dir_all(&self.received_path)
    }
}
