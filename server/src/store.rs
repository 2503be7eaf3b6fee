use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::checker::{self, Checkers};
use crate::layout::{Layout, CHECKER_EXTENSION, MISSION_EXTENSION};
use crate::mission::{Mission, Student};

/// Student id to display name.
pub type Roster = HashMap<String, String>;
pub type Missions = HashMap<String, Mission>;

/// The three collections as they were at one instant. Take one per request.
#[derive(Clone)]
pub struct Snapshot {
    pub students: Arc<Roster>,
    pub missions: Arc<Missions>,
    pub checkers: Arc<Checkers>,
}

impl Snapshot {
    pub fn student(&self, id: &str) -> Option<Student> {
        self.students.get(id).map(|name| Student {
            id: id.to_string(),
            name: name.clone(),
        })
    }
}

struct Inner {
    layout: Layout,
    students: RwLock<Arc<Roster>>,
    missions: RwLock<Arc<Missions>>,
    checkers: RwLock<Arc<Checkers>>,
}

/// Students, missions and checkers mirrored from the data directory.
///
/// Every reload builds a complete new collection and swaps it in, so readers see
/// either the old or the new collection and never a partial one.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

fn read<T>(lock: &RwLock<Arc<T>>) -> Arc<T> {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace<T>(lock: &RwLock<Arc<T>>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
}

/// Files with the given extension anywhere below `directory`.
fn find_files(directory: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!("Could not scan {}: {}", directory.display(), error);
                continue;
            }
        };
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == extension) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    return found;
}

impl Store {
    /// An empty store. Call `reload_all` to populate it.
    pub fn new(layout: Layout) -> Self {
        Self {
            inner: Arc::new(Inner {
                layout,
                students: RwLock::new(Arc::default()),
                missions: RwLock::new(Arc::default()),
                checkers: RwLock::new(Arc::default()),
            }),
        }
    }

    /// A store populated from disk.
    pub fn load(layout: Layout) -> Self {
        let store = Self::new(layout);
        store.reload_all();
        return store;
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            students: self.students(),
            missions: self.missions(),
            checkers: self.checkers(),
        }
    }

    pub fn students(&self) -> Arc<Roster> {
        read(&self.inner.students)
    }

    pub fn missions(&self) -> Arc<Missions> {
        read(&self.inner.missions)
    }

    pub fn checkers(&self) -> Arc<Checkers> {
        read(&self.inner.checkers)
    }

    pub fn reload_all(&self) {
        self.reload_students();
        self.reload_missions();
        self.reload_checkers();
    }

    /// Replace the roster. A broken roster file leaves the roster empty until it is fixed.
    pub fn reload_students(&self) {
        let students_path = &self.inner.layout.students_path;
        let roster = match File::open(students_path) {
            Ok(fp) => match serde_json::from_reader::<_, Roster>(fp) {
                Ok(roster) => roster,
                Err(error) => {
                    warn!("Could not parse roster {}: {}", students_path.display(), error);
                    Roster::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No roster at {}", students_path.display());
                Roster::new()
            }
            Err(error) => {
                warn!("Could not read roster {}: {}", students_path.display(), error);
                Roster::new()
            }
        };
        info!("Loaded {} students", roster.len());
        replace(&self.inner.students, roster);
    }

    /// Replace the missions. Returns the definitions that were skipped.
    pub fn reload_missions(&self) -> Vec<PathBuf> {
        let mut missions = Missions::new();
        let mut skipped = Vec::new();
        for path in find_files(&self.inner.layout.missions_path, MISSION_EXTENSION) {
            match Mission::load(&path) {
                Ok(mission) => {
                    missions.insert(mission.url_key.clone(), mission);
                }
                Err(error) => {
                    warn!("Skipping mission {}: {}", path.display(), error);
                    skipped.push(path);
                }
            }
        }
        info!("Loaded {} missions", missions.len());
        replace(&self.inner.missions, missions);
        return skipped;
    }

    /// Replace the checkers. Returns the descriptors that were skipped.
    pub fn reload_checkers(&self) -> Vec<PathBuf> {
        let mut checkers = Checkers::new();
        let mut skipped = Vec::new();
        for path in find_files(&self.inner.layout.missions_path, CHECKER_EXTENSION) {
            match checker::load(&path) {
                Ok((key, checker)) => {
                    checkers.insert(key, checker);
                }
                Err(error) => {
                    warn!("Skipping checker {}: {}", path.display(), error);
                    skipped.push(path);
                }
            }
        }
        info!("Loaded {} checkers", checkers.len());
        replace(&self.inner.checkers, checkers);
        return skipped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::fs;

    fn layout() -> (tempfile::TempDir, Layout) {
        let root = tempfile::tempdir().unwrap();
        let layout = Layout::new(root.path());
        layout.create_dirs().unwrap();
        (root, layout)
    }

    #[test]
    fn scan_is_recursive_and_sorted() {
        let (_root, layout) = layout();
        let nested = layout.missions_path.join("2021").join("spring");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(layout.missions_path.join("decoy.json")).unwrap();
        fs::write(nested.join("b.json"), "{}").unwrap();
        fs::write(layout.missions_path.join("a.json"), "{}").unwrap();
        fs::write(layout.missions_path.join("a.yaml"), "kind: zip\n").unwrap();

        assert_eq!(
            find_files(&layout.missions_path, "json"),
            vec![
                layout.missions_path.join("2021/spring/b.json"),
                layout.missions_path.join("a.json"),
            ]
        );
        assert!(find_files(&layout.db_path.join("absent"), "json").is_empty());
    }

    #[test]
    fn empty_data_directory() {
        let (_root, layout) = layout();
        let store = Store::load(layout);
        let snapshot = store.snapshot();
        assert!(snapshot.students.is_empty());
        assert!(snapshot.missions.is_empty());
        assert!(snapshot.checkers.is_empty());
    }

    #[test]
    fn roster() {
        let (_root, layout) = layout();
        fs::write(&layout.students_path, r#"{"2021001": "Alice", "2021002": "Bob"}"#).unwrap();
        let store = Store::load(layout);
        assert_eq!(
            store.snapshot().student("2021001"),
            Some(Student {
                id: "2021001".to_string(),
                name: "Alice".to_string()
            })
        );
        assert_eq!(store.snapshot().student("2021003"), None);
        assert_eq!(store.students().len(), 2);
    }

    #[test]
    fn broken_roster_empties() {
        let (_root, layout) = layout();
        fs::write(&layout.students_path, r#"{"2021001": "Alice"}"#).unwrap();
        let store = Store::load(layout.clone());
        assert_eq!(store.students().len(), 1);

        fs::write(&layout.students_path, r#"{"2021001": "Ali"#).unwrap();
        store.reload_students();
        assert!(store.students().is_empty());
    }

    #[test]
    fn malformed_mission_is_skipped() {
        let (_root, layout) = layout();
        let nested = layout.missions_path.join("2021");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            layout.missions_path.join("homework1.json"),
            r#"{"name": "Homework 1", "deadline": "2030-01-01T00:00:00Z", "path": "hw1"}"#,
        )
        .unwrap();
        fs::write(
            nested.join("homework2.json"),
            r#"{"name": "Homework 2", "deadline": "2030-02-01T00:00:00Z", "ext": "pdf", "path": "hw2"}"#,
        )
        .unwrap();
        fs::write(layout.missions_path.join("broken.json"), r#"{"name": "#).unwrap();

        let store = Store::new(layout.clone());
        let skipped = store.reload_missions();
        assert_eq!(skipped, vec![layout.missions_path.join("broken.json")]);
        let missions = store.missions();
        let mut keys: Vec<&String> = missions.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["homework1", "homework2"]);
        assert_eq!(missions["homework2"].extension, "pdf");
    }

    #[test]
    fn mission_round_trip() {
        let (_root, layout) = layout();
        fs::write(
            layout.missions_path.join("final.json"),
            r#"{
                "name": "Final project",
                "description": "Anything goes",
                "deadline": "2031-06-30T12:00:00+00:00",
                "ext": "zip",
                "size": "64M",
                "path": "2031/final"
            }"#,
        )
        .unwrap();
        let store = Store::new(layout);
        assert!(store.reload_missions().is_empty());
        let missions = store.missions();
        let mission = &missions["final"];
        assert_eq!(mission.url_key, "final");
        assert_eq!(mission.name, "Final project");
        assert_eq!(mission.description.as_deref(), Some("Anything goes"));
        assert_eq!(
            mission.deadline,
            DateTime::parse_from_rfc3339("2031-06-30T12:00:00+00:00").unwrap()
        );
        assert_eq!(mission.extension, "zip");
        assert_eq!(mission.max_size, 64 * 1024 * 1024);
        assert_eq!(mission.storage_subpath, PathBuf::from("2031/final"));
    }

    #[test]
    fn broken_checker_is_skipped() {
        let (_root, layout) = layout();
        fs::write(layout.missions_path.join("homework1.yaml"), "kind: zip\n").unwrap();
        fs::write(layout.missions_path.join("homework2.yaml"), "kind: [").unwrap();

        let store = Store::new(layout.clone());
        let skipped = store.reload_checkers();
        assert_eq!(skipped, vec![layout.missions_path.join("homework2.yaml")]);
        let checkers = store.checkers();
        assert!(checkers.contains_key("homework1"));
        assert!(!checkers.contains_key("homework2"));
    }

    #[test]
    fn snapshot_survives_reload() {
        let (_root, layout) = layout();
        fs::write(&layout.students_path, r#"{"1": "A"}"#).unwrap();
        let store = Store::load(layout.clone());
        let before = store.snapshot();

        fs::write(&layout.students_path, r#"{"1": "A", "2": "B"}"#).unwrap();
        store.reload_students();
        assert_eq!(before.students.len(), 1);
        assert_eq!(store.snapshot().students.len(), 2);
    }
}
