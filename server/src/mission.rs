use std::fs::File;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Deserialize;

use crate::util;

pub const DEFAULT_EXTENSION: &str = "zip";
pub const DEFAULT_MAX_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Student {
    pub id: String,
    pub name: String,
}

impl Student {
    /// Base of every file this student submits: `{id}-{name}`.
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.id, self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mission {
    pub url_key: String,
    pub name: String,
    pub description: Option<String>,
    pub deadline: DateTime<Local>,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub max_size: u64,
    /// Relative to the received files root.
    pub storage_subpath: PathBuf,
}

#[derive(Debug)]
pub enum Error {
    /// Could not deserialise the JSON.
    DeserialisationError(serde_json::Error),

    /// The file has no usable stem to use as the URL key.
    InvalidFileName(PathBuf),

    /// Deadline is not an ISO-8601 date and time.
    InvalidDeadline(String),

    /// Size is not a byte count.
    InvalidSize(String),

    /// Storage path escapes the received files root.
    InvalidStoragePath(PathBuf),

    /// IO error reading the definition.
    IOError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeserialisationError(error) => write!(f, "invalid definition: {}", error),
            Error::InvalidFileName(path) => write!(f, "invalid file name {}", path.display()),
            Error::InvalidDeadline(value) => write!(f, "invalid deadline {:?}", value),
            Error::InvalidSize(value) => write!(f, "invalid size {:?}", value),
            Error::InvalidStoragePath(path) => {
                write!(f, "storage path {} leaves the received root", path.display())
            }
            Error::IOError(error) => write!(f, "{}", error),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Size {
    Bytes(u64),
    Text(String),
}

/// A mission definition file as it is written on disk.
#[derive(Deserialize, Debug)]
struct Definition {
    name: String,
    description: Option<String>,
    deadline: String,
    ext: Option<String>,
    size: Option<Size>,
    #[serde(alias = "subpath")]
    path: PathBuf,
}

/// Parse an ISO-8601 date and time. Values without an offset are local time.
///
/// `T` or a space separates date and time, seconds are optional, offsets may be
/// written `Z`, `+08`, `+0800` or `+08:00`.
pub fn parse_deadline(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    if let Ok(deadline) = DateTime::parse_from_rfc3339(value) {
        return Some(deadline.with_timezone(&Local));
    }
    let offset = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix('z'))
        .map(|utc| format!("{}+00:00", utc));
    let with_offset = offset.as_deref().unwrap_or(value);
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f%#z",
        "%Y-%m-%d %H:%M:%S%.f%#z",
        "%Y-%m-%dT%H:%M%#z",
        "%Y-%m-%d %H:%M%#z",
    ] {
        if let Ok(deadline) = DateTime::parse_from_str(with_offset, format) {
            return Some(deadline.with_timezone(&Local));
        }
    }
    let naive = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())?;
    return Local.from_local_datetime(&naive).earliest();
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

impl Mission {
    pub fn load(definition_path: &Path) -> Result<Self, Error> {
        let Some(url_key) = definition_path.file_stem().and_then(|stem| stem.to_str()) else {
            return Err(Error::InvalidFileName(definition_path.to_path_buf()));
        };
        let fp = File::open(definition_path).map_err(Error::IOError)?;
        let definition: Definition =
            serde_json::from_reader(fp).map_err(Error::DeserialisationError)?;
        return Self::from_definition(url_key, definition);
    }

    fn from_definition(url_key: &str, definition: Definition) -> Result<Self, Error> {
        let Some(deadline) = parse_deadline(&definition.deadline) else {
            return Err(Error::InvalidDeadline(definition.deadline));
        };
        let max_size = match definition.size {
            None => DEFAULT_MAX_SIZE,
            Some(Size::Bytes(bytes)) => bytes,
            Some(Size::Text(text)) => match util::parse_byte_size(&text) {
                Some(bytes) => bytes,
                None => return Err(Error::InvalidSize(text)),
            },
        };
        if !is_contained(&definition.path) {
            return Err(Error::InvalidStoragePath(definition.path));
        }
        let extension = definition
            .ext
            .as_deref()
            .unwrap_or(DEFAULT_EXTENSION)
            .trim_start_matches('.')
            .to_ascii_lowercase();
        Ok(Self {
            url_key: url_key.to_string(),
            name: definition.name,
            description: definition.description,
            deadline,
            extension,
            max_size,
            storage_subpath: definition.path,
        })
    }

    pub fn storage_dir(&self, received_path: &Path) -> PathBuf {
        received_path.join(&self.storage_subpath)
    }

    /// Pending submission of a student: `{id}-{name}.unconfirmed.{ext}`.
    pub fn unconfirmed_path(&self, received_path: &Path, student: &Student) -> PathBuf {
        self.storage_dir(received_path).join(format!(
            "{}.unconfirmed.{}",
            student.file_stem(),
            self.extension
        ))
    }

    /// Locked submission of a student: `{id}-{name}.{ext}`.
    pub fn confirmed_path(&self, received_path: &Path, student: &Student) -> PathBuf {
        self.storage_dir(received_path)
            .join(format!("{}.{}", student.file_stem(), self.extension))
    }

    /// Whether a declared upload file name carries this mission's extension.
    pub fn accepts_file_name(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => extension.eq_ignore_ascii_case(&self.extension),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use test_case::test_case;

    fn write_definition(directory: &Path, stem: &str, body: &str) -> PathBuf {
        let path = directory.join(format!("{}.json", stem));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_full_definition() {
        let directory = tempfile::tempdir().unwrap();
        let path = write_definition(
            directory.path(),
            "homework1",
            r#"{
                "name": "Homework 1",
                "description": "Linked lists",
                "deadline": "2030-05-01T23:59:00+08:00",
                "ext": "TAR",
                "size": "2M",
                "path": "2030/hw1"
            }"#,
        );
        let mission = Mission::load(&path).unwrap();
        assert_eq!(mission.url_key, "homework1");
        assert_eq!(mission.name, "Homework 1");
        assert_eq!(mission.description.as_deref(), Some("Linked lists"));
        assert_eq!(
            mission.deadline,
            DateTime::parse_from_rfc3339("2030-05-01T23:59:00+08:00").unwrap()
        );
        assert_eq!(mission.extension, "tar");
        assert_eq!(mission.max_size, 2 * 1024 * 1024);
        assert_eq!(mission.storage_subpath, PathBuf::from("2030/hw1"));
    }

    #[test]
    fn load_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = write_definition(
            directory.path(),
            "lab",
            r#"{"name": "Lab", "deadline": "2030-01-02T03:04:05", "subpath": "lab"}"#,
        );
        let mission = Mission::load(&path).unwrap();
        assert_eq!(mission.description, None);
        assert_eq!(mission.extension, "zip");
        assert_eq!(mission.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(mission.storage_subpath, PathBuf::from("lab"));
        assert_eq!(
            (mission.deadline.year(), mission.deadline.hour(), mission.deadline.second()),
            (2030, 3, 5)
        );
    }

    #[test]
    fn integer_size() {
        let directory = tempfile::tempdir().unwrap();
        let path = write_definition(
            directory.path(),
            "lab",
            r#"{"name": "Lab", "deadline": "2030-01-02 03:04:05", "size": 1000, "path": "lab"}"#,
        );
        assert_eq!(Mission::load(&path).unwrap().max_size, 1000);
    }

    #[test_case(r#"{"name": "Lab", "deadline": "tomorrow", "path": "lab"}"#; "bad deadline")]
    #[test_case(r#"{"name": "Lab", "deadline": "2030-01-02T03:04:05", "size": "lots", "path": "lab"}"#; "bad size")]
    #[test_case(r#"{"name": "Lab", "deadline": "2030-01-02T03:04:05", "path": "../etc"}"#; "escaping path")]
    #[test_case(r#"{"name": "Lab", "deadline": "2030-01-02T03:04:05"}"#; "missing path")]
    #[test_case("{not json"; "broken json")]
    fn rejected_definitions(body: &str) {
        let directory = tempfile::tempdir().unwrap();
        let path = write_definition(directory.path(), "lab", body);
        assert!(Mission::load(&path).is_err());
    }

    #[test_case("2030-06-30T23:59:00+08:00", Some("2030-06-30T15:59:00+00:00"); "rfc 3339")]
    #[test_case("2030-06-30T23:59:00Z", Some("2030-06-30T23:59:00+00:00"); "zulu")]
    #[test_case("2030-06-30 23:59:00Z", Some("2030-06-30T23:59:00+00:00"); "zulu with space")]
    #[test_case("2030-06-30T23:59:00+0800", Some("2030-06-30T15:59:00+00:00"); "compact offset")]
    #[test_case("2030-06-30T23:59:00+08", Some("2030-06-30T15:59:00+00:00"); "hour offset")]
    #[test_case("2030-06-30 23:59+08:00", Some("2030-06-30T15:59:00+00:00"); "space without seconds")]
    #[test_case("2030-06-30T23:59:30.5-0130", Some("2030-07-01T01:29:30.5+00:00"); "fraction and negative offset")]
    #[test_case("2030-06-30", None; "date only")]
    #[test_case("30/06/2030 23:59", None; "not iso")]
    fn deadline_with_offset(value: &str, expected: Option<&str>) {
        let expected = expected.map(|e| DateTime::parse_from_rfc3339(e).unwrap());
        assert_eq!(parse_deadline(value).map(|d| d.fixed_offset()), expected);
    }

    #[test_case("2030-06-30T23:59"; "t without seconds")]
    #[test_case("2030-06-30 23:59"; "space without seconds")]
    #[test_case("2030-06-30 23:59:00"; "space with seconds")]
    #[test_case("2030-06-30T23:59:00.250"; "fraction")]
    fn local_deadline(value: &str) {
        let deadline = parse_deadline(value).unwrap();
        assert_eq!(
            (deadline.year(), deadline.month(), deadline.day(), deadline.hour(), deadline.minute()),
            (2030, 6, 30, 23, 59)
        );
    }

    #[test_case("report.zip", true; "same case")]
    #[test_case("REPORT.ZIP", true; "upper case")]
    #[test_case("report.tar.zip", true; "double extension")]
    #[test_case("report.zip.exe", false; "trailing extension")]
    #[test_case("zip", false; "no dot")]
    fn accepts_file_name(file_name: &str, accepted: bool) {
        let mission = Mission {
            url_key: "hw".to_string(),
            name: "Homework".to_string(),
            description: None,
            deadline: Local::now(),
            extension: "zip".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            storage_subpath: PathBuf::from("hw"),
        };
        assert_eq!(mission.accepts_file_name(file_name), accepted);
    }

    #[test]
    fn submission_paths() {
        let mission = Mission {
            url_key: "hw".to_string(),
            name: "Homework".to_string(),
            description: None,
            deadline: Local::now(),
            extension: "zip".to_string(),
            max_size: DEFAULT_MAX_SIZE,
            storage_subpath: PathBuf::from("2021/hw"),
        };
        let student = Student {
            id: "2021001".to_string(),
            name: "Alice".to_string(),
        };
        let received = Path::new("/srv/received");
        assert_eq!(
            mission.unconfirmed_path(received, &student),
            PathBuf::from("/srv/received/2021/hw/2021001-Alice.unconfirmed.zip")
        );
        assert_eq!(
            mission.confirmed_path(received, &student),
            PathBuf::from("/srv/received/2021/hw/2021001-Alice.zip")
        );
    }
}
