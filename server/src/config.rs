use log::debug;
use serde::Deserialize;
use shared;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Error {
    /// Could not deserialise the Yaml.
    DeserialisationError(serde_yaml::Error),

    /// Could not determine from where to load the settings.
    DirectoryError,

    /// IO error with the configuration.
    IOError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeserialisationError(error) => write!(f, "invalid configuration: {}", error),
            Error::DirectoryError => write!(f, "could not determine the configuration directory"),
            Error::IOError(error) => write!(f, "{}", error),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding `db/` and `received/`. Defaults to the working directory.
    pub root: Option<PathBuf>,

    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            listen: default_listen(),
        }
    }
}

impl Config {
    pub fn get_path() -> Result<PathBuf, Error> {
        let Some(project_directory) = directories::ProjectDirs::from(
            shared::CONFIG_QUALIFIER,
            shared::CONFIG_ORGANIZATION,
            shared::CONFIG_APPLICATION,
        ) else {
            return Err(Error::DirectoryError);
        };
        let mut config_path = PathBuf::new();
        config_path.push(project_directory.config_dir());
        config_path.push("server.yaml");
        return Ok(config_path);
    }

    pub fn load(config_path: &Path) -> Result<Self, Error> {
        debug!("Loading config from {}", config_path.display());
        let fp = File::open(&config_path).map_err(Error::IOError)?;
        let config: Config = serde_yaml::from_reader(fp).map_err(Error::DeserialisationError)?;
        return Ok(config);
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(config_path: &Path) -> Result<Self, Error> {
        match Self::load(config_path) {
            Err(Error::IOError(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", config_path.display());
                Ok(Self::default())
            }
            result => result,
        }
    }

    pub fn root(&self) -> Result<PathBuf, Error> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().map_err(Error::IOError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let directory = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&directory.path().join("server.yaml")).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(config.root.is_none());
    }

    #[test]
    fn camel_case_keys() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("server.yaml");
        std::fs::write(&path, "root: /srv/collector\nlisten: 127.0.0.1:9000\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/srv/collector")));
        assert_eq!(config.listen, "127.0.0.1:9000");
    }

    #[test]
    fn broken_yaml() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("server.yaml");
        std::fs::write(&path, "listen: [unclosed\n").unwrap();
        let error = Config::load_or_default(&path).unwrap_err();
        assert!(matches!(error, Error::DeserialisationError(_)));
        assert!(error.to_string().starts_with("invalid configuration: "));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::DirectoryError.to_string(),
            "could not determine the configuration directory"
        );
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::IOError(missing).to_string(), "gone");
    }
}
