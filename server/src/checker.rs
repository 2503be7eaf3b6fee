use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::Deserialize;

use crate::util::escape_html;

/// Renders a verification report (an HTML fragment) for a submitted file.
pub trait Checker: Send + Sync {
    fn check(&self, file_path: &Path) -> String;
}

pub type Checkers = HashMap<String, Arc<dyn Checker>>;

#[derive(Debug)]
pub enum Error {
    /// Could not deserialise the Yaml.
    DeserialisationError(serde_yaml::Error),

    /// The file has no usable stem to use as the checker key.
    InvalidFileName(PathBuf),

    /// The command to run does not exist.
    MissingProgram(PathBuf),

    /// IO error reading the descriptor.
    IOError(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DeserialisationError(error) => write!(f, "invalid descriptor: {}", error),
            Error::InvalidFileName(path) => write!(f, "invalid file name {}", path.display()),
            Error::MissingProgram(path) => write!(f, "no program at {}", path.display()),
            Error::IOError(error) => write!(f, "{}", error),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Descriptor {
    Zip,
    Path,
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Load a checker descriptor. The file stem is the checker key.
pub fn load(descriptor_path: &Path) -> Result<(String, Arc<dyn Checker>), Error> {
    let Some(key) = descriptor_path.file_stem().and_then(|stem| stem.to_str()) else {
        return Err(Error::InvalidFileName(descriptor_path.to_path_buf()));
    };
    let fp = File::open(descriptor_path).map_err(Error::IOError)?;
    let descriptor: Descriptor = serde_yaml::from_reader(fp).map_err(Error::DeserialisationError)?;
    let checker: Arc<dyn Checker> = match descriptor {
        Descriptor::Zip => Arc::new(ZipChecker),
        Descriptor::Path => Arc::new(PathChecker),
        Descriptor::Command { program, args } => {
            // Bare names are looked up in PATH, anything else is relative to the descriptor.
            let program = if program.components().count() > 1 || program.is_absolute() {
                let base = descriptor_path.parent().unwrap_or(Path::new(""));
                let program = base.join(program);
                if !program.is_file() {
                    return Err(Error::MissingProgram(program));
                }
                program
            } else {
                program
            };
            Arc::new(CommandChecker { program, args })
        }
    };
    return Ok((key.to_string(), checker));
}

/// Echoes the path it was given.
pub struct PathChecker;

impl Checker for PathChecker {
    fn check(&self, file_path: &Path) -> String {
        format!(
            "File path is {}.",
            escape_html(&file_path.display().to_string())
        )
    }
}

/// Tests a zip archive and lists its entries.
pub struct ZipChecker;

impl ZipChecker {
    fn verify(archive: &mut zip::ZipArchive<File>) -> bool {
        for index in 0..archive.len() {
            let Ok(mut entry) = archive.by_index(index) else {
                return false;
            };
            if io::copy(&mut entry, &mut io::sink()).is_err() {
                return false;
            }
        }
        return true;
    }

    fn listing(archive: &mut zip::ZipArchive<File>) -> String {
        let mut table = String::from(
            "<table border=\"1\"><tr><th>Name</th><th>Modified</th><th>Size</th>\
             <th>Compressed size</th><th>CRC-32</th></tr>",
        );
        for index in 0..archive.len() {
            let Ok(entry) = archive.by_index_raw(index) else {
                continue;
            };
            let modified = entry.last_modified();
            table.push_str(&format!(
                "<tr><td>{}</td><td>{:04}-{:02}-{:02} {:02}:{:02}:{:02}</td>\
                 <td>{}</td><td>{}</td><td>{:08x}</td></tr>",
                escape_html(entry.name()),
                modified.year(),
                modified.month(),
                modified.day(),
                modified.hour(),
                modified.minute(),
                modified.second(),
                entry.size(),
                entry.compressed_size(),
                entry.crc32(),
            ));
        }
        table.push_str("</table>");
        return table;
    }
}

impl Checker for ZipChecker {
    fn check(&self, file_path: &Path) -> String {
        let archive = File::open(file_path)
            .map_err(zip::result::ZipError::Io)
            .and_then(zip::ZipArchive::new);
        let mut archive = match archive {
            Ok(archive) => archive,
            Err(error) => {
                return format!(
                    "<p>The file is not a readable zip archive ({}), please re-pack and upload it again.</p>",
                    escape_html(&error.to_string())
                )
            }
        };
        let mut report = if Self::verify(&mut archive) {
            String::from("<p>The archive is intact.</p>")
        } else {
            String::from("<p>The archive is damaged, please re-pack and upload it again.</p>")
        };
        report.push_str(&Self::listing(&mut archive));
        return report;
    }
}

/// Runs an external program with the file path as its last argument; its stdout is the report.
pub struct CommandChecker {
    program: PathBuf,
    args: Vec<String>,
}

impl Checker for CommandChecker {
    fn check(&self, file_path: &Path) -> String {
        match Command::new(&self.program)
            .args(&self.args)
            .arg(file_path)
            .output()
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(output) => format!(
                "<p>Checker failed ({}): {}</p>",
                output.status,
                escape_html(String::from_utf8_lossy(&output.stderr).trim())
            ),
            Err(error) => format!(
                "<p>Checker could not run: {}</p>",
                escape_html(&error.to_string())
            ),
        }
    }
}
