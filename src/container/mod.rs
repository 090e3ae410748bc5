use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;

mod error;
mod service_name;

pub use error::{Error, Result};
pub use service_name::resolve_service_name;

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Suffix the container runtime appends to the container id to name its json log file.
pub const LOG_FILE_SUFFIX: &str = "-json.log";

/// Name of the per-container metadata file written by the container runtime.
pub const CONFIG_FILE_NAME: &str = "config.v2.json";

/// A validated container identifier.
///
/// The identifier is the name of the container's directory below the containers base
/// directory, so it must be usable as a single path component.
///
/// # Examples
///
/// ```
/// # use creo_log_forwarder::container::ContainerID;
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), raw_id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, exceeds
    /// [`CONTAINER_ID_MAX_LEN`], or is not a single path component.
    ///
    /// # Examples
    ///
    /// ```
    /// # use creo_log_forwarder::container::ContainerID;
    /// assert!(ContainerID::new("abcdef012345").is_ok());
    /// assert!(ContainerID::new("").is_err());
    /// assert!(ContainerID::new("a/b").is_err());
    /// ```
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_ID_MAX_LEN
            || src == "."
            || src == ".."
            || src.contains(['/', '\\'])
        {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Derives the container id from the name of a container directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDirectoryName`] if the path has no UTF-8 file name and
    /// [`Error::InvalidContainerID`] if the name is not a valid id.
    pub fn from_container_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let name = dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::MissingDirectoryName(dir.to_path_buf()))?;
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_arc(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container whose log file is (or is about to be) tailed.
///
/// Holds the paths derived from the container directory and the lazily resolved
/// service name. The service name is resolved at most once per instance, i.e. once
/// per tailing session.
#[derive(Debug)]
pub struct ContainerLogSource {
    container_id: ContainerID,
    container_dir: PathBuf,
    log_file_path: PathBuf,
    config_path: PathBuf,
    service_name: OnceCell<String>,
}

impl ContainerLogSource {
    /// Creates the log source for the given container directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory name is not a valid [`ContainerID`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use creo_log_forwarder::container::ContainerLogSource;
    /// # use std::path::Path;
    /// let source = ContainerLogSource::new("/var/lib/docker/containers/abc").unwrap();
    /// assert_eq!(
    ///     source.log_file_path(),
    ///     Path::new("/var/lib/docker/containers/abc/abc-json.log")
    /// );
    /// ```
    pub fn new(container_dir: impl AsRef<Path>) -> Result<Self> {
        let container_dir = container_dir.as_ref().to_path_buf();
        let container_id = ContainerID::from_container_dir(&container_dir)?;
        let log_file_path = container_dir.join(format!("{container_id}{LOG_FILE_SUFFIX}"));
        let config_path = container_dir.join(CONFIG_FILE_NAME);

        Ok(Self {
            container_id,
            container_dir,
            log_file_path,
            config_path,
            service_name: OnceCell::new(),
        })
    }

    pub fn container_id(&self) -> &ContainerID {
        &self.container_id
    }

    pub fn container_dir(&self) -> &Path {
        &self.container_dir
    }

    /// Path of the canonical (actively written) log file.
    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }

    /// File name of the canonical log file, i.e. `<id>-json.log`.
    pub fn log_file_name(&self) -> String {
        format!("{}{LOG_FILE_SUFFIX}", self.container_id)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the human readable service name, resolving it on first access.
    pub async fn service_name(&self) -> &str {
        self.service_name
            .get_or_init(|| resolve_service_name(&self.config_path, &self.container_id))
            .await
    }
}
