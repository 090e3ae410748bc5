use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container id: {0:?}")]
    InvalidContainerID(String),
    #[error("container directory `{0}` has no usable directory name")]
    MissingDirectoryName(PathBuf),
}
pub type Result<T> = std::result::Result<T, Error>;
