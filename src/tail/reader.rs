use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::container::ContainerLogSource;
use crate::fsutil;
use crate::parser;
use crate::sink::LogSink;

use super::registry::Registration;
use super::{Error, Result, TailConfig, TailMode, TailPolicy};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Where a reader starts in the container's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Rotated segments first, then the canonical file from its first byte.
    Replay,
    /// The canonical file from its first byte, without rotated segments.
    Beginning,
    /// The current end of the canonical file.
    End,
}

impl From<TailPolicy> for StartPosition {
    fn from(policy: TailPolicy) -> Self {
        match policy {
            TailPolicy::ReplayThenTail => StartPosition::Replay,
            TailPolicy::TailOnly => StartPosition::End,
        }
    }
}

/// Why a reader stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailExit {
    /// Nothing exists at the log file's path anymore, e.g. it was renamed away or
    /// deleted. Everything written through the old handle has been forwarded.
    Vanished,
    /// The path now refers to a new file, or the file was truncated.
    Rotated,
    /// Shutdown or an explicit stop was requested.
    Cancelled,
}

enum FileState {
    Unchanged,
    Vanished,
    Replaced,
}

/// Read state of the canonical file.
struct Cursor {
    /// Offset just past the last forwarded or dropped line.
    offset: u64,
    /// Bytes after `offset` that do not form a complete line yet.
    pending: Vec<u8>,
    /// Set while the rest of an over-long line is dropped.
    skipping: bool,
}

impl Cursor {
    fn new(offset: u64) -> Self {
        Self {
            offset,
            pending: Vec::with_capacity(READ_CHUNK_SIZE),
            skipping: false,
        }
    }

    fn read_pos(&self) -> u64 {
        self.offset + self.pending.len() as u64
    }
}

/// Streams the lines of one container's log file into a [`LogSink`].
///
/// The reader keeps the byte offset of the last line it handed on. Bytes after the last
/// newline are buffered and only counted once their line is complete, so a partially
/// written line is never forwarded and never skipped. The buffer never grows past the
/// configured maximum line length: a longer line is dropped with a warning.
pub struct LogFileReader<S> {
    source: Arc<ContainerLogSource>,
    sink: Arc<S>,
    container_id: Arc<str>,
    service_name: Arc<str>,
    poll_interval: Duration,
    max_line_len: usize,
    cancel: CancellationToken,
}

impl<S: LogSink> LogFileReader<S> {
    /// Creates a reader for `source`, resolving its service name.
    pub async fn new(
        source: Arc<ContainerLogSource>,
        sink: Arc<S>,
        config: &TailConfig,
        cancel: CancellationToken,
    ) -> Self {
        let container_id = source.container_id().to_arc();
        let service_name: Arc<str> = source.service_name().await.into();
        Self {
            source,
            sink,
            container_id,
            service_name,
            poll_interval: config.poll_interval,
            max_line_len: config.max_line_len,
            cancel,
        }
    }

    /// Reads the log from `start` and follows the canonical file until it vanishes, is
    /// rotated, or the reader is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the container directory cannot be listed for replay, or the
    /// canonical file cannot be opened, read, or checked.
    pub async fn run(&self, start: StartPosition, registration: &Registration) -> Result<TailExit> {
        let path = self.source.log_file_path();

        if start == StartPosition::Replay {
            registration.set_mode(TailMode::ReplayingHistory);
            let segments =
                fsutil::rotated_segments(self.source.container_dir(), &self.source.log_file_name())
                    .await?;
            if !self.replay_segments(&segments).await {
                return Ok(TailExit::Cancelled);
            }
        }

        let mut file = File::open(path).await.map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let identity = file
            .metadata()
            .await
            .map_err(|source| Error::Stat {
                path: path.to_path_buf(),
                source,
            })?;
        let identity = fsutil::file_identity(&identity);

        let offset = match start {
            StartPosition::End => {
                let offset = file
                    .seek(SeekFrom::End(0))
                    .await
                    .map_err(|source| Error::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                registration.set_mode(TailMode::Live);
                offset
            }
            StartPosition::Replay | StartPosition::Beginning => {
                registration.set_mode(TailMode::ReplayingHistory);
                0
            }
        };
        log::debug!(
            "Following `{}` from offset {} (container_id={})",
            path.display(),
            offset,
            self.container_id
        );

        let live = start == StartPosition::End;
        self.follow(file, offset, identity, live, registration).await
    }

    /// Replays closed segments in the given order. A segment that cannot be read is
    /// logged and skipped. Returns `false` if cancelled in between.
    async fn replay_segments(&self, segments: &[PathBuf]) -> bool {
        for segment in segments {
            if self.cancel.is_cancelled() {
                return false;
            }
            log::info!("Processing historical logs from `{}`", segment.display());
            if let Err(err) = self.replay_segment(segment).await {
                log::error!(
                    "failed to replay rotated segment: container_id={}, error={}",
                    self.container_id,
                    err
                );
            }
        }

        !self.cancel.is_cancelled()
    }

    /// Forwards every line of a closed segment, including a final unterminated one.
    async fn replay_segment(&self, segment: &Path) -> Result<()> {
        let file = File::open(segment).await.map_err(|source| Error::Open {
            path: segment.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let limit = (self.max_line_len as u64).saturating_add(1);
        let mut line = Vec::with_capacity(1024);
        let mut skipping = false;

        loop {
            line.clear();
            let n = (&mut reader)
                .take(limit)
                .read_until(b'\n', &mut line)
                .await
                .map_err(|source| Error::Read {
                    path: segment.to_path_buf(),
                    source,
                })?;
            if n == 0 || self.cancel.is_cancelled() {
                return Ok(());
            }

            let complete = line.last() == Some(&b'\n');
            if skipping {
                skipping = !complete;
                continue;
            }
            if !complete && n as u64 == limit {
                self.forward_line(&line, segment).await;
                skipping = true;
                continue;
            }
            let content = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            self.forward_line(content, segment).await;
        }
    }

    async fn follow(
        &self,
        mut file: File,
        offset: u64,
        identity: Option<(u64, u64)>,
        mut live: bool,
        registration: &Registration,
    ) -> Result<TailExit> {
        let path = self.source.log_file_path();
        let mut cursor = Cursor::new(offset);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            if self.cancel.is_cancelled() {
                return Ok(TailExit::Cancelled);
            }

            let n = self.read_chunk(&mut file, &mut chunk).await?;
            if n > 0 {
                self.consume(&mut cursor, &chunk[..n]).await;
                continue;
            }

            if !live {
                log::info!(
                    "Caught up with `{}` at offset {}, tailing live",
                    path.display(),
                    cursor.offset
                );
                registration.set_mode(TailMode::Live);
                live = true;
            }

            match self.check_file(identity, cursor.read_pos()).await? {
                FileState::Unchanged => {}
                FileState::Vanished => {
                    self.drain(&mut file, &mut chunk, &mut cursor).await?;
                    log::debug!(
                        "`{}` vanished after {} bytes (container_id={})",
                        path.display(),
                        cursor.offset,
                        self.container_id
                    );
                    return Ok(TailExit::Vanished);
                }
                FileState::Replaced => {
                    self.drain(&mut file, &mut chunk, &mut cursor).await?;
                    log::debug!(
                        "`{}` was replaced after {} bytes (container_id={})",
                        path.display(),
                        cursor.offset,
                        self.container_id
                    );
                    return Ok(TailExit::Rotated);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(TailExit::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn read_chunk(&self, file: &mut File, chunk: &mut [u8]) -> Result<usize> {
        file.read(chunk).await.map_err(|source| Error::Read {
            path: self.source.log_file_path().to_path_buf(),
            source,
        })
    }

    /// Forwards what is left behind the handle of a file that is no longer at its
    /// path, including a final unterminated line.
    async fn drain(&self, file: &mut File, chunk: &mut [u8], cursor: &mut Cursor) -> Result<()> {
        loop {
            let n = self.read_chunk(file, chunk).await?;
            if n == 0 {
                break;
            }
            self.consume(cursor, &chunk[..n]).await;
        }

        if !cursor.pending.is_empty() {
            if !cursor.skipping {
                self.forward_line(&cursor.pending, self.source.log_file_path())
                    .await;
            }
            cursor.offset += cursor.pending.len() as u64;
            cursor.pending.clear();
            cursor.skipping = false;
        }
        Ok(())
    }

    /// Appends `bytes` to the cursor and forwards every complete line.
    ///
    /// The unterminated remainder stays pending unless it exceeds the maximum line
    /// length, in which case it is dropped together with the rest of its line.
    async fn consume(&self, cursor: &mut Cursor, bytes: &[u8]) {
        let path = self.source.log_file_path();
        cursor.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while let Some(pos) = cursor.pending[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + pos;
            if cursor.skipping {
                cursor.skipping = false;
            } else {
                self.forward_line(&cursor.pending[consumed..end], path).await;
            }
            consumed = end + 1;
        }
        cursor.offset += consumed as u64;
        cursor.pending.drain(..consumed);

        if cursor.pending.len() > self.max_line_len {
            if !cursor.skipping {
                self.forward_line(&cursor.pending, path).await;
            }
            cursor.offset += cursor.pending.len() as u64;
            cursor.pending.clear();
            cursor.skipping = true;
        }
    }

    /// Parses one line and hands the record to the sink. Never fails.
    async fn forward_line(&self, line: &[u8], origin: &Path) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        if line.len() > self.max_line_len {
            log::warn!(
                "dropping line longer than {} bytes in `{}`: container_id={}",
                self.max_line_len,
                origin.display(),
                self.container_id
            );
            return;
        }

        let record = match parser::parse_line(line, &self.container_id, &self.service_name) {
            Ok(record) => record,
            Err(err) => {
                log::warn!(
                    "dropping malformed line in `{}`: container_id={}, error={}",
                    origin.display(),
                    self.container_id,
                    err
                );
                return;
            }
        };

        if let Err(err) = self.sink.index_log(&record).await {
            log::error!(
                "failed to index record: container_id={}, service={}, error={}",
                self.container_id,
                self.service_name,
                err
            );
        }
    }

    async fn check_file(&self, identity: Option<(u64, u64)>, read_pos: u64) -> Result<FileState> {
        let path = self.source.log_file_path();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileState::Vanished);
            }
            Err(source) => {
                return Err(Error::Stat {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let replaced = match (identity, fsutil::file_identity(&metadata)) {
            (Some(before), Some(now)) => before != now,
            _ => false,
        };
        if replaced || metadata.len() < read_pos {
            return Ok(FileState::Replaced);
        }
        Ok(FileState::Unchanged)
    }
}
