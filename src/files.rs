//! File access over a project's host mirror.
//!
//! Every path is a logical sandbox path under [`APP_ROOT`]. The prefix is
//! stripped and the remainder resolved against the project directory, which
//! is bind-mounted into the container, so the host copy is authoritative.
//! Writes are additionally pushed into a running container on a best-effort
//! basis.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::runtime::ContainerRuntime;
use crate::{Result, SandboxError, APP_ROOT, CHUNK_SIZE, GIT_LOG_FILE, IGNORED_DIRS};

/// One piece of a streamed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChunk {
    /// Decoded text, never splitting a character.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

/// Reads and writes files in a project directory, mirroring writes into the
/// project's container when one is attached.
#[derive(Clone)]
pub struct FileBridge {
    project_dir: PathBuf,
    container: Option<(Arc<dyn ContainerRuntime>, String)>,
    push_writes: bool,
}

impl FileBridge {
    /// Host-only bridge; writes never reach a container.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            container: None,
            push_writes: false,
        }
    }

    /// Attach the container that writes are pushed into.
    pub fn with_container(
        mut self,
        runtime: Arc<dyn ContainerRuntime>,
        container_id: impl Into<String>,
        push_writes: bool,
    ) -> Self {
        self.container = Some((runtime, container_id.into()));
        self.push_writes = push_writes;
        self
    }

    /// Host directory `/app` maps to.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Resolve a logical path to its host location.
    pub fn host_path(&self, path: &str) -> Result<PathBuf> {
        let rel = relative_path(path)?;
        Ok(self.project_dir.join(rel))
    }

    /// Read a whole file. A missing file is `""` when `missing_ok`.
    pub async fn read(&self, path: &str, missing_ok: bool) -> Result<String> {
        let host = self.host_path(path)?;
        match tokio::fs::read_to_string(&host).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if missing_ok {
                    Ok(String::new())
                } else {
                    Err(SandboxError::file_not_found(path))
                }
            }
            Err(e) => Err(SandboxError::io(host, e)),
        }
    }

    /// Read raw bytes, `None` if the file is absent.
    pub async fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let host = self.host_path(path)?;
        match tokio::fs::read(&host).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SandboxError::io(host, e)),
        }
    }

    /// Whether the path exists on the host mirror.
    pub async fn exists(&self, path: &str) -> bool {
        match self.host_path(path) {
            Ok(host) => tokio::fs::try_exists(host).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Stream a file in chunks of at most [`CHUNK_SIZE`] bytes.
    ///
    /// The file is opened here, so a missing file fails immediately rather
    /// than on first poll. Calling again reopens from the start.
    pub async fn stream_read(
        &self,
        path: &str,
        binary: bool,
    ) -> Result<BoxStream<'static, Result<FileChunk>>> {
        let host = self.host_path(path)?;
        let file = match tokio::fs::File::open(&host).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SandboxError::file_not_found(path));
            }
            Err(e) => return Err(SandboxError::io(host, e)),
        };

        let reader = ChunkReader {
            file,
            path: host,
            binary,
            pending: Vec::new(),
            done: false,
        };

        Ok(stream::unfold(reader, |mut reader| async move {
            if reader.done {
                return None;
            }
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), reader)),
                Ok(None) => None,
                Err(e) => {
                    reader.done = true;
                    Some((Err(e), reader))
                }
            }
        })
        .boxed())
    }

    /// Write a file to the host mirror, then push it into the container.
    ///
    /// Only the host write can fail the call; a failed push is logged.
    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::io(parent, e))?;
        }
        tokio::fs::write(&host, content)
            .await
            .map_err(|e| SandboxError::io(&host, e))?;

        if self.push_writes {
            if let Err(e) = self.push_to_container(path, content.as_bytes()).await {
                warn!("{}", e);
            }
        }
        Ok(())
    }

    async fn push_to_container(&self, path: &str, content: &[u8]) -> Result<()> {
        let Some((runtime, container_id)) = &self.container else {
            return Ok(());
        };

        let logical = logical_path(&relative_path(path)?);
        let state = runtime
            .inspect(container_id)
            .await
            .map_err(|e| SandboxError::sync_failed(&logical, e.to_string()))?;
        if !state.running {
            return Err(SandboxError::sync_failed(
                &logical,
                format!("container is {}", state.status),
            ));
        }

        let (dir, name) = logical
            .rsplit_once('/')
            .map(|(dir, name)| (if dir.is_empty() { "/" } else { dir }, name))
            .ok_or_else(|| SandboxError::sync_failed(&logical, "path has no file name"))?;

        // The target directory may not exist in the container yet.
        runtime
            .exec(
                container_id,
                &["mkdir".to_string(), "-p".to_string(), dir.to_string()],
                APP_ROOT,
            )
            .await
            .map_err(|e| SandboxError::sync_failed(&logical, e.to_string()))?;

        let archive = single_file_archive(name, content)
            .map_err(|e| SandboxError::sync_failed(&logical, e.to_string()))?;
        runtime
            .upload(container_id, dir, Bytes::from(archive))
            .await
            .map_err(|e| SandboxError::sync_failed(&logical, e.to_string()))?;

        debug!("Pushed {} into container {}", logical, container_id);
        Ok(())
    }

    /// All files in the project as sorted logical paths, skipping ignored
    /// directories and the commit log.
    pub async fn list_paths(&self) -> Result<Vec<String>> {
        let root = self.project_dir.clone();
        tokio::task::spawn_blocking(move || walk_project(&root))
            .await
            .map_err(|e| SandboxError::runtime(format!("File listing task failed: {e}")))
    }
}

fn walk_project(root: &Path) -> Vec<String> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(root).min_depth(1).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| IGNORED_DIRS.contains(&name)))
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() || entry.file_name() == GIT_LOG_FILE {
            continue;
        }

        if let Ok(rel) = entry.path().strip_prefix(root) {
            paths.push(logical_path(rel));
        }
    }

    paths.sort();
    paths
}

/// Strip the logical prefix and reject anything that leaves the project.
fn relative_path(path: &str) -> Result<PathBuf> {
    let rest = if path == APP_ROOT {
        ""
    } else {
        path.strip_prefix(APP_ROOT)
            .and_then(|r| r.strip_prefix('/'))
            .unwrap_or(path)
    };

    let mut rel = PathBuf::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir => {}
            _ => return Err(SandboxError::file_not_found(path)),
        }
    }
    Ok(rel)
}

/// Forward-slash logical path for a project-relative path.
fn logical_path(rel: &Path) -> String {
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    format!("{APP_ROOT}/{}", parts.join("/"))
}

fn single_file_archive(name: &str, content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, content)?;
    builder.into_inner()
}

struct ChunkReader {
    file: tokio::fs::File,
    path: PathBuf,
    binary: bool,
    /// Bytes of a UTF-8 sequence split across a chunk boundary.
    pending: Vec<u8>,
    done: bool,
}

impl ChunkReader {
    async fn next_chunk(&mut self) -> Result<Option<FileChunk>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self
                .file
                .read(&mut buf)
                .await
                .map_err(|e| SandboxError::io(&self.path, e))?;

            if n == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Err(self.invalid_utf8());
            }

            if self.binary {
                return Ok(Some(FileChunk::Binary(Bytes::copy_from_slice(&buf[..n]))));
            }

            self.pending.extend_from_slice(&buf[..n]);
            let valid = match std::str::from_utf8(&self.pending) {
                Ok(_) => self.pending.len(),
                // Incomplete sequence at the end: keep it for the next read.
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                Err(_) => return Err(self.invalid_utf8()),
            };

            if valid == 0 {
                continue;
            }

            let tail = self.pending.split_off(valid);
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending = tail;
            return Ok(Some(FileChunk::Text(text)));
        }
    }

    fn invalid_utf8(&mut self) -> SandboxError {
        self.done = true;
        SandboxError::io(
            &self.path,
            std::io::Error::new(ErrorKind::InvalidData, "stream did not contain valid UTF-8"),
        )
    }
}
