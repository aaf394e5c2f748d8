use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Readable, closable source of attachment bytes
///
/// Implemented for files opened from a path; callers can supply their own
/// handles (sockets, in-memory pipes) as long as `close` releases them.
pub trait AttachmentHandle: Send + Sync {
    /// Read the remaining content
    fn read_all(&mut self) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>>;

    /// Release the underlying resource
    fn close(&mut self) -> io::Result<()>;
}

/// File opened lazily from a path
#[derive(Debug)]
pub struct FileHandle {
    file: Option<tokio::fs::File>,
}

impl FileHandle {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self { file: Some(file) })
    }
}

impl AttachmentHandle for FileHandle {
    fn read_all(&mut self) -> Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move {
            let file = self.file.as_mut().ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file handle already closed"))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await?;
            Ok(buf)
        })
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the tokio file closes the descriptor
        self.file.take();
        Ok(())
    }
}

pub enum AttachmentSource {
    Bytes(Bytes),
    Path(PathBuf),
    Handle(Box<dyn AttachmentHandle>),
}

impl fmt::Debug for AttachmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            AttachmentSource::Path(path) => write!(f, "Path({})", path.display()),
            AttachmentSource::Handle(_) => f.write_str("Handle"),
        }
    }
}

/// File uploaded alongside a request
///
/// The attachment owns whatever handle it reads from. Whoever executes the request
/// closes it exactly once; dropping an unclosed attachment closes it as well.
#[derive(Debug)]
pub struct FileAttachment {
    name: String,
    description: Option<String>,
    mime: String,
    source: AttachmentSource,
    /// Handle opened from `AttachmentSource::Path` on first read
    opened: Option<FileHandle>,
    closed: bool,
}

impl FileAttachment {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime = guess_mime(&name);
        Self::with_source(name, mime, AttachmentSource::Bytes(bytes.into()))
    }

    /// Attachment read from `path` when the request is sent; named after the file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "file".to_string());
        let mime = guess_mime(&path.to_string_lossy());
        Self::with_source(name, mime, AttachmentSource::Path(path))
    }

    pub fn from_handle(name: impl Into<String>, handle: impl AttachmentHandle + 'static) -> Self {
        let name = name.into();
        let mime = guess_mime(&name);
        Self::with_source(name, mime, AttachmentSource::Handle(Box::new(handle)))
    }

    fn with_source(name: String, mime: String, source: AttachmentSource) -> Self {
        Self { name, description: None, mime, source, opened: None, closed: false }
    }

    /// Override the inferred MIME type
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Load the attachment content, opening the file on first use
    pub async fn read(&mut self) -> io::Result<Bytes> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, format!("attachment {} already closed", self.name)));
        }

        match &mut self.source {
            AttachmentSource::Bytes(bytes) => Ok(bytes.clone()),
            AttachmentSource::Handle(handle) => handle.read_all().await.map(Bytes::from),
            AttachmentSource::Path(path) => {
                if self.opened.is_none() {
                    self.opened = Some(FileHandle::open(path).await?);
                }
                match self.opened.as_mut() {
                    Some(handle) => handle.read_all().await.map(Bytes::from),
                    None => Err(io::Error::new(io::ErrorKind::Other, "file handle missing")),
                }
            }
        }
    }

    /// Release the handle; later calls are no-ops
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match &mut self.source {
            AttachmentSource::Bytes(_) => Ok(()),
            AttachmentSource::Handle(handle) => handle.close(),
            AttachmentSource::Path(_) => match self.opened.as_mut() {
                Some(handle) => handle.close(),
                None => Ok(()),
            },
        }
    }
}

impl Drop for FileAttachment {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(attachment = %self.name, error = %err, "Failed to close attachment");
        }
    }
}

/// MIME type from the file extension, `application/octet-stream` when unknown
pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name).first_or_octet_stream().essence_str().to_string()
}
