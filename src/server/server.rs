use super::types::{Method, Request, Response, StatusCode};
use crate::reader::{
    configure_upload_directory, fetch_file_buffer, resolve_file_name, store_upload,
};
use std::{
    io::{self, BufReader},
    net::{SocketAddr, TcpListener, TcpStream},
    path::PathBuf,
    sync::{Arc, Condvar, Mutex},
    thread,
};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub served_file: PathBuf,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0".to_owned(),
            port: 8000,
            upload_dir: PathBuf::from("./uploads"),
            served_file: PathBuf::from("./uploader"),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum FileServerError {
    #[error("Could not start file server on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Missing Content-Length header")]
    MissingContentLength,
    #[error("Invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),
    #[error("Request body ended before {expected} bytes were read")]
    IncompleteBody { expected: usize },
    #[error("Declared filename {0:?} does not name a file")]
    InvalidFileName(String),
    #[error("Unsupported method ({0})")]
    UnsupportedMethod(String),
    #[error("Could not store upload: {0}")]
    Storage(io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FileServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileServerError::MalformedRequest(_)
            | FileServerError::MissingContentLength
            | FileServerError::InvalidContentLength(_)
            | FileServerError::IncompleteBody { .. }
            | FileServerError::InvalidFileName(_) => StatusCode::BadRequest,
            FileServerError::UnsupportedMethod(_) => StatusCode::NotImplemented,
            FileServerError::Bind { .. }
            | FileServerError::Storage(_)
            | FileServerError::Io(_) => StatusCode::InternalServerError,
        }
    }
}

/// Counts free connection slots. Accepting blocks while it is zero.
#[derive(Clone)]
struct ConnectionSlots(Arc<(Mutex<usize>, Condvar)>);

impl ConnectionSlots {
    fn new(count: usize) -> Self {
        ConnectionSlots(Arc::new((Mutex::new(count.max(1)), Condvar::new())))
    }

    /// Blocks for a free slot. The slot returns when the guard drops,
    /// including while a handler thread unwinds.
    fn acquire(&self) -> SlotGuard {
        let (lock, freed) = &*self.0;
        let mut free = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while *free == 0 {
            free = freed
                .wait(free)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *free -= 1;
        SlotGuard(self.clone())
    }

    fn release(&self) {
        let (lock, freed) = &*self.0;
        let mut free = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *free += 1;
        freed.notify_one();
    }
}

struct SlotGuard(ConnectionSlots);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Per-request state shared by every handler thread.
#[derive(Debug)]
struct Context {
    upload_dir: PathBuf,
    served_file: PathBuf,
}

pub struct FileServer {
    listener: TcpListener,
    slots: ConnectionSlots,
    context: Arc<Context>,
}

impl FileServer {
    /// Creates the upload directory and binds the listener.
    pub fn new(config: ServerConfig) -> Result<FileServer, FileServerError> {
        configure_upload_directory(&config.upload_dir).map_err(FileServerError::Storage)?;

        let addr = format!("{}:{}", config.address, config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|source| FileServerError::Bind { addr, source })?;

        Ok(FileServer {
            listener,
            slots: ConnectionSlots::new(config.max_connections),
            context: Arc::new(Context {
                upload_dir: config.upload_dir,
                served_file: config.served_file,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves forever, one thread per connection, bounded by `max_connections`.
    pub fn handle_incoming_connections(&self) {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            let slot = self.slots.acquire();

            let context = self.context.clone();
            thread::spawn(move || {
                let _slot = slot;
                Self::handle_connection(stream, &context);
            });
        }
    }

    fn handle_connection(mut stream: TcpStream, context: &Context) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        tracing::debug!(%peer, "handling incoming connection");

        let response = match Self::dispatch(&stream, context) {
            Ok(response) => response,
            Err(FileServerError::Io(err)) => {
                tracing::warn!(%peer, error = %err, "connection dropped");
                return;
            }
            Err(err) => {
                tracing::warn!(%peer, error = %err, "request failed");
                Response::plain_text(err.status_code(), err.to_string())
            }
        };

        if let Err(err) = response.write_to(&mut stream) {
            tracing::warn!(%peer, error = %err, "failed to write response");
        }
    }

    fn dispatch(stream: &TcpStream, context: &Context) -> Result<Response, FileServerError> {
        let mut reader = BufReader::new(stream);
        let request = Request::read_head(&mut reader)?;
        tracing::info!(method = %request.method, target = %request.target, "request");

        match request.method {
            Method::Get => Ok(Self::handle_download(context)),
            Method::Post => Self::handle_upload(&request, &mut reader, context),
            Method::Other(ref name) => Err(FileServerError::UnsupportedMethod(name.clone())),
        }
    }

    /// Returns the served file regardless of the requested path.
    fn handle_download(context: &Context) -> Response {
        match fetch_file_buffer(&context.served_file) {
            Ok(content) => Response::octet_stream(content),
            Err(err) => {
                tracing::debug!(
                    file = %context.served_file.display(),
                    error = %err,
                    "served file unavailable"
                );
                Response::plain_text(StatusCode::NotFound, "File not found")
            }
        }
    }

    fn handle_upload(
        request: &Request,
        reader: &mut BufReader<&TcpStream>,
        context: &Context,
    ) -> Result<Response, FileServerError> {
        // drain the body before the name is validated
        let content = request.read_body(reader)?;

        let declared = request.header("X-Filename");
        let file_name = resolve_file_name(declared).ok_or_else(|| {
            FileServerError::InvalidFileName(declared.unwrap_or_default().to_owned())
        })?;

        store_upload(&context.upload_dir, &file_name, &content)
            .map_err(FileServerError::Storage)?;

        tracing::info!(file = %file_name, bytes = content.len(), "stored upload");
        Ok(Response::plain_text(
            StatusCode::Ok,
            format!("File uploaded successfully as {}", file_name),
        ))
    }
}
