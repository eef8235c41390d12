use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs, io,
    io::{Read, Write},
    net::{Shutdown, TcpStream},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Port the receiver listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8000;

static STATUS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^HTTP/\d\.\d (\d{3})(?: ([^\r\n]*))?\r?$").unwrap()
    // e.g. HTTP/1.1 200 OK
});

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File {} does not exist.", .0.display())]
    MissingFile(PathBuf),
    #[error("Could not read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Filename {0:?} cannot be sent in a header")]
    InvalidFileName(String),
    #[error("Could not connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct UploadResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    fn parse(raw: &[u8]) -> Result<UploadResponse, UploadError> {
        let split = raw
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or_else(|| UploadError::MalformedResponse("no end of headers".to_owned()))?;
        let head = String::from_utf8_lossy(&raw[..split]);
        let status_line = head.lines().next().unwrap_or_default();

        let caps = STATUS_LINE.captures(status_line).ok_or_else(|| {
            UploadError::MalformedResponse(format!("bad status line: {:?}", status_line))
        })?;
        let status = caps[1]
            .parse::<u16>()
            .map_err(|err| UploadError::MalformedResponse(err.to_string()))?;
        let reason = caps.get(2).map_or("", |m| m.as_str()).to_owned();

        Ok(UploadResponse {
            status,
            reason,
            body: String::from_utf8_lossy(&raw[split + 4..]).to_string(),
        })
    }
}

/// Sends one file to `host:port` as a single POST and waits for the answer.
///
/// Nothing touches the network when `path` does not exist. The declared
/// filename is the basename of `path`.
pub fn upload_file(host: &str, port: u16, path: &Path) -> Result<UploadResponse, UploadError> {
    if !path.exists() {
        return Err(UploadError::MissingFile(path.to_path_buf()));
    }

    let content = fs::read(path).map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if file_name.chars().any(char::is_control) {
        return Err(UploadError::InvalidFileName(file_name));
    }

    let addr = format!("{}:{}", host, port);
    tracing::debug!(%addr, file = %file_name, bytes = content.len(), "uploading");
    let mut stream = TcpStream::connect(&addr).map_err(|source| UploadError::Connect {
        addr: addr.clone(),
        source,
    })?;

    write!(stream, "POST / HTTP/1.1\r\nHost: {}\r\n", addr)?;
    write!(stream, "Content-Type: application/octet-stream\r\n")?;
    write!(stream, "Content-Length: {}\r\n", content.len())?;
    write!(stream, "X-Filename: {}\r\nConnection: close\r\n\r\n", file_name)?;
    stream.write_all(&content)?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;
    let response = UploadResponse::parse(&raw)?;
    tracing::debug!(status = response.status, body = %response.body, "upload answered");
    Ok(response)
}
