use super::server::FileServerError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::HashMap,
    fmt,
    io::{BufRead, Read, Write},
};

/// Upper bound on the bytes accepted for the request line plus headers.
pub(crate) const MAX_HEAD_BYTES: usize = 8 * 1024;

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z]+) (\S+) HTTP/(\d\.\d)\r?\n?$").unwrap()
    // e.g. POST / HTTP/1.1
});

static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([!#$%&'*+.^_`|~0-9A-Za-z-]+):[ \t]*(.*?)[ \t]*\r?\n?$").unwrap()
    // e.g. X-Filename: report.pdf
});

#[derive(Eq, Hash, PartialEq, Clone, Debug)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }
}

/// A parsed request. Only the head is read eagerly; the body is pulled
/// separately once the handler knows how many bytes to expect.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub target: String,
    headers: HashMap<String, String>,
}

impl Request {
    /// Reads the request line and headers, stopping at the blank line.
    pub fn read_head<R: BufRead>(reader: &mut R) -> Result<Request, FileServerError> {
        let mut consumed = 0;
        let request_line = read_head_line(reader, &mut consumed)?;
        let caps = REQUEST_LINE.captures(&request_line).ok_or_else(|| {
            FileServerError::MalformedRequest(format!(
                "bad request line: {:?}",
                request_line.trim_end()
            ))
        })?;
        let method = Method::from(&caps[1]);
        let target = caps[2].to_owned();

        let mut headers = HashMap::new();
        loop {
            let line = read_head_line(reader, &mut consumed)?;
            if line == "\r\n" || line == "\n" {
                break;
            }
            let caps = HEADER_LINE.captures(&line).ok_or_else(|| {
                FileServerError::MalformedRequest(format!("bad header line: {:?}", line.trim_end()))
            })?;
            headers.insert(caps[1].to_ascii_lowercase(), caps[2].to_owned());
        }

        Ok(Request {
            method,
            target,
            headers,
        })
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_length(&self) -> Result<usize, FileServerError> {
        let raw = self
            .header("Content-Length")
            .ok_or(FileServerError::MissingContentLength)?;
        raw.trim()
            .parse::<usize>()
            .map_err(|_| FileServerError::InvalidContentLength(raw.to_owned()))
    }

    /// Reads exactly `Content-Length` bytes of body from `reader`.
    pub fn read_body<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>, FileServerError> {
        let expected = self.content_length()?;
        // grows with the bytes actually received, never with the declared length
        let mut body = Vec::new();
        reader.take(expected as u64).read_to_end(&mut body)?;
        if body.len() < expected {
            return Err(FileServerError::IncompleteBody { expected });
        }
        Ok(body)
    }
}

fn read_head_line<R: BufRead>(
    reader: &mut R,
    consumed: &mut usize,
) -> Result<String, FileServerError> {
    let mut buffer = Vec::new();
    let remaining = MAX_HEAD_BYTES.saturating_sub(*consumed) as u64;
    let read = reader.take(remaining).read_until(b'\n', &mut buffer)?;
    *consumed += read;
    if read == 0 {
        return Err(FileServerError::MalformedRequest(
            "connection closed before end of headers".to_owned(),
        ));
    }
    if !buffer.ends_with(b"\n") {
        return Err(FileServerError::MalformedRequest(format!(
            "request head exceeds {} bytes",
            MAX_HEAD_BYTES
        )));
    }
    String::from_utf8(buffer)
        .map_err(|_| FileServerError::MalformedRequest("request head is not utf-8".to_owned()))
}

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
        Response {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into().into_bytes(),
        }
    }

    pub fn octet_stream(body: Vec<u8>) -> Response {
        Response {
            status: StatusCode::Ok,
            content_type: "application/octet-stream",
            body,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status.code(),
            self.status.reason(),
            self.content_type,
            self.body.len()
        )?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn head(raw: &str) -> Result<Request, FileServerError> {
        Request::read_head(&mut BufReader::new(Cursor::new(raw.as_bytes().to_vec())))
    }

    #[test]
    fn test_parse_post_head() {
        let request =
            head("POST /upload HTTP/1.1\r\nContent-Length: 5\r\nx-filename: a.txt\r\n\r\nhello")
                .unwrap();
        assert_eq!(Method::Post, request.method);
        assert_eq!("/upload", request.target);
        assert_eq!(Some("a.txt"), request.header("X-Filename"));
        assert_eq!(5, request.content_length().unwrap());
    }

    #[test]
    fn test_body_follows_head() {
        let mut reader = BufReader::new(Cursor::new(
            b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello world".to_vec(),
        ));
        let request = Request::read_head(&mut reader).unwrap();
        assert_eq!(b"hello".to_vec(), request.read_body(&mut reader).unwrap());
    }

    #[test]
    fn test_missing_and_invalid_content_length() {
        let request = head("POST / HTTP/1.1\r\n\r\n").unwrap();
        assert!(matches!(
            request.content_length(),
            Err(FileServerError::MissingContentLength)
        ));

        let request = head("POST / HTTP/1.1\r\nContent-Length: -3\r\n\r\n").unwrap();
        assert!(matches!(
            request.content_length(),
            Err(FileServerError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn test_huge_declared_length_is_not_preallocated() {
        let mut reader = BufReader::new(Cursor::new(
            b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nabc".to_vec(),
        ));
        let request = Request::read_head(&mut reader).unwrap();
        assert!(matches!(
            request.read_body(&mut reader),
            Err(FileServerError::IncompleteBody { .. })
        ));
    }

    #[test]
    fn test_short_body() {
        let mut reader = BufReader::new(Cursor::new(
            b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc".to_vec(),
        ));
        let request = Request::read_head(&mut reader).unwrap();
        assert!(matches!(
            request.read_body(&mut reader),
            Err(FileServerError::IncompleteBody { expected: 10 })
        ));
    }

    #[test]
    fn test_malformed_heads() {
        assert!(matches!(
            head("garbage\r\n\r\n"),
            Err(FileServerError::MalformedRequest(_))
        ));
        assert!(matches!(
            head("GET / HTTP/1.1\r\nno colon here\r\n\r\n"),
            Err(FileServerError::MalformedRequest(_))
        ));
        assert!(matches!(
            head("GET / HTTP/1.1\r\nHost: x\r\n"),
            Err(FileServerError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_oversized_head() {
        let raw = format!("GET / HTTP/1.1\r\nX-Pad: {}\r\n\r\n", "a".repeat(MAX_HEAD_BYTES));
        assert!(matches!(head(&raw), Err(FileServerError::MalformedRequest(_))));
    }

    #[test]
    fn test_unknown_method_is_kept() {
        let request = head("DELETE /x HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(Method::Other("DELETE".to_owned()), request.method);
    }

    #[test]
    fn test_response_wire_format() {
        let mut out = Vec::new();
        Response::plain_text(StatusCode::NotFound, "File not found")
            .write_to(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 14\r\n"));
        assert!(text.ends_with("\r\n\r\nFile not found"));
    }
}
