// do not make public as a lib
mod client;
mod reader;
mod server;

// reexport only what the binaries need, plus the error and response types they get back
pub use client::{upload_file, UploadError, UploadResponse, DEFAULT_PORT};
pub use server::server::{FileServer, FileServerError, ServerConfig};

/// Installs the tracing subscriber shared by both binaries. Logs go to
/// stderr; `RUST_LOG` overrides the default `filedrop=info` filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filedrop=info".into()),
        )
        .init();
}
