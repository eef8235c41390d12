use clap::Parser;
use filedrop::{FileServer, ServerConfig};
use std::{path::PathBuf, process::ExitCode};

/// Accepts file uploads over HTTP POST and hands out the uploader on GET.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    address: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = filedrop::DEFAULT_PORT)]
    port: u16,

    /// Directory uploads are written into, created if missing
    #[arg(long, default_value = "./uploads")]
    upload_dir: PathBuf,

    /// File returned for every GET request
    #[arg(long, default_value = "./uploader")]
    served_file: PathBuf,

    /// Connections handled at once
    #[arg(long, default_value_t = 10)]
    max_connections: usize,
}

fn main() -> ExitCode {
    filedrop::init_logging();
    let args = Args::parse();

    let config = ServerConfig {
        address: args.address,
        port: args.port,
        upload_dir: args.upload_dir,
        served_file: args.served_file,
        max_connections: args.max_connections,
    };
    let file_server = match FileServer::new(config) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    match file_server.local_addr() {
        Ok(addr) => tracing::info!(%addr, "Starting server"),
        Err(_) => tracing::info!("Starting server"),
    }
    file_server.handle_incoming_connections();
    ExitCode::SUCCESS
}
