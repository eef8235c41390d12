use clap::Parser;
use filedrop::{upload_file, UploadError};
use std::{path::PathBuf, process::ExitCode};

/// Uploads one file to a filedrop server.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Server host or IP address
    host: String,

    /// Local file to upload
    file: PathBuf,

    /// Server port
    #[arg(short, long, default_value_t = filedrop::DEFAULT_PORT)]
    port: u16,
}

fn main() -> ExitCode {
    filedrop::init_logging();
    // clap exits with status 2 and a usage message on a wrong argument count
    let args = Args::parse();

    match upload_file(&args.host, args.port, &args.file) {
        Ok(response) if response.is_success() => {
            let file_name = args
                .file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            println!("File uploaded successfully: {}", file_name);
            ExitCode::SUCCESS
        }
        Ok(response) => {
            println!(
                "Failed to upload file: {} {}",
                response.status, response.reason
            );
            ExitCode::SUCCESS
        }
        Err(err @ UploadError::MissingFile(_)) => {
            println!("{}", err);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "upload failed");
            ExitCode::FAILURE
        }
    }
}
