use std::{io, net::TcpListener, process::Command};

fn uploader() -> Command {
    Command::new(env!("CARGO_BIN_EXE_uploader"))
}

/// Too few positional arguments prints usage and fails.
#[test]
fn test_too_few_arguments() {
    let output = uploader().arg("127.0.0.1").output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn test_too_many_arguments() {
    let output = uploader()
        .args(["127.0.0.1", "a.txt", "b.txt"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

/// A missing local file is reported on stdout and exits cleanly without dialing.
#[test]
fn test_missing_file() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.bin");
    let output = uploader()
        .arg("127.0.0.1")
        .arg(&missing)
        .args(["--port", &port.to_string()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        format!("File {} does not exist.\n", missing.display()),
        String::from_utf8_lossy(&output.stdout)
    );
    assert_eq!(
        io::ErrorKind::WouldBlock,
        listener.accept().unwrap_err().kind()
    );
}
