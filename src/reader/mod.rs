use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

/// Prefix of every name the receiver invents for an anonymous upload.
pub(crate) const GENERATED_PREFIX: &str = "uploaded_file_";

/// Sets up the directory uploads are written into.
/// Safe to call when it already exists.
pub fn configure_upload_directory(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        tracing::info!(dir = %dir.display(), "creating upload directory");
    }
    fs::create_dir_all(dir)
}

/// Reads the whole served asset. Any failure is reported to the client as a
/// missing file, so the error kind is not inspected by callers.
pub fn fetch_file_buffer(file: &Path) -> io::Result<Vec<u8>> {
    fs::read(file)
}

/// `uploaded_file_<uuid>_<unix seconds>`; the uuid keeps names unique within one second.
pub fn generated_file_name() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("{}{}_{}", GENERATED_PREFIX, Uuid::new_v4(), timestamp)
}

/// Picks the stored name for an upload.
///
/// A declared name is reduced to its last path component (both `/` and `\`
/// count as separators). Returns `None` when that component cannot name a
/// file inside the upload directory (`""`, `.`, `..`). A missing or blank
/// declaration falls back to [`generated_file_name`].
pub fn resolve_file_name(declared: Option<&str>) -> Option<String> {
    let declared = match declared.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => return Some(generated_file_name()),
    };

    let base = declared
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    match base {
        "" | "." | ".." => None,
        name => Some(name.to_owned()),
    }
}

/// Writes `content` to `<dir>/<file_name>`, replacing any previous file of that name.
pub fn store_upload(dir: &Path, file_name: &str, content: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_declared_name_is_basename() {
        assert_eq!(Some("report.pdf".to_owned()), resolve_file_name(Some("report.pdf")));
        assert_eq!(
            Some("passwd".to_owned()),
            resolve_file_name(Some("../../etc/passwd"))
        );
        assert_eq!(
            Some("evil.txt".to_owned()),
            resolve_file_name(Some("..\\..\\evil.txt"))
        );
        assert_eq!(Some("c.bin".to_owned()), resolve_file_name(Some("/a/b/c.bin")));
    }

    #[test]
    fn test_unusable_declared_names() {
        assert_eq!(None, resolve_file_name(Some("some/dir/")));
        assert_eq!(None, resolve_file_name(Some("..")));
        assert_eq!(None, resolve_file_name(Some("a/.")));
    }

    #[test]
    fn test_blank_declaration_generates() {
        let name = resolve_file_name(Some("   ")).unwrap();
        assert!(name.starts_with(GENERATED_PREFIX));
        let name = resolve_file_name(None).unwrap();
        assert!(name.starts_with(GENERATED_PREFIX));
    }

    #[test]
    fn test_generated_names_are_unique() {
        let pattern = Regex::new(r"^uploaded_file_[0-9a-f-]{36}_\d+$").unwrap();
        let first = generated_file_name();
        let second = generated_file_name();
        assert!(pattern.is_match(&first), "{first}");
        assert!(pattern.is_match(&second), "{second}");
        assert_ne!(first, second);
    }

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        store_upload(dir.path(), "same.txt", b"first").unwrap();
        let path = store_upload(dir.path(), "same.txt", b"second").unwrap();
        assert_eq!(b"second".to_vec(), fs::read(path).unwrap());
        assert_eq!(1, fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn test_configure_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("uploads");
        configure_upload_directory(&nested).unwrap();
        configure_upload_directory(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
