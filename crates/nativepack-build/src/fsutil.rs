//! Filesystem helpers shared by the assembler, packager and verifier.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Recursively copy `src` into `dst`, recreating symlinks as symlinks.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let link = std::fs::read_link(&from)?;
            symlink(&link, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Copy every `.h` file under `src` into `dst`, keeping relative paths.
/// Returns the copied paths relative to `dst`, sorted.
pub fn copy_headers(src: &Path, dst: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    copy_headers_inner(src, src, dst, &mut copied)?;
    copied.sort();
    Ok(copied)
}

fn copy_headers_inner(
    root: &Path,
    dir: &Path,
    dst: &Path,
    copied: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            copy_headers_inner(root, &path, dst, copied)?;
        } else if path.extension().is_some_and(|e| e == "h") {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            let to = dst.join(&rel);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &to)?;
            copied.push(rel);
        }
    }
    Ok(())
}

/// Create (or replace) a symbolic link at `link` pointing to `target`.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
pub fn symlink(_target: &Path, link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create symlink {}: unsupported on this host", link.display()),
    ))
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn headers_only_and_nested() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("include");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("h3api.h"), "").unwrap();
        std::fs::write(src.join("sub/extra.h"), "").unwrap();
        std::fs::write(src.join("notes.txt"), "").unwrap();

        let dst = dir.path().join("Headers");
        let copied = copy_headers(&src, &dst).unwrap();
        assert_eq!(
            copied,
            vec![PathBuf::from("h3api.h"), PathBuf::from("sub/extra.h")]
        );
        assert!(dst.join("sub/extra.h").is_file());
        assert!(!dst.join("notes.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_keeps_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("Versions/A")).unwrap();
        std::fs::write(src.join("Versions/A/H3"), "bin").unwrap();
        symlink(Path::new("A"), &src.join("Versions/Current")).unwrap();

        let dst = dir.path().join("dst");
        copy_tree(&src, &dst).unwrap();
        let link = dst.join("Versions/Current");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("A"));
        assert_eq!(std::fs::read_to_string(dst.join("Versions/Current/H3")).unwrap(), "bin");
    }

    #[test]
    fn remove_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_if_exists(&dir.path().join("nope")).unwrap();
    }
}
