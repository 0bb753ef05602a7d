//! Artifact writers.
//!
//! Every write replaces the whole file: contents go to a temporary sibling
//! which is then renamed over the target, so an interrupted run never leaves
//! a half-written document behind.
//!
//! The installer usually runs as root while the service runs as the account
//! that invoked `sudo`; [`ArtifactSink::hand_over`] gives the node home to
//! that account once everything in it has been written.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ffi::CString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("permission denied writing {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("service account '{0}' does not exist")]
    UnknownAccount(String),
}

impl WriteError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            WriteError::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            WriteError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl From<WriteError> for ns_common::Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::PermissionDenied { path } => ns_common::Error::PermissionDenied {
                path: path.display().to_string(),
            },
            WriteError::Io { source, .. } => ns_common::Error::Io(source),
            WriteError::UnknownAccount(_) => ns_common::Error::CapabilityMissing(err.to_string()),
        }
    }
}

/// Record of one written artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: usize,
    /// Unix permission bits, rendered in octal.
    #[serde(serialize_with = "serialize_mode")]
    pub mode: u32,
}

fn serialize_mode<S: serde::Serializer>(mode: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:04o}", mode))
}

impl WrittenArtifact {
    pub fn describe(path: &Path, contents: &[u8], mode: u32) -> Self {
        WrittenArtifact {
            path: path.to_path_buf(),
            sha256: hex::encode(Sha256::digest(contents)),
            bytes: contents.len(),
            mode,
        }
    }
}

pub trait ArtifactSink {
    /// Replace `path` with `contents`, creating parent directories.
    fn write(&mut self, path: &Path, contents: &[u8], mode: u32)
        -> Result<WrittenArtifact, WriteError>;

    /// Give `root` and everything below it to the account `owner`.
    /// Returns the number of entries changed.
    fn hand_over(&mut self, root: &Path, owner: &str) -> Result<usize, WriteError>;

    /// Whether artifacts actually reach the filesystem.
    fn is_persistent(&self) -> bool {
        true
    }
}

/// Writes to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactSink;

impl ArtifactSink for FsArtifactSink {
    fn write(
        &mut self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<WrittenArtifact, WriteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WriteError::from_io(parent, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))?;
            fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(WriteError::from_io(path, e));
        }

        let written = WrittenArtifact::describe(path, contents, mode);
        debug!(path = %path.display(), bytes = written.bytes, "artifact written");
        Ok(written)
    }

    fn hand_over(&mut self, root: &Path, owner: &str) -> Result<usize, WriteError> {
        let (uid, gid) =
            lookup_account(owner).ok_or_else(|| WriteError::UnknownAccount(owner.to_string()))?;
        if !root.exists() {
            return Ok(0);
        }
        let changed = chown_tree(root, uid, gid)?;
        debug!(root = %root.display(), owner, uid, entries = changed, "ownership handed over");
        Ok(changed)
    }
}

/// uid and primary gid of a local account.
fn lookup_account(name: &str) -> Option<(u32, u32)> {
    let name = CString::new(name).ok()?;
    // SAFETY: getpwnam returns null or a pointer to a static record that
    // stays valid until the next getpw* call; the fields are copied out
    // before returning.
    unsafe {
        let entry = libc::getpwnam(name.as_ptr());
        if entry.is_null() {
            None
        } else {
            Some(((*entry).pw_uid, (*entry).pw_gid))
        }
    }
}

/// Change ownership of `path` and, for directories, everything inside it.
/// Symlinks are re-owned themselves, never followed.
fn chown_tree(path: &Path, uid: u32, gid: u32) -> Result<usize, WriteError> {
    std::os::unix::fs::lchown(path, Some(uid), Some(gid))
        .map_err(|e| WriteError::from_io(path, e))?;
    let mut changed = 1;
    let meta = fs::symlink_metadata(path).map_err(|e| WriteError::from_io(path, e))?;
    if meta.is_dir() {
        for entry in fs::read_dir(path).map_err(|e| WriteError::from_io(path, e))? {
            let entry = entry.map_err(|e| WriteError::from_io(path, e))?;
            changed += chown_tree(&entry.path(), uid, gid)?;
        }
    }
    Ok(changed)
}

/// Keeps artifacts in memory; backs dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactSink {
    files: BTreeMap<PathBuf, (Vec<u8>, u32)>,
    owners: Vec<(PathBuf, String)>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(|(c, _)| c.as_slice())
    }

    pub fn get_str(&self, path: &Path) -> Option<&str> {
        self.get(path).and_then(|c| std::str::from_utf8(c).ok())
    }

    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.files.get(path).map(|(_, m)| *m)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every `(root, owner)` hand-over requested, in order.
    pub fn hand_overs(&self) -> &[(PathBuf, String)] {
        &self.owners
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn write(
        &mut self,
        path: &Path,
        contents: &[u8],
        mode: u32,
    ) -> Result<WrittenArtifact, WriteError> {
        self.files
            .insert(path.to_path_buf(), (contents.to_vec(), mode));
        Ok(WrittenArtifact::describe(path, contents, mode))
    }

    fn hand_over(&mut self, root: &Path, owner: &str) -> Result<usize, WriteError> {
        self.owners.push((root.to_path_buf(), owner.to_string()));
        Ok(self
            .files
            .keys()
            .filter(|path| path.starts_with(root))
            .count())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_sink_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config").join("app.toml");
        let mut sink = FsArtifactSink;

        sink.write(&path, b"pruning = \"default\"\nextra = 1\n", 0o644)
            .unwrap();
        let written = sink.write(&path, b"pruning = \"nothing\"\n", 0o644).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "pruning = \"nothing\"\n");
        assert_eq!(written.bytes, 20);
        assert_eq!(written.sha256.len(), 64);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_fs_sink_sets_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("launch.sh");
        FsArtifactSink.write(&path, b"#!/bin/sh\n", 0o755).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_memory_sink_records() {
        let mut sink = MemoryArtifactSink::new();
        let path = Path::new("/srv/noded/config/genesis.json");
        let a = sink.write(path, b"{}", 0o644).unwrap();
        assert_eq!(sink.get_str(path), Some("{}"));
        assert_eq!(sink.mode(path), Some(0o644));
        assert!(!sink.is_persistent());
        assert_eq!(a, WrittenArtifact::describe(path, b"{}", 0o644));
    }

    #[test]
    fn test_memory_sink_records_hand_over() {
        let mut sink = MemoryArtifactSink::new();
        sink.write(Path::new("/srv/noded/config/app.toml"), b"", 0o644)
            .unwrap();
        sink.write(Path::new("/etc/systemd/system/noded.service"), b"", 0o644)
            .unwrap();
        let changed = sink.hand_over(Path::new("/srv/noded"), "node").unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            sink.hand_overs(),
            &[(PathBuf::from("/srv/noded"), "node".to_string())]
        );
    }

    #[test]
    fn test_fs_hand_over_to_current_owner() {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        FsArtifactSink
            .write(&home.join("config/config.toml"), b"", 0o644)
            .unwrap();
        let uid = fs::metadata(dir.path()).unwrap().uid();
        let owner = (|| {
            // SAFETY: see lookup_account.
            let entry = unsafe { libc::getpwuid(uid) };
            if entry.is_null() {
                return None;
            }
            let name = unsafe { std::ffi::CStr::from_ptr((*entry).pw_name) };
            name.to_str().ok().map(str::to_string)
        })();
        let Some(owner) = owner else {
            return;
        };
        let changed = FsArtifactSink.hand_over(&home, &owner).unwrap();
        assert_eq!(changed, 3);
        assert_eq!(fs::metadata(home.join("config/config.toml")).unwrap().uid(), uid);
    }

    #[test]
    fn test_fs_hand_over_unknown_account() {
        let dir = TempDir::new().unwrap();
        let err = FsArtifactSink
            .hand_over(dir.path(), "no-such-account-ns")
            .unwrap_err();
        assert!(matches!(err, WriteError::UnknownAccount(_)));
    }

    #[test]
    fn test_digest_is_sha256() {
        let a = WrittenArtifact::describe(Path::new("x"), b"abc", 0o600);
        assert_eq!(
            a.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(serde_json::to_value(&a).unwrap()["mode"], "0600");
    }
}
