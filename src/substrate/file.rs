use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::Substrate;
use crate::error::SubstrateError;

const RECORD_EXT: &str = "json";

/// A directory-backed substrate: one file per key.
///
/// File names are the blake3 digest of the key, so any key maps to a safe
/// name.  Records outlive the process; a fresh `FileSubstrate` over the same
/// directory sees everything written before.
///
/// Writes go to a unique temporary file in the same directory and are renamed
/// over the target, so a reader never observes a half-written record.
#[derive(Debug)]
pub struct FileSubstrate {
    dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl FileSubstrate {
    /// Opens (creating if needed) a substrate rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SubstrateError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SubstrateError::io(&dir, e))?;
        Ok(FileSubstrate {
            dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes()).to_hex();
        self.dir.join(format!("{}.{}", hash, RECORD_EXT))
    }

    /// Removes every record file in the directory.
    ///
    /// Returns the number of records removed.
    pub fn clear(&self) -> Result<usize, SubstrateError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| SubstrateError::io(&self.dir, e))?;
        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| SubstrateError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
                fs::remove_file(&path).map_err(|e| SubstrateError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn tmp_path_for(&self, target: &Path) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let name = target
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("record");
        // .<name>.tmp.<pid>.<seq>
        target.with_file_name(format!(".{}.tmp.{}.{}", name, std::process::id(), seq))
    }

    fn write_and_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        // Rename does not replace an existing file on Windows.
        #[cfg(windows)]
        {
            if target.exists() {
                fs::remove_file(target)?;
            }
        }
        fs::rename(tmp, target)
    }
}

impl Substrate for FileSubstrate {
    fn raw_get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SubstrateError::io(path, e)),
        };
        String::from_utf8(bytes).map(Some).map_err(|e| SubstrateError::NotUtf8 {
            path,
            source: e.utf8_error(),
        })
    }

    fn raw_set(&self, key: &str, record: &str) -> Result<(), SubstrateError> {
        let target = self.path_for(key);
        let tmp = self.tmp_path_for(&target);
        Self::write_and_rename(&tmp, &target, record.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            SubstrateError::io(&target, e)
        })
    }

    fn raw_delete(&self, key: &str) -> Result<(), SubstrateError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SubstrateError::io(path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileSubstrate::open(dir.path()).unwrap();

        assert_eq!(s.raw_get("TOKEN").unwrap(), None);
        s.raw_set("TOKEN", r#"{"value":"a","expiry":1.0}"#).unwrap();
        assert_eq!(
            s.raw_get("TOKEN").unwrap().as_deref(),
            Some(r#"{"value":"a","expiry":1.0}"#)
        );
        s.raw_delete("TOKEN").unwrap();
        assert_eq!(s.raw_get("TOKEN").unwrap(), None);
        s.raw_delete("TOKEN").unwrap();
    }

    #[test]
    fn non_utf8_record_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileSubstrate::open(dir.path()).unwrap();
        fs::write(s.path_for("k"), [0xff, 0xfe, 0x7b]).unwrap();
        assert!(matches!(
            s.raw_get("k"),
            Err(SubstrateError::NotUtf8 { .. })
        ));
    }

    #[test]
    fn keys_with_path_characters_are_safe() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileSubstrate::open(dir.path()).unwrap();
        s.raw_set("../escape/attempt", "x").unwrap();
        assert!(s.path_for("../escape/attempt").starts_with(dir.path()));
        assert_eq!(s.raw_get("../escape/attempt").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileSubstrate::open(dir.path()).unwrap();
        for i in 0..5 {
            s.raw_set("k", &i.to_string()).unwrap();
        }
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1, "unexpected files: {:?}", names);
        assert_eq!(s.raw_get("k").unwrap().as_deref(), Some("4"));
    }

    #[test]
    fn clear_removes_only_records() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileSubstrate::open(dir.path()).unwrap();
        s.raw_set("a", "1").unwrap();
        s.raw_set("b", "2").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        assert_eq!(s.clear().unwrap(), 2);
        assert_eq!(s.raw_get("a").unwrap(), None);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let s = FileSubstrate::open(&nested).unwrap();
        assert!(s.dir().is_dir());
    }
}
