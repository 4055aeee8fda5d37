//! Local disk storage backend

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{Backend, KeyIter};
use crate::error::StorageError;

/// Extension of in-flight writes
const TMP_EXTENSION: &str = "tmp";

/// Directory name used under the home directory by default
const DEFAULT_DIR_NAME: &str = ".tagcache";

/// Durable backend storing one file per key.
///
/// Records live in a sharded directory structure:
/// `<root>/<first 2 hex chars>/<sha256(key) hex>`
///
/// Each file holds a little-endian `u32` key length, the key bytes, then the
/// record payload, so keys can be recovered by walking the tree.
#[derive(Debug)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Open (or create) a store rooted at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = path.as_ref().to_path_buf();

        if root.exists() && !root.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        fs::create_dir_all(&root)?;
        info!("Opened disk store at {:?}", root);

        Ok(Self { root })
    }

    /// Open the store at [`DiskBackend::default_path`]
    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(Self::default_path())
    }

    /// `$HOME/.tagcache`, or a directory under the system temp dir without a home
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_DIR_NAME)
    }

    /// Get the file path for a key
    fn record_path(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));
        // Use first 2 characters for sharding
        self.root.join(&hash[..2]).join(&hash)
    }

    /// Resolve a `<shard>/<file>` locator produced by `keys`
    fn locate(&self, record: &str) -> Option<PathBuf> {
        let (shard, name) = record.split_once('/')?;
        let valid = |part: &str| {
            !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
        };
        (valid(shard) && valid(name)).then(|| self.root.join(shard).join(name))
    }

    /// Shard directories currently present, in a stable order
    fn shards(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut shards = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                shards.push(path);
            }
        }
        shards.sort();
        Ok(shards)
    }
}

fn is_tmp(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TMP_EXTENSION)
}

fn encode_record(key: &str, payload: &[u8]) -> Result<Vec<u8>, StorageError> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| StorageError::Malformed(format!("key of {} bytes is too long", key.len())))?;

    let mut record = Vec::with_capacity(4 + key.len() + payload.len());
    record.extend_from_slice(&key_len.to_le_bytes());
    record.extend_from_slice(key.as_bytes());
    record.extend_from_slice(payload);
    Ok(record)
}

/// Split a record file into its key and payload
fn decode_record(path: &Path, record: &[u8]) -> Result<(String, Vec<u8>), StorageError> {
    let malformed = |what: &str| StorageError::Malformed(format!("{}: {}", path.display(), what));

    let (len_bytes, rest) = record
        .split_first_chunk::<4>()
        .ok_or_else(|| malformed("truncated header"))?;
    let key_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < key_len {
        return Err(malformed("truncated key"));
    }
    let (key, payload) = rest.split_at(key_len);
    let key = String::from_utf8(key.to_vec()).map_err(|_| malformed("key is not UTF-8"))?;

    Ok((key, payload.to_vec()))
}

/// Read only the key header of a record file
fn read_key(path: &Path) -> Result<String, StorageError> {
    let malformed = |what: &str| StorageError::Malformed(what.to_string());

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)
        .map_err(|_| malformed("truncated header"))?;
    let key_len = u32::from_le_bytes(len_bytes);

    // Header must not claim more bytes than the file holds
    if 4 + u64::from(key_len) > file_len {
        return Err(malformed("key length exceeds record size"));
    }

    let mut key = vec![0u8; key_len as usize];
    file.read_exact(&mut key)
        .map_err(|_| malformed("truncated key"))?;

    String::from_utf8(key).map_err(|_| malformed("key is not UTF-8"))
}

/// `<shard>/<file>` locator of a record path, as accepted by `discard_unreadable`
fn record_locator(path: &Path) -> String {
    let shard = path.parent().and_then(Path::file_name);
    match (shard, path.file_name()) {
        (Some(shard), Some(name)) => {
            format!("{}/{}", shard.to_string_lossy(), name.to_string_lossy())
        }
        _ => path.display().to_string(),
    }
}

/// Key of a record file; parse failures carry the locator for cleanup
fn recover_key(path: &Path) -> Result<String, StorageError> {
    read_key(path).map_err(|e| match e {
        StorageError::Malformed(reason) => StorageError::Unreadable {
            record: record_locator(path),
            reason,
        },
        other => other,
    })
}

impl Backend for DiskBackend {
    fn put(&mut self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.record_path(key);
        debug!("Writing record to {:?}", path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically using a temp file
        let temp_path = path.with_extension(TMP_EXTENSION);
        let mut file = File::create(&temp_path)?;
        file.write_all(&encode_record(key, &bytes)?)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.record_path(key);

        let record = match fs::read(&path) {
            Ok(record) => record,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let (stored_key, payload) = decode_record(&path, &record)?;
        if stored_key != key {
            // sha256 collision or a foreign file; not ours either way
            warn!("Record at {:?} belongs to another key", path);
            return Ok(None);
        }

        Ok(Some(payload))
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        let path = self.record_path(key);
        debug!("Deleting record {:?}", path);

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn keys(&self) -> Result<KeyIter<'_>, StorageError> {
        let files = self.shards()?.into_iter().flat_map(|shard| -> KeyIter<'static> {
            match fs::read_dir(&shard) {
                Ok(entries) => Box::new(entries.filter_map(|entry| match entry {
                    Ok(entry) if is_tmp(&entry.path()) => None,
                    Ok(entry) => Some(recover_key(&entry.path())),
                    Err(e) => Some(Err(StorageError::Io(e))),
                })),
                Err(e) => Box::new(std::iter::once(Err(StorageError::Io(e)))),
            }
        });

        Ok(Box::new(files))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for shard in self.shards()? {
            fs::remove_dir_all(&shard)?;
        }
        self.flush()?;
        info!("Cleared disk store at {:?}", self.root);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // Persist directory entries (renames, unlinks)
        #[cfg(unix)]
        File::open(&self.root)?.sync_all()?;
        Ok(())
    }

    fn on_open(&mut self) -> Result<(), StorageError> {
        if !self.root.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is missing",
                self.root.display()
            )));
        }

        for shard in self.shards()? {
            for entry in fs::read_dir(&shard)? {
                let path = entry?.path();
                if is_tmp(&path) {
                    warn!("Removing interrupted write {:?}", path);
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }

    fn discard_unreadable(&mut self, record: &str) -> Result<(), StorageError> {
        let path = self.locate(record).ok_or_else(|| {
            StorageError::Malformed(format!("invalid record locator {:?}", record))
        })?;
        warn!("Removing unreadable record {:?}", path);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn on_close(&mut self) -> Result<(), StorageError> {
        self.flush()?;
        info!("Closed disk store at {:?}", self.root);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();

        backend.put("user:1", b"payload".to_vec()).unwrap();

        assert_eq!(backend.get("user:1").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(backend.get("user:2").unwrap(), None);
    }

    #[test]
    fn test_records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let mut backend = DiskBackend::open(tmp.path()).unwrap();
            backend.put("k", b"v".to_vec()).unwrap();
        }

        let backend = DiskBackend::open(tmp.path()).unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_sharded_layout() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        backend.put("k", vec![]).unwrap();

        let path = backend.record_path("k");
        let name = path.file_name().unwrap().to_str().unwrap();
        let shard = path.parent().unwrap().file_name().unwrap().to_str().unwrap();

        assert!(path.exists());
        assert_eq!(name.len(), 64);
        assert_eq!(shard, &name[..2]);
    }

    #[test]
    fn test_keys_walks_all_shards() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        for i in 0..20 {
            backend.put(&format!("key{}", i), vec![i as u8]).unwrap();
        }

        let mut keys: Vec<String> = backend.keys().unwrap().collect::<Result<_, _>>().unwrap();
        keys.sort();

        assert_eq!(keys.len(), 20);
        assert!(keys.contains(&"key7".to_string()));
    }

    #[test]
    fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        backend.put("k", vec![1]).unwrap();

        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn test_clear_keeps_root() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        backend.put("a", vec![1]).unwrap();
        backend.put("b", vec![2]).unwrap();

        backend.clear().unwrap();

        assert!(tmp.path().is_dir());
        assert_eq!(backend.keys().unwrap().count(), 0);
    }

    #[test]
    fn test_on_open_removes_stale_temp_files() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        backend.put("k", vec![1]).unwrap();

        let stale = backend.record_path("other").with_extension(TMP_EXTENSION);
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"partial").unwrap();

        backend.on_open().unwrap();

        assert!(!stale.exists());
        assert_eq!(backend.keys().unwrap().count(), 1);
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        backend.put("k", vec![1]).unwrap();
        fs::write(backend.record_path("k"), [0u8, 1]).unwrap();

        assert!(matches!(backend.get("k"), Err(StorageError::Malformed(_))));
    }

    #[test]
    fn test_unreadable_header_reports_locator() {
        let tmp = TempDir::new().unwrap();
        let backend = DiskBackend::open(tmp.path()).unwrap();
        fs::create_dir_all(tmp.path().join("zz")).unwrap();
        fs::write(tmp.path().join("zz").join("deadbeef"), [1u8, 0]).unwrap();

        let results: Vec<_> = backend.keys().unwrap().collect();

        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(StorageError::Unreadable { record, .. }) => assert_eq!(record, "zz/deadbeef"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_oversized_key_length_is_rejected_before_reading() {
        let tmp = TempDir::new().unwrap();
        let backend = DiskBackend::open(tmp.path()).unwrap();
        fs::create_dir_all(tmp.path().join("zz")).unwrap();
        fs::write(tmp.path().join("zz").join("foreign"), [0xff, 0xff, 0xff, 0xff, b'a']).unwrap();

        let results: Vec<_> = backend.keys().unwrap().collect();

        assert!(matches!(
            results.as_slice(),
            [Err(StorageError::Unreadable { reason, .. })] if reason.contains("exceeds")
        ));
    }

    #[test]
    fn test_discard_unreadable_removes_file() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path()).unwrap();
        let file = tmp.path().join("zz").join("deadbeef");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, [1u8, 0]).unwrap();

        backend.discard_unreadable("zz/deadbeef").unwrap();
        backend.discard_unreadable("zz/deadbeef").unwrap();

        assert!(!file.exists());
        assert_eq!(backend.keys().unwrap().count(), 0);
    }

    #[test]
    fn test_discard_unreadable_stays_inside_root() {
        let tmp = TempDir::new().unwrap();
        let mut backend = DiskBackend::open(tmp.path().join("store")).unwrap();
        fs::write(tmp.path().join("outside"), b"keep").unwrap();

        for record in ["../outside", "zz/..", "outside", "/zz", "zz/a/b"] {
            assert!(
                matches!(backend.discard_unreadable(record), Err(StorageError::Malformed(_))),
                "{} should be rejected",
                record
            );
        }
        assert!(tmp.path().join("outside").exists());
    }

    #[test]
    fn test_open_on_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            DiskBackend::open(&file),
            Err(StorageError::Unavailable(_))
        ));
    }
}
