use dashmap::DashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const READ_BUF_LEN: usize = 64 * 1024;

/// Per-run content hash cache, passed explicitly into the resolver.
/// Scoped to one planning run; there is deliberately no cross-run state.
#[derive(Debug, Default)]
pub struct HashCache {
    map: DashMap<PathBuf, String>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get_or_compute(&self, path: &Path) -> io::Result<String> {
        if let Some(hash) = self.map.get(path) {
            return Ok(hash.clone());
        }
        let hash = hash_file(path)?;
        self.map.insert(path.to_path_buf(), hash.clone());
        Ok(hash)
    }
}

/// Streaming BLAKE3 of a file's contents, hex-encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUF_LEN];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn identical_content_same_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        fs::write(&a, b"solid cube").unwrap();
        fs::write(&b, b"solid cube").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn cache_computes_once_per_path() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        fs::write(&a, b"solid cube").unwrap();

        let cache = HashCache::new();
        let first = cache.get_or_compute(&a).unwrap();
        let second = cache.get_or_compute(&a).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let cache = HashCache::new();
        assert!(cache.get_or_compute(Path::new("/no/such/file")).is_err());
    }
}
