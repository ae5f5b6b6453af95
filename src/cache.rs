use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::{Result, TsdbError};
use crate::resource::Resource;

/// Per-block cache of mapped chunk segment files, keyed by segment id.
///
/// Segments are mapped on first access and kept for the life of the block;
/// entries are only ever inserted, so resources handed out stay valid. The
/// head-chunks loader also publishes WAL-synthesised raw chunks here under
/// synthetic segment ids.
#[derive(Debug, Default)]
pub struct ChunkFileCache {
    chunk_dir: PathBuf,
    cache: Mutex<HashMap<u32, Arc<Resource>>>,
}

impl ChunkFileCache {
    pub fn new(chunk_dir: PathBuf) -> Self {
        Self {
            chunk_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The resource for `segment_id`, mapping `"{:06}"` under the chunk
    /// directory on first use.
    pub fn get(&self, segment_id: u32) -> Result<Arc<Resource>> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(resource) = cache.get(&segment_id) {
            return Ok(Arc::clone(resource));
        }

        let path = self.chunk_dir.join(format!("{:06}", segment_id));
        if !path.is_file() {
            return Err(TsdbError::MissingChunkFile { path });
        }
        debug!(segment_id, path = %path.display(), "mapping chunk segment");
        let resource = Arc::new(Resource::map_file(&path)?);
        cache.insert(segment_id, Arc::clone(&resource));
        Ok(resource)
    }

    /// Publish an externally built resource under `segment_id`.
    pub fn store(&self, segment_id: u32, resource: Arc<Resource>) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        if cache.contains_key(&segment_id) {
            return Err(TsdbError::Parse(format!(
                "chunk file cache already holds segment {}",
                segment_id
            )));
        }
        cache.insert(segment_id, resource);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_get_maps_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("000007"))
            .unwrap()
            .write_all(b"segment")
            .unwrap();

        let cache = ChunkFileCache::new(dir.path().to_path_buf());
        let first = cache.get(7).unwrap();
        assert_eq!(first.bytes(), b"segment");
        let second = cache.get(7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_segment_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkFileCache::new(dir.path().to_path_buf());
        let err = cache.get(3).unwrap_err();
        match err {
            TsdbError::MissingChunkFile { path } => {
                assert!(path.ends_with("000003"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_store_rejects_duplicates() {
        let cache = ChunkFileCache::new(PathBuf::new());
        cache
            .store(0xFF00_0000, Arc::new(Resource::from_vec(vec![1])))
            .unwrap();
        assert_eq!(cache.get(0xFF00_0000).unwrap().bytes(), &[1]);
        assert!(cache
            .store(0xFF00_0000, Arc::new(Resource::from_vec(vec![2])))
            .is_err());
    }
}
