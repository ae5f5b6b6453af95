use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::errors::Result;

/// Bytes backing a decoder: either a read-only file mapping or an owned
/// buffer (WAL-synthesised chunks, deserialised portable series).
///
/// Only two concrete kinds exist, so this is a plain enum rather than a
/// trait object; every access site monomorphises to a slice either way.
#[derive(Debug)]
pub enum Resource {
    Mapped { map: Mmap, directory: String },
    Mem { data: Vec<u8> },
}

impl Resource {
    /// Map `path` read-only. Empty files cannot be mapped and come back as
    /// empty in-memory resources.
    pub fn map_file(path: &Path) -> Result<Resource> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Resource::Mem { data: Vec::new() });
        }

        // Safety: the mapping is private and read-only; the files this
        // crate reads are immutable once written (blocks are sealed, the
        // WAL is append-only and read once).
        let map = unsafe { Mmap::map(&file)? };
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Resource::Mapped { map, directory })
    }

    pub fn from_vec(data: Vec<u8>) -> Resource {
        Resource::Mem { data }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Resource::Mapped { map, .. } => map,
            Resource::Mem { data } => data,
        }
    }

    /// Directory containing the mapped file; empty for in-memory buffers.
    pub fn directory(&self) -> &str {
        match self {
            Resource::Mapped { directory, .. } => directory,
            Resource::Mem { .. } => "",
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"abc")
            .unwrap();

        let resource = Resource::map_file(&path).unwrap();
        assert_eq!(resource.bytes(), b"abc");
        assert_eq!(resource.directory(), dir.path().to_string_lossy());
    }

    #[test]
    fn test_empty_file_becomes_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::File::create(&path).unwrap();

        let resource = Resource::map_file(&path).unwrap();
        assert!(resource.is_empty());
        assert!(matches!(resource, Resource::Mem { .. }));
    }
}
