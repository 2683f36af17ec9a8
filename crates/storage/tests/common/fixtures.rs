use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use tessera_storage::{BlobStore, FilesystemBackend};

/// Generate deterministic test data using a seeded pseudo-random generator.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Filesystem blob store rooted in a fresh temp dir, returned as a trait object.
#[allow(dead_code)]
pub async fn filesystem_store() -> (Arc<dyn BlobStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let backend = FilesystemBackend::new(temp_dir.path())
        .await
        .expect("Failed to create filesystem backend");
    (Arc::new(backend), temp_dir)
}
