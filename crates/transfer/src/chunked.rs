use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::types::ChunkRange;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
///
/// The file is streamed through a fixed buffer, so memory use does not
/// depend on file size.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// Splits `file_size` bytes into parts of `chunk_size`, numbered from 1.
///
/// An empty file yields an empty plan.
pub fn plan(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }

    let count = file_size.div_ceil(chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }

    let mut chunks = Vec::with_capacity(count as usize);
    let mut start = 0u64;
    let mut part_number = 1u32;
    while start < file_size {
        let length = std::cmp::min(chunk_size, file_size - start);
        chunks.push(ChunkRange {
            part_number,
            start,
            length,
        });
        start += length;
        part_number += 1;
    }
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// Range reads
// ---------------------------------------------------------------------------

/// Reads exactly `length` bytes at `start`.
///
/// Fails with [`TransferError::FileShrank`] when the file no longer covers
/// the range; a short read is never returned.
pub fn read_range(path: &Path, start: u64, length: u64) -> Result<Vec<u8>, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let needed = start + length;
    let actual = file.metadata()?.len();
    if actual < needed {
        return Err(TransferError::FileShrank { needed, actual });
    }

    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; length as usize];
    match file.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        // Truncated between the metadata call and the read.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            let actual = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            Err(TransferError::FileShrank { needed, actual })
        }
        Err(e) => Err(e.into()),
    }
}
