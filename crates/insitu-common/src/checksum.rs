//! Streaming digests for artifact verification

use crate::error::Result;
use sha2::{Digest, Sha512};
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer used for every digest computation (512 KiB)
pub const CHECKSUM_BUFFER_SIZE: usize = 512 * 1024;

/// Compute the hex SHA-512 of any readable source
pub fn compute_sha512<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha512::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the hex SHA-512 of a file without loading it into memory
pub async fn sha512_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = Sha512::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
