use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use hex::encode;
use sha2::{Digest, Sha256, Sha512};

use crate::error::RunupError;

/// Files are streamed through both hashers in blocks of this size.
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Two independent digests over the same bytes. The pair is the identity of a
/// piece of content everywhere in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    sha256: String,
    sha512: String,
}

impl ContentDigest {
    pub fn new(sha256: String, sha512: String) -> Self {
        ContentDigest { sha256, sha512 }
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn sha512(&self) -> &str {
        &self.sha512
    }

    pub fn short(&self) -> &str {
        &self.sha256[..self.sha256.len().min(7)]
    }
}

pub struct Hash;

impl Hash {
    pub fn compute_content_digest(path: &Path) -> Result<ContentDigest, RunupError> {
        let f = File::open(path)?;
        let reader = BufReader::with_capacity(HASH_BLOCK_SIZE, f);

        Self::digest_reader(reader, HASH_BLOCK_SIZE)
    }

    pub fn digest_reader<R: Read>(
        mut reader: R,
        block_size: usize,
    ) -> Result<ContentDigest, RunupError> {
        if block_size == 0 {
            return Err(RunupError::Error("Hash block size must be non-zero".to_string()));
        }

        let mut sha256 = Sha256::new();
        let mut sha512 = Sha512::new();
        let mut buffer = vec![0; block_size];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            sha256.update(&buffer[..bytes_read]);
            sha512.update(&buffer[..bytes_read]);
        }

        Ok(ContentDigest::new(
            encode(sha256.finalize()),
            encode(sha512.finalize()),
        ))
    }
}
