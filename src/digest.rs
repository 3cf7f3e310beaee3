//! Streaming file digests for checksum manifests.

use crate::error::{ReleaseError, Result};
use camino::Utf8Path;
use sha2::Digest;
use sha2::digest::Output;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::str::FromStr;

const CHUNK_SIZE: usize = 8192;

/// A supported checksum algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256, the default.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// MD5.
    Md5,
    /// CRC-32 (IEEE), formatted as eight hex digits.
    Crc32,
}

impl Algorithm {
    /// Configuration name of the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Md5 => "md5",
            Self::Crc32 => "crc32",
        }
    }

    /// Digests the file at `path`, returning lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from opening or reading the file unchanged.
    pub fn digest_file(self, path: &Utf8Path) -> io::Result<String> {
        let file = File::open(path)?;
        self.digest_reader(file)
    }

    /// Digests everything `reader` yields, returning lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    pub fn digest_reader(self, reader: impl Read) -> io::Result<String> {
        match self {
            Self::Sha1 => hash_with::<sha1::Sha1>(reader),
            Self::Sha224 => hash_with::<sha2::Sha224>(reader),
            Self::Sha256 => hash_with::<sha2::Sha256>(reader),
            Self::Sha384 => hash_with::<sha2::Sha384>(reader),
            Self::Sha512 => hash_with::<sha2::Sha512>(reader),
            Self::Md5 => hash_with::<md5::Md5>(reader),
            Self::Crc32 => {
                let mut hasher = crc32fast::Hasher::new();
                for_each_chunk(reader, |chunk| hasher.update(chunk))?;
                Ok(format!("{:08x}", hasher.finalize()))
            }
        }
    }
}

fn hash_with<D>(reader: impl Read) -> io::Result<String>
where
    D: Digest,
    Output<D>: fmt::LowerHex,
{
    let mut hasher = D::new();
    for_each_chunk(reader, |chunk| hasher.update(chunk))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn for_each_chunk(mut reader: impl Read, mut consume: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        consume(buffer.get(..bytes_read).unwrap_or_default());
    }
}

impl FromStr for Algorithm {
    type Err = ReleaseError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "sha1" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            "md5" => Ok(Self::Md5),
            "crc32" => Ok(Self::Crc32),
            other => Err(ReleaseError::UnknownAlgorithm {
                name: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
