use std::{fmt, fs::File, io, path::Path, str::FromStr};

use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Digest algorithms understood by the integrity verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl ChecksumAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            other => {
                Err(HashError::UnknownAlgorithm {
                    name: other.to_string(),
                })
            }
        }
    }
}

/// A checksum the caller expects a file to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChecksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: String,
}

impl ExpectedChecksum {
    /// Parses `algo:hex` or bare `hex`.
    ///
    /// A bare digest is interpreted with `default` as its algorithm. The digest is stored
    /// lowercase so later comparisons are case-insensitive.
    ///
    /// # Example
    ///
    /// ```
    /// use artifex_utils::hash::{ChecksumAlgorithm, ExpectedChecksum};
    ///
    /// let sum = ExpectedChecksum::parse("BLAKE3:ABCD", ChecksumAlgorithm::Sha256).unwrap();
    /// assert_eq!(sum.algorithm, ChecksumAlgorithm::Blake3);
    /// assert_eq!(sum.digest, "abcd");
    /// ```
    pub fn parse(value: &str, default: ChecksumAlgorithm) -> HashResult<Self> {
        let value = value.trim();
        let (algorithm, digest) = match value.split_once(':') {
            Some((algo, digest)) => (algo.parse()?, digest),
            None => (default, value),
        };

        Ok(Self {
            algorithm,
            digest: digest.to_ascii_lowercase(),
        })
    }

    pub fn matches(&self, computed: &str) -> bool {
        self.digest.eq_ignore_ascii_case(computed)
    }
}

impl fmt::Display for ExpectedChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Incremental hash accumulator fed chunk by chunk while data streams through.
///
/// The accumulator is consumed by [`Checksummer::finalize`], so a digest can only be taken
/// once per transfer.
#[derive(Clone)]
pub enum Checksummer {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Checksummer {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Checksummer::Sha256(Sha256::new()),
            ChecksumAlgorithm::Blake3 => Checksummer::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Checksummer::Sha256(_) => ChecksumAlgorithm::Sha256,
            Checksummer::Blake3(_) => ChecksumAlgorithm::Blake3,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Checksummer::Sha256(hasher) => hasher.update(chunk),
            Checksummer::Blake3(hasher) => {
                hasher.update(chunk);
            }
        }
    }

    /// Returns the lowercase hex digest of everything fed so far.
    pub fn finalize(self) -> String {
        match self {
            Checksummer::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Checksummer::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Calculates the checksum of a file.
///
/// The file is hashed with the requested algorithm and the digest is returned as a
/// lowercase hex-encoded string.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
///
/// # Example
///
/// ```no_run
/// use artifex_utils::error::HashResult;
/// use artifex_utils::hash::{calculate_checksum, ChecksumAlgorithm};
///
/// fn main() -> HashResult<()> {
///     let checksum = calculate_checksum("/path/to/file", ChecksumAlgorithm::Sha256)?;
///     println!("Checksum is {}", checksum);
///     Ok(())
/// }
/// ```
pub fn calculate_checksum<P: AsRef<Path>>(
    file_path: P,
    algorithm: ChecksumAlgorithm,
) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut file = File::open(file_path).map_err(read_failed)?;
            let mut hasher = Sha256::new();
            io::copy(&mut file, &mut hasher).map_err(read_failed)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
        ChecksumAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            hasher.update_mmap(file_path).map_err(read_failed)?;
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

/// Verifies the checksum of a file against an expected value.
///
/// The digest is compared case-insensitively.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn verify_checksum<P: AsRef<Path>>(
    file_path: P,
    expected: &ExpectedChecksum,
) -> HashResult<bool> {
    let actual = calculate_checksum(file_path, expected.algorithm)?;
    Ok(expected.matches(&actual))
}
