pub mod combinatorics;
pub mod database;
pub mod enzyme;
pub mod fasta;
pub mod finalize;
pub mod header;
pub mod mass;
pub mod modification;
pub mod peptide;
pub mod records;
pub mod store;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fasta::Fasta;
use header::FileType;
use serde::de::DeserializeOwned;

/// Every way building or reading an index can fail. None of these are retried.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The stream does not start with the record store magic number
    #[error("corrupt record file: {0}")]
    CorruptFile(String),
    /// Truncated varint, truncated payload, or a payload that does not decode
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("invalid modification specification `{spec}`: {reason}")]
    InvalidModSpec { spec: String, reason: String },
    #[error("protein ids are not dense: expected id {expected}, found {found}")]
    ProteinIdMismatch { expected: u32, found: u32 },
    #[error("expected a {expected} header, found {found}")]
    UnexpectedHeader { expected: FileType, found: FileType },
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::MalformedRecord(err.to_string())
    }
}

/// Read and parse a protein database from `path`
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Fasta, Error> {
    let file = File::open(path.as_ref())?;
    Fasta::read(BufReader::new(file))
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, Error> {
    let file = File::open(path.as_ref())?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
