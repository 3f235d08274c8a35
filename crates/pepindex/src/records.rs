//! Length-prefixed record files
//!
//! A record file is the 4-byte magic number, then any number of
//! `<varint length><payload>` records, then a single zero byte. Payloads are
//! bincode-encoded serde values; the reader must know the payload type up
//! front, since nothing in the framing identifies it.

use crate::header::{FileType, Header};
use crate::Error;
use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Read, Write};
use std::marker::PhantomData;

pub const MAGIC_NUMBER: u32 = 0xfead_1234;

/// A u32 needs at most 5 base-128 digits
const MAX_VARINT_BYTES: usize = 5;

/// Anything that can be stored as a record payload
pub trait Message: Sized {
    fn encode(&self) -> Result<Vec<u8>, Error>;
    fn decode(bytes: &[u8]) -> Result<Self, Error>;
}

impl<T: Serialize + DeserializeOwned> Message for T {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let (value, read) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(Error::MalformedRecord(format!(
                "payload has {} trailing bytes",
                bytes.len() - read
            )));
        }
        Ok(value)
    }
}

pub fn write_magic<W: Write>(stream: &mut W) -> Result<(), Error> {
    stream.write_all(&MAGIC_NUMBER.to_le_bytes())?;
    Ok(())
}

/// Consume the magic number, failing with [`Error::CorruptFile`] if it is
/// missing or wrong
pub fn read_magic<R: Read>(stream: &mut R) -> Result<(), Error> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            Error::CorruptFile("stream is shorter than the magic number".into())
        }
        _ => Error::Io(err),
    })?;
    let found = u32::from_le_bytes(buf);
    if found != MAGIC_NUMBER {
        return Err(Error::CorruptFile(format!(
            "expected magic number {:#010x}, found {:#010x}",
            MAGIC_NUMBER, found
        )));
    }
    Ok(())
}

pub fn write_varint<W: Write>(stream: &mut W, mut value: u32) -> Result<(), Error> {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let mut n = 0;
    loop {
        let digit = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[n] = digit;
            n += 1;
            break;
        }
        buf[n] = digit | 0x80;
        n += 1;
    }
    stream.write_all(&buf[..n])?;
    Ok(())
}

/// Write one record. Empty payloads are rejected, since a zero length
/// marks the end of the stream.
pub fn write_record<W: Write>(stream: &mut W, bytes: &[u8]) -> Result<(), Error> {
    if bytes.is_empty() {
        return Err(Error::MalformedRecord(
            "cannot write an empty record".into(),
        ));
    }
    let len = u32::try_from(bytes.len()).map_err(|_| {
        Error::MalformedRecord(format!("record of {} bytes is too large", bytes.len()))
    })?;
    write_varint(stream, len)?;
    stream.write_all(bytes)?;
    Ok(())
}

pub fn write_sentinel<W: Write>(stream: &mut W) -> Result<(), Error> {
    stream.write_all(&[0])?;
    Ok(())
}

fn read_byte<R: Read>(stream: &mut R) -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Read a varint record length.
///
/// Returns `None` if the stream was already exhausted, and `Some(0)` for the
/// end-of-stream sentinel.
pub fn read_length<R: Read>(stream: &mut R) -> Result<Option<u32>, Error> {
    let mut value = 0u32;
    for i in 0..MAX_VARINT_BYTES {
        let byte = match read_byte(stream)? {
            Some(byte) => byte,
            None if i == 0 => return Ok(None),
            None => {
                return Err(Error::MalformedRecord(
                    "stream ended inside a record length".into(),
                ))
            }
        };
        let digit = (byte & 0x7f) as u32;
        // Only the low 4 bits of the fifth digit fit in a u32
        if i == MAX_VARINT_BYTES - 1 && digit > 0x0f {
            return Err(Error::MalformedRecord(
                "record length overflows a u32".into(),
            ));
        }
        value |= digit << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
    }
    Err(Error::MalformedRecord(format!(
        "record length is longer than {} bytes",
        MAX_VARINT_BYTES
    )))
}

/// Read and decode the next record, or `None` at the end of the stream
pub fn read_record<R: Read, T: Message>(stream: &mut R) -> Result<Option<T>, Error> {
    let len = match read_length(stream)? {
        None | Some(0) => return Ok(None),
        Some(len) => len,
    };
    let mut buf = Vec::new();
    stream.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len as usize {
        return Err(Error::MalformedRecord(format!(
            "expected {} payload bytes, found {}",
            len,
            buf.len()
        )));
    }
    T::decode(&buf).map(Some)
}

/// Lazy iterator over the records remaining in a stream. Stops at the
/// sentinel, and yields nothing more after the first error.
pub struct Records<R, T> {
    stream: R,
    done: bool,
    _marker: PhantomData<T>,
}

impl<R: Read, T: Message> Records<R, T> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            done: false,
            _marker: PhantomData,
        }
    }
}

impl<R: Read, T: Message> Iterator for Records<R, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_record(&mut self.stream) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: Read, T: Message> std::iter::FusedIterator for Records<R, T> {}

/// Iterate over every record of a stream whose magic number has already
/// been consumed
pub fn iterate<R: Read, T: Message>(stream: R) -> Records<R, T> {
    Records::new(stream)
}

pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(mut inner: W) -> Result<Self, Error> {
        write_magic(&mut inner)?;
        Ok(Self { inner, written: 0 })
    }

    pub fn write<T: Message>(&mut self, message: &T) -> Result<(), Error> {
        let bytes = message.encode()?;
        self.write_bytes(&bytes)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        write_record(&mut self.inner, bytes)?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Terminate the stream and hand back the underlying writer. A writer
    /// dropped without `finish` leaves no sentinel; readers still accept
    /// the clean EOF.
    pub fn finish(mut self) -> Result<W, Error> {
        write_sentinel(&mut self.inner)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

pub struct RecordReader<R: Read> {
    inner: R,
}

impl<R: Read> RecordReader<R> {
    /// Validates the magic number before any record is read
    pub fn new(mut inner: R) -> Result<Self, Error> {
        read_magic(&mut inner)?;
        Ok(Self { inner })
    }

    pub fn read<T: Message>(&mut self) -> Result<Option<T>, Error> {
        read_record(&mut self.inner)
    }

    pub fn records<T: Message>(self) -> Records<R, T> {
        iterate(self.inner)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// A record writer whose first record is a [`Header`]
pub struct HeadedRecordWriter<W: Write> {
    writer: RecordWriter<W>,
}

impl<W: Write> HeadedRecordWriter<W> {
    pub fn new(inner: W, header: &Header) -> Result<Self, Error> {
        let mut writer = RecordWriter::new(inner)?;
        writer.write(header)?;
        Ok(Self { writer })
    }

    pub fn write<T: Message>(&mut self, message: &T) -> Result<(), Error> {
        self.writer.write(message)
    }

    /// Number of records written after the header
    pub fn written(&self) -> usize {
        self.writer.written() - 1
    }

    pub fn finish(self) -> Result<W, Error> {
        self.writer.finish()
    }
}

pub struct HeadedRecordReader<R: Read> {
    reader: RecordReader<R>,
    header: Header,
}

impl<R: Read> HeadedRecordReader<R> {
    pub fn open(inner: R) -> Result<Self, Error> {
        let mut reader = RecordReader::new(inner)?;
        let header = reader
            .read::<Header>()?
            .ok_or_else(|| Error::MalformedRecord("missing header record".into()))?;
        Ok(Self { reader, header })
    }

    /// Open a stream, failing with [`Error::UnexpectedHeader`] unless it
    /// declares the `expected` file type
    pub fn open_expecting(inner: R, expected: FileType) -> Result<Self, Error> {
        let reader = Self::open(inner)?;
        let found = reader.header.file_type();
        if found != expected {
            return Err(Error::UnexpectedHeader { expected, found });
        }
        Ok(reader)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn read<T: Message>(&mut self) -> Result<Option<T>, Error> {
        self.reader.read()
    }

    pub fn records<T: Message>(self) -> Records<R, T> {
        self.reader.records()
    }

    pub fn into_parts(self) -> (Header, RecordReader<R>) {
        (self.header, self.reader)
    }
}
