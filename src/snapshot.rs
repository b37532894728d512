//! Loader for RDB snapshot files.
//!
//! Ref: <https://rdb.fnordig.de/file_format.html>

use bytes::{Buf, Bytes};
use std::fs;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::store::{Key, Store, Value};

const MAGIC: &[u8; 5] = b"REDIS";
const VERSION_LENGTH: usize = 4;

/// Opcodes of the snapshot body.
const OPCODE_AUX: u8 = 0xFA;
const OPCODE_RESIZE_DB: u8 = 0xFB;
const OPCODE_EXPIRE_TIME_MS: u8 = 0xFC;
const OPCODE_EXPIRE_TIME: u8 = 0xFD;
const OPCODE_SELECT_DB: u8 = 0xFE;
const OPCODE_EOF: u8 = 0xFF;

/// Value type tag of a plain string record.
const TYPE_STRING: u8 = 0x00;

#[derive(Debug, ThisError)]
pub enum SnapshotError {
    #[error("invalid magic string, expected \"REDIS\"")]
    InvalidMagic,
    #[error("unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("unsupported special string encoding {0}")]
    UnsupportedEncoding(u8),
    #[error("unsupported value type 0x{0:02X}")]
    UnsupportedValueType(u8),
}

/// A decoded length-encoded field.
#[derive(Debug, PartialEq)]
enum Length {
    Len(usize),
    /// Special encoding: the field is an integer stored in 1, 2 or 4 bytes.
    Int(i64),
}

/// Decodes the body of a snapshot into key-value entries.
///
/// An expiry opcode only applies to the record that follows it, so the reader keeps it in
/// `pending_expiry` until the next key is read.
#[derive(Debug)]
pub struct SnapshotReader {
    src: Bytes,
    pending_expiry: Option<SystemTime>,
    entries: Vec<(Key, Value)>,
}

impl SnapshotReader {
    pub fn new(src: impl Into<Bytes>) -> Self {
        Self {
            src: src.into(),
            pending_expiry: None,
            entries: Vec::new(),
        }
    }

    /// Reads the whole snapshot. On error, every record decoded before the failure is kept and
    /// can still be taken with [`SnapshotReader::into_entries`].
    pub fn read(&mut self) -> Result<(), SnapshotError> {
        self.read_header()?;

        while self.src.has_remaining() {
            match self.src.get_u8() {
                OPCODE_EOF => break,
                OPCODE_EXPIRE_TIME_MS => {
                    let millis = self.read_u64_le("expire time")?;
                    // A deadline past the representable range never expires.
                    self.pending_expiry = UNIX_EPOCH.checked_add(Duration::from_millis(millis));
                }
                OPCODE_EXPIRE_TIME => {
                    let seconds = self.read_u32_le("expire time")?;
                    self.pending_expiry =
                        UNIX_EPOCH.checked_add(Duration::from_secs(seconds.into()));
                }
                OPCODE_SELECT_DB => {
                    let db = self.read_length()?;
                    debug!("Selecting snapshot database {:?}", db);
                }
                OPCODE_RESIZE_DB => {
                    self.read_length()?;
                    self.read_length()?;
                }
                OPCODE_AUX => {
                    let key = self.read_string()?;
                    let value = self.read_string()?;
                    debug!(
                        "Snapshot aux field {}={}",
                        String::from_utf8_lossy(&key),
                        String::from_utf8_lossy(&value)
                    );
                }
                TYPE_STRING => {
                    let key = self.read_string()?;
                    let data = self.read_string()?;
                    let expires_at = self.pending_expiry.take();
                    self.entries.push((key, Value { data, expires_at }));
                }
                value_type => return Err(SnapshotError::UnsupportedValueType(value_type)),
            }
        }

        Ok(())
    }

    pub fn into_entries(self) -> Vec<(Key, Value)> {
        self.entries
    }

    fn read_header(&mut self) -> Result<(), SnapshotError> {
        if self.src.remaining() < MAGIC.len() {
            return Err(SnapshotError::UnexpectedEof("header"));
        }
        if &self.src[..MAGIC.len()] != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        self.src.advance(MAGIC.len());

        // The version is not validated.
        self.ensure(VERSION_LENGTH, "version")?;
        self.src.advance(VERSION_LENGTH);

        Ok(())
    }

    fn ensure(&self, n: usize, what: &'static str) -> Result<(), SnapshotError> {
        if self.src.remaining() < n {
            return Err(SnapshotError::UnexpectedEof(what));
        }
        Ok(())
    }

    fn read_u8(&mut self, what: &'static str) -> Result<u8, SnapshotError> {
        self.ensure(1, what)?;
        Ok(self.src.get_u8())
    }

    fn read_u32_le(&mut self, what: &'static str) -> Result<u32, SnapshotError> {
        self.ensure(4, what)?;
        Ok(self.src.get_u32_le())
    }

    fn read_u64_le(&mut self, what: &'static str) -> Result<u64, SnapshotError> {
        self.ensure(8, what)?;
        Ok(self.src.get_u64_le())
    }

    /// The two most significant bits of the first byte select the encoding:
    ///
    /// * `00`: the next 6 bits are the length.
    /// * `01`: the next 6 bits and the following byte form a 14 bit length.
    /// * `10`: the following 4 bytes are a big-endian length.
    /// * `11`: special encoding, the next 6 bits select an 8, 16 or 32 bit integer.
    fn read_length(&mut self) -> Result<Length, SnapshotError> {
        let first = self.read_u8("length")?;

        match first >> 6 {
            0b00 => Ok(Length::Len(usize::from(first & 0x3F))),
            0b01 => {
                let second = self.read_u8("length")?;
                Ok(Length::Len(
                    (usize::from(first & 0x3F) << 8) | usize::from(second),
                ))
            }
            0b10 => {
                self.ensure(4, "length")?;
                Ok(Length::Len(self.src.get_u32() as usize))
            }
            _ => match first & 0x3F {
                0 => {
                    self.ensure(1, "8 bit integer")?;
                    Ok(Length::Int(i64::from(self.src.get_i8())))
                }
                1 => {
                    self.ensure(2, "16 bit integer")?;
                    Ok(Length::Int(i64::from(self.src.get_i16_le())))
                }
                2 => {
                    self.ensure(4, "32 bit integer")?;
                    Ok(Length::Int(i64::from(self.src.get_i32_le())))
                }
                encoding => Err(SnapshotError::UnsupportedEncoding(encoding)),
            },
        }
    }

    /// Reads a length-prefixed string. Integer-encoded strings are returned as their decimal
    /// text.
    fn read_string(&mut self) -> Result<Bytes, SnapshotError> {
        match self.read_length()? {
            Length::Len(len) => {
                self.ensure(len, "string")?;
                Ok(self.src.split_to(len))
            }
            Length::Int(int) => Ok(Bytes::from(int.to_string())),
        }
    }
}

/// Decodes a whole snapshot image, returning whatever was read before the first error.
pub fn decode(src: impl Into<Bytes>) -> (Vec<(Key, Value)>, Option<SnapshotError>) {
    let mut reader = SnapshotReader::new(src);
    let err = reader.read().err();
    (reader.into_entries(), err)
}

/// Builds the initial store from the configured snapshot file.
///
/// This never fails: a missing configuration or file gives an empty store, and a malformed file
/// gives the records decoded before the problem.
pub fn load(config: &ServerConfig) -> Store {
    let Some(path) = config.snapshot_path() else {
        info!("No snapshot configured, starting with an empty store");
        return Store::new();
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Snapshot {} not found, starting with an empty store", path.display());
            return Store::new();
        }
        Err(e) => {
            warn!("Failed to read snapshot {}: {}", path.display(), e);
            return Store::new();
        }
    };

    info!("Loading snapshot from {}", path.display());

    let (entries, err) = decode(data);
    if let Some(err) = err {
        warn!(
            "Malformed snapshot {}: {}; keeping {} keys read before the error",
            path.display(),
            err,
            entries.len()
        );
    }

    info!("Loaded {} keys from snapshot", entries.len());

    entries.into_iter().collect()
}
