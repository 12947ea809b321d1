//! On-disk record format.
//!
//! A log starts with the 8-byte magic `BEARCAT\0` and a little-endian `u16`
//! protocol version. Each record that follows is a little-endian `u32` byte
//! length and a bincode-encoded [`RecordEntry`].

use crate::errors::BearcatError;
use crate::trace::CallFrame;
use crate::value::RecordedValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 8] = b"BEARCAT\0";
pub const HIGHEST_PROTOCOL: u16 = 1;
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Upper bound on one encoded record; larger length prefixes mean corruption.
pub const MAX_RECORD_BYTES: u32 = 256 * 1024 * 1024;

pub fn records_file_name(package: &str) -> String {
    format!("bearcat-{package}.records")
}

// ── RecordEntry ───────────────────────────────────────────────────────────────

/// Where a recorded call was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteRecord {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl From<&CallFrame> for CallSiteRecord {
    fn from(frame: &CallFrame) -> Self {
        Self {
            function: frame.function.to_string(),
            file: frame.file.to_string(),
            line: frame.line,
        }
    }
}

impl std::fmt::Display for CallSiteRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Position within the recording session that wrote it.
    pub seq: u64,
    pub call: CallSiteRecord,
    pub value: RecordedValue,
}

pub fn encode_frame(entry: &RecordEntry) -> Result<Vec<u8>, BearcatError> {
    let payload = bincode::serialize(entry).map_err(|e| BearcatError::Serialize(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_BYTES)
        .ok_or_else(|| {
            BearcatError::Serialize(format!(
                "record of {} bytes exceeds the {MAX_RECORD_BYTES} byte limit",
                payload.len()
            ))
        })?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn header_bytes() -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[MAGIC.len()..].copy_from_slice(&HIGHEST_PROTOCOL.to_le_bytes());
    header
}

/// Returns the protocol version stored in `header`.
fn parse_header(header: &[u8], source: &str) -> Result<u16, BearcatError> {
    if header.len() != HEADER_LEN || &header[..MAGIC.len()] != MAGIC {
        return Err(BearcatError::Decode(format!("{source}: not a bearcat log")));
    }
    Ok(u16::from_le_bytes([header[MAGIC.len()], header[MAGIC.len() + 1]]))
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, BearcatError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(BearcatError::Io(e.to_string())),
        }
    }
    Ok(filled)
}

// ── RecordWriter ──────────────────────────────────────────────────────────────

/// Append-only writer. Each record is flushed before `append` returns.
#[derive(Debug)]
pub struct RecordWriter {
    path: PathBuf,
    file: File,
}

impl RecordWriter {
    /// Open `path` for append, writing the header only when the file is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BearcatError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BearcatError::Io(e.to_string()))?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| BearcatError::Io(format!("{}: {e}", path.display())))?;
        let existing = file
            .metadata()
            .map_err(|e| BearcatError::Io(e.to_string()))?
            .len();

        if existing == 0 {
            file.write_all(&header_bytes())
                .and_then(|()| file.flush())
                .map_err(|e| BearcatError::Io(e.to_string()))?;
        } else {
            let mut header = [0u8; HEADER_LEN];
            file.seek(SeekFrom::Start(0))
                .map_err(|e| BearcatError::Io(e.to_string()))?;
            let read = read_up_to(&mut file, &mut header)?;
            let source = path.display().to_string();
            let version = parse_header(&header[..read], &source)
                .map_err(|e| BearcatError::Init(e.to_string()))?;
            if version != HIGHEST_PROTOCOL {
                return Err(BearcatError::Init(format!(
                    "{source}: log uses protocol {version}, this recorder writes {HIGHEST_PROTOCOL}"
                )));
            }
        }
        Ok(Self { path, file })
    }

    pub fn append(&mut self, entry: &RecordEntry) -> Result<(), BearcatError> {
        let frame = encode_frame(entry)?;
        self.file
            .write_all(&frame)
            .and_then(|()| self.file.flush())
            .map_err(|e| BearcatError::Io(format!("{}: {e}", self.path.display())))
    }
}

// ── RecordReader ──────────────────────────────────────────────────────────────

/// Lazy reader over a log. A clean end of file ends iteration; a truncated
/// or undecodable record yields one `Decode` error and then ends it.
pub struct RecordReader<R> {
    reader: R,
    source: String,
    position: usize,
    done: bool,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, BearcatError> {
        let file = File::open(path)
            .map_err(|e| BearcatError::Io(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<R: Read> RecordReader<R> {
    /// An empty stream is an empty log.
    pub fn from_reader(mut reader: R, source: impl Into<String>) -> Result<Self, BearcatError> {
        let source = source.into();
        let mut header = [0u8; HEADER_LEN];
        let read = read_up_to(&mut reader, &mut header)?;
        let done = read == 0;
        if !done {
            let version = parse_header(&header[..read], &source)?;
            if version == 0 || version > HIGHEST_PROTOCOL {
                return Err(BearcatError::Decode(format!(
                    "{source}: unsupported protocol {version} (highest known is {HIGHEST_PROTOCOL})"
                )));
            }
        }
        Ok(Self {
            reader,
            source,
            position: 0,
            done,
        })
    }

    fn read_next(&mut self) -> Result<Option<RecordEntry>, BearcatError> {
        let mut len_bytes = [0u8; 4];
        match read_up_to(&mut self.reader, &mut len_bytes)? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(BearcatError::Decode(format!(
                    "{}: record {} has a truncated length prefix ({n} of 4 bytes)",
                    self.source, self.position
                )))
            }
        }
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_RECORD_BYTES {
            return Err(BearcatError::Decode(format!(
                "{}: record {} claims {len} bytes, over the {MAX_RECORD_BYTES} byte limit",
                self.source, self.position
            )));
        }
        let mut payload = vec![0u8; len as usize];
        let read = read_up_to(&mut self.reader, &mut payload)?;
        if read != payload.len() {
            return Err(BearcatError::Decode(format!(
                "{}: record {} is truncated ({read} of {len} bytes)",
                self.source, self.position
            )));
        }
        let entry = bincode::deserialize(&payload).map_err(|e| {
            BearcatError::Decode(format!("{}: record {}: {e}", self.source, self.position))
        })?;
        self.position += 1;
        Ok(Some(entry))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<RecordEntry, BearcatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.read_next().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

/// Read a whole log into memory.
pub fn read_records(path: &Path) -> Result<Vec<RecordEntry>, BearcatError> {
    RecordReader::open(path)?.collect()
}

// ── rendering ─────────────────────────────────────────────────────────────────

/// `value` rendered for display, or `<hash:sha256:XXXXXXXXXXXXXXXX> (N bytes)`
/// when the rendering is longer than `max_bytes`.
pub fn render_truncated(value: &impl std::fmt::Display, max_bytes: usize) -> String {
    let rendered = value.to_string();
    if rendered.len() <= max_bytes {
        return rendered;
    }
    let hash = Sha256::digest(rendered.as_bytes());
    format!("<hash:sha256:{}> ({} bytes)", hex_bytes(&hash[..8]), rendered.len())
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
