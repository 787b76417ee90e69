//! Boot record - the tree's metadata file.
//!
//! # Format
//! A flat run of fixed-width uppercase hexadecimal fields, no separators:
//! ```text
//! ┌──────────────────┬──────────────────┬──────────────────┬──────────────────┬───
//! │ root             │ block size       │ file size        │ free offset 0    │ ...
//! │ 16 hex chars     │ 16 hex chars     │ 16 hex chars     │ 16 hex chars     │
//! └──────────────────┴──────────────────┴──────────────────┴──────────────────┴───
//! ```
//! An empty tree stores `FFFFFFFFFFFFFFFF` as its root. The file lives next
//! to the index at `<index path>.boot` and is replaced atomically on save.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::common::config::{BOOT_FIELD_WIDTH, BOOT_SUFFIX};
use crate::common::{BlockOffset, Error, Result};
use crate::storage::node::NodeLayout;

/// Number of fixed fields before the free list.
const FIXED_FIELDS: usize = 3;

/// Decoded boot record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecord {
    pub root: Option<BlockOffset>,
    pub block_size: usize,
    pub file_size: u64,
    /// Free blocks in reuse order.
    pub free: Vec<BlockOffset>,
}

/// Location of the boot record for the index at `index_path`.
pub fn boot_path(index_path: &Path) -> PathBuf {
    let mut path = index_path.as_os_str().to_owned();
    path.push(BOOT_SUFFIX);
    PathBuf::from(path)
}

impl BootRecord {
    /// Record of an empty tree with no blocks.
    pub fn empty(block_size: usize) -> Self {
        Self {
            root: None,
            block_size,
            file_size: 0,
            free: Vec::new(),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity((FIXED_FIELDS + self.free.len()) * BOOT_FIELD_WIDTH);
        push_field(&mut out, BlockOffset::to_raw(self.root));
        push_field(&mut out, self.block_size as u64);
        push_field(&mut out, self.file_size);
        for offset in &self.free {
            push_field(&mut out, offset.0);
        }
        out
    }

    /// Parse and validate a record.
    ///
    /// # Errors
    /// `CorruptBoot` on a bad length, a non-hex digit, an invalid block
    /// size, or an offset that is misaligned, past `file_size`, or
    /// repeated in the free list.
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.as_bytes();
        if text.len() % BOOT_FIELD_WIDTH != 0 || text.len() < FIXED_FIELDS * BOOT_FIELD_WIDTH {
            return Err(Error::CorruptBoot(format!(
                "length {} is not a whole number of fields",
                text.len()
            )));
        }

        let fields = text
            .chunks(BOOT_FIELD_WIDTH)
            .map(parse_field)
            .collect::<Result<Vec<u64>>>()?;

        let block_size = usize::try_from(fields[1])
            .ok()
            .and_then(|size| NodeLayout::new(size).ok())
            .map(|layout| layout.block_size())
            .ok_or_else(|| Error::CorruptBoot(format!("invalid block size {}", fields[1])))?;
        let file_size = fields[2];
        if file_size % block_size as u64 != 0 {
            return Err(Error::CorruptBoot(format!(
                "file size {} is not a multiple of block size {}",
                file_size, block_size
            )));
        }

        let check = |what: &str, offset: BlockOffset| -> Result<BlockOffset> {
            if !offset.is_aligned(block_size) || offset.0 >= file_size {
                return Err(Error::CorruptBoot(format!(
                    "{} {} outside file of {} bytes",
                    what, offset, file_size
                )));
            }
            Ok(offset)
        };

        let root = BlockOffset::from_raw(fields[0])
            .map(|root| check("root", root))
            .transpose()?;

        let free = fields[FIXED_FIELDS..]
            .iter()
            .map(|&raw| check("free block", BlockOffset::new(raw)))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = std::collections::HashSet::with_capacity(free.len());
        if let Some(dup) = free.iter().find(|offset| !seen.insert(**offset)) {
            return Err(Error::CorruptBoot(format!("free list contains {} twice", dup)));
        }

        Ok(Self {
            root,
            block_size,
            file_size,
            free,
        })
    }

    /// Read the record at `path`, `None` if the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| Error::CorruptBoot("record is not ASCII".to_string()))?;
                Self::decode(&text).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the record to `path` through a synced temporary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut file = File::create(&tmp)?;
            file.write_all(self.encode().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn push_field(out: &mut String, value: u64) {
    use std::fmt::Write as _;
    // Writing to a String cannot fail.
    let _ = write!(out, "{:0width$X}", value, width = BOOT_FIELD_WIDTH);
}

fn parse_field(chunk: &[u8]) -> Result<u64> {
    std::str::from_utf8(chunk)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(|| {
            Error::CorruptBoot(format!(
                "field {:?} is not hexadecimal",
                String::from_utf8_lossy(chunk)
            ))
        })
}
