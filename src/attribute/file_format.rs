use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use bytes::{Buf, BufMut, BytesMut};
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

/// Which blob of an enumerated attribute a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Distinct values in dictionary order.
    UniqueValues,
    /// One saved enum per document or per value slot.
    Enums,
    /// Values per document, multi-value attributes only.
    Counts,
    /// One weight per value slot, weighted sets only.
    Weights,
}

impl FileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::UniqueValues => "udat",
            FileKind::Enums => "dat",
            FileKind::Counts => "idx",
            FileKind::Weights => "weight",
        }
    }

    pub fn path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, self.extension()))
    }
}

/// Fixed-size header in front of every attribute blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub kind: FileKind,
    pub entries: u64,
    pub checksum: u32, // CRC32 of the body
}

impl FileHeader {
    pub const MAGIC: u32 = 0x454e_554d;
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 24;

    pub fn new(kind: FileKind, entries: u64, body: &[u8]) -> Self {
        FileHeader {
            magic: Self::MAGIC,
            version: Self::VERSION,
            kind,
            entries,
            checksum: crc32fast::hash(body),
        }
    }
}

/// Header followed by body, ready to be written.
pub fn encode(kind: FileKind, entries: u64, body: &[u8]) -> Result<Vec<u8>> {
    let header = FileHeader::new(kind, entries, body);
    let mut data = bincode::serialize(&header)?;
    debug_assert_eq!(data.len(), FileHeader::SIZE);
    data.extend_from_slice(body);
    Ok(data)
}

/// Check the header of `data` and return it with the body.
pub fn decode(kind: FileKind, data: &[u8]) -> Result<(FileHeader, &[u8])> {
    if data.len() < FileHeader::SIZE {
        return Err(Error::corrupt(format!(
            "{} file too short for header: {} bytes",
            kind.extension(),
            data.len()
        )));
    }
    let header: FileHeader = bincode::deserialize(&data[..FileHeader::SIZE])?;
    if header.magic != FileHeader::MAGIC {
        return Err(Error::corrupt(format!("bad magic {:#x} in {} file", header.magic, kind.extension())));
    }
    if header.version != FileHeader::VERSION {
        return Err(Error::invalid_argument(format!(
            "incompatible {} file version {}",
            kind.extension(),
            header.version
        )));
    }
    if header.kind != kind {
        return Err(Error::corrupt(format!("expected {:?} file, found {:?}", kind, header.kind)));
    }
    let body = &data[FileHeader::SIZE..];
    let checksum = crc32fast::hash(body);
    if checksum != header.checksum {
        return Err(Error::corrupt(format!(
            "{} checksum mismatch: header {:#x}, body {:#x}",
            kind.extension(),
            header.checksum,
            checksum
        )));
    }
    Ok((header, body))
}

pub fn write_file(path: &Path, kind: FileKind, entries: u64, body: &[u8]) -> Result<()> {
    let data = encode(kind, entries, body)?;
    let mut file = File::create(path)?;
    file.write_all(&data)?;
    file.sync_all()?;
    Ok(())
}

/// Read-only mapping of a saved attribute file.
pub struct MappedFile {
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|err| Error::from(err).context(path.display()))?;
        let len = file.metadata()?.len() as usize;
        // Zero-length files cannot be mapped.
        if len == 0 {
            return Ok(MappedFile { mmap: None });
        }
        // SAFETY: attribute files are written once and never modified in place.
        let mmap = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(MappedFile { mmap: Some(mmap) })
    }

    pub fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

pub fn put_u32s(values: impl IntoIterator<Item = u32>) -> BytesMut {
    let mut buf = BytesMut::new();
    for v in values {
        buf.put_u32(v);
    }
    buf
}

pub fn put_i32s(values: impl IntoIterator<Item = i32>) -> BytesMut {
    let mut buf = BytesMut::new();
    for v in values {
        buf.put_i32(v);
    }
    buf
}

fn check_len(header: &FileHeader, body: &[u8]) -> Result<()> {
    let wanted = header.entries as usize * 4;
    if body.len() != wanted {
        return Err(Error::corrupt(format!(
            "{} body holds {} bytes, header promises {} entries",
            header.kind.extension(),
            body.len(),
            header.entries
        )));
    }
    Ok(())
}

pub fn get_u32s(header: &FileHeader, mut body: &[u8]) -> Result<Vec<u32>> {
    check_len(header, body)?;
    let mut values = Vec::with_capacity(header.entries as usize);
    while body.has_remaining() {
        values.push(body.get_u32());
    }
    Ok(values)
}

pub fn get_i32s(header: &FileHeader, mut body: &[u8]) -> Result<Vec<i32>> {
    check_len(header, body)?;
    let mut values = Vec::with_capacity(header.entries as usize);
    while body.has_remaining() {
        values.push(body.get_i32());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn header_has_fixed_size() {
        let header = FileHeader::new(FileKind::Weights, 3, b"abc");
        assert_eq!(bincode::serialize(&header).unwrap().len(), FileHeader::SIZE);
    }

    #[test]
    fn decode_rejects_wrong_kind_and_corruption() {
        let body = put_u32s([1, 2, 3]);
        let mut data = encode(FileKind::Enums, 3, &body).unwrap();
        let (header, decoded) = decode(FileKind::Enums, &data).unwrap();
        assert_eq!(get_u32s(&header, decoded).unwrap(), vec![1, 2, 3]);
        assert_eq!(decode(FileKind::Counts, &data).unwrap_err().kind, ErrorKind::Corrupt);

        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert_eq!(decode(FileKind::Enums, &data).unwrap_err().kind, ErrorKind::Corrupt);
        assert!(decode(FileKind::Enums, &data[..10]).is_err());
    }

    #[test]
    fn mapped_file_reads_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileKind::Weights.path(dir.path(), "w");
        write_file(&path, FileKind::Weights, 2, &put_i32s([-4, 9])).unwrap();
        let mapped = MappedFile::open(&path).unwrap();
        let (header, body) = decode(FileKind::Weights, mapped.data()).unwrap();
        assert_eq!(get_i32s(&header, body).unwrap(), vec![-4, 9]);
        assert_eq!(
            MappedFile::open(&dir.path().join("missing.dat")).err().map(|e| e.kind),
            Some(ErrorKind::NotFound)
        );
    }
}
