use thiserror::Error;

use crate::{
    config::{Bits, Endian},
    errno::Errno,
    memory::{
        AddressSpace, GuestReader, GuestWriter, MemoryError, uint_from_bytes, uint_to_bytes,
    },
};

/// Width of a record field in the guest ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U16,
    U32,
    U64,
    /// The guest's native `long`: 4 bytes on 32-bit guests, 8 on 64-bit.
    Long,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub width: FieldWidth,
}

const fn field(name: &'static str, width: FieldWidth) -> Field {
    Field { name, width }
}

/// Fixed field order of a record as the guest sees it.
#[derive(Debug)]
pub struct RecordLayout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

/// Generic Linux `struct stat`.
pub static STAT: RecordLayout = RecordLayout {
    name: "stat",
    fields: &[
        field("st_dev", FieldWidth::Long),
        field("st_ino", FieldWidth::Long),
        field("st_mode", FieldWidth::U32),
        field("st_nlink", FieldWidth::U32),
        field("st_uid", FieldWidth::U32),
        field("st_gid", FieldWidth::U32),
        field("st_rdev", FieldWidth::Long),
        field("__pad1", FieldWidth::Long),
        field("st_size", FieldWidth::Long),
        field("st_blksize", FieldWidth::U32),
        field("__pad2", FieldWidth::U32),
        field("st_blocks", FieldWidth::Long),
        field("st_atime", FieldWidth::Long),
        field("st_atime_nsec", FieldWidth::Long),
        field("st_mtime", FieldWidth::Long),
        field("st_mtime_nsec", FieldWidth::Long),
        field("st_ctime", FieldWidth::Long),
        field("st_ctime_nsec", FieldWidth::Long),
        field("__unused4", FieldWidth::U32),
        field("__unused5", FieldWidth::U32),
    ],
};

/// `struct iovec { void *iov_base; size_t iov_len; }`
pub static IOVEC: RecordLayout = RecordLayout {
    name: "iovec",
    fields: &[
        field("iov_base", FieldWidth::Long),
        field("iov_len", FieldWidth::Long),
    ],
};

/// A host value with a fixed guest layout.
///
/// `to_fields` yields one value per layout field (padding included) in layout
/// order; values wider than the field are truncated to it.
pub trait GuestRecord: Sized {
    const LAYOUT: &'static RecordLayout;

    fn to_fields(&self) -> Vec<u64>;

    /// Rebuild from zero-extended field values.
    fn from_fields(fields: &[u64]) -> Self;
}

/// File status in a host-independent form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

impl From<&libc::stat> for HostStat {
    fn from(s: &libc::stat) -> Self {
        HostStat {
            dev: s.st_dev as u64,
            ino: s.st_ino as u64,
            mode: s.st_mode as u32,
            nlink: s.st_nlink as u64,
            uid: s.st_uid,
            gid: s.st_gid,
            rdev: s.st_rdev as u64,
            size: s.st_size as i64,
            blksize: s.st_blksize as i64,
            blocks: s.st_blocks as i64,
            atime: s.st_atime as i64,
            atime_nsec: s.st_atime_nsec as i64,
            mtime: s.st_mtime as i64,
            mtime_nsec: s.st_mtime_nsec as i64,
            ctime: s.st_ctime as i64,
            ctime_nsec: s.st_ctime_nsec as i64,
        }
    }
}

impl GuestRecord for HostStat {
    const LAYOUT: &'static RecordLayout = &STAT;

    fn to_fields(&self) -> Vec<u64> {
        vec![
            self.dev,
            self.ino,
            self.mode.into(),
            self.nlink,
            self.uid.into(),
            self.gid.into(),
            self.rdev,
            0,
            self.size as u64,
            self.blksize as u64,
            0,
            self.blocks as u64,
            self.atime as u64,
            self.atime_nsec as u64,
            self.mtime as u64,
            self.mtime_nsec as u64,
            self.ctime as u64,
            self.ctime_nsec as u64,
            0,
            0,
        ]
    }

    fn from_fields(f: &[u64]) -> Self {
        let at = |i: usize| f.get(i).copied().unwrap_or(0);
        HostStat {
            dev: at(0),
            ino: at(1),
            mode: at(2) as u32,
            nlink: at(3),
            uid: at(4) as u32,
            gid: at(5) as u32,
            rdev: at(6),
            size: at(8) as i64,
            blksize: at(9) as i64,
            blocks: at(11) as i64,
            atime: at(12) as i64,
            atime_nsec: at(13) as i64,
            mtime: at(14) as i64,
            mtime_nsec: at(15) as i64,
            ctime: at(16) as i64,
            ctime_nsec: at(17) as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iovec {
    pub base: u64,
    pub len: u64,
}

impl GuestRecord for Iovec {
    const LAYOUT: &'static RecordLayout = &IOVEC;

    fn to_fields(&self) -> Vec<u64> {
        vec![self.base, self.len]
    }

    fn from_fields(f: &[u64]) -> Self {
        Iovec {
            base: f.first().copied().unwrap_or(0),
            len: f.get(1).copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no room to encode {layout} at {addr:#x}: {source}")]
    Encoding {
        layout: &'static str,
        addr: u64,
        source: MemoryError,
    },
    #[error("failed to decode {layout} at {addr:#x}: {source}")]
    Decoding {
        layout: &'static str,
        addr: u64,
        source: MemoryError,
    },
}

impl From<CodecError> for Errno {
    fn from(_: CodecError) -> Self {
        Errno::EFAULT
    }
}

/// Packs records using the guest's byte order and word width.
#[derive(Debug, Clone, Copy)]
pub struct StructCodec {
    bits: Bits,
    endian: Endian,
}

impl StructCodec {
    pub fn new(bits: Bits, endian: Endian) -> Self {
        Self { bits, endian }
    }

    pub fn for_space(space: &AddressSpace) -> Self {
        Self::new(space.bits(), space.endian())
    }

    pub fn width(&self, width: FieldWidth) -> usize {
        match width {
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
            FieldWidth::U64 => 8,
            FieldWidth::Long => self.bits.word_bytes(),
        }
    }

    pub fn size_of(&self, layout: &RecordLayout) -> usize {
        layout.fields.iter().map(|f| self.width(f.width)).sum()
    }

    pub fn encode<R: GuestRecord>(&self, record: &R) -> Vec<u8> {
        let layout = R::LAYOUT;
        let mut out = Vec::with_capacity(self.size_of(layout));
        let values = record.to_fields();
        for (i, field) in layout.fields.iter().enumerate() {
            let value = values.get(i).copied().unwrap_or(0);
            out.extend(uint_to_bytes(value, self.width(field.width), self.endian));
        }
        out
    }

    pub fn decode<R: GuestRecord>(&self, bytes: &[u8]) -> R {
        let mut values = Vec::with_capacity(R::LAYOUT.fields.len());
        let mut offset = 0;
        for field in R::LAYOUT.fields {
            let width = self.width(field.width);
            let chunk = bytes.get(offset..offset + width).unwrap_or(&[]);
            values.push(uint_from_bytes(chunk, self.endian));
            offset += width;
        }
        R::from_fields(&values)
    }

    /// Write the whole record at the writer's position, or nothing at all.
    pub fn pack<R: GuestRecord>(
        &self,
        record: &R,
        writer: &mut GuestWriter<'_>,
    ) -> Result<(), CodecError> {
        let bytes = self.encode(record);
        writer
            .write_bytes(&bytes)
            .map_err(|source| CodecError::Encoding {
                layout: R::LAYOUT.name,
                addr: writer.position(),
                source,
            })
    }

    pub fn unpack<R: GuestRecord>(&self, reader: &mut GuestReader<'_>) -> Result<R, CodecError> {
        let addr = reader.position();
        let bytes = reader
            .read_bytes(self.size_of(R::LAYOUT))
            .map_err(|source| CodecError::Decoding {
                layout: R::LAYOUT.name,
                addr,
                source,
            })?;
        Ok(self.decode(&bytes))
    }

    pub fn write_record<R: GuestRecord>(
        &self,
        space: &mut AddressSpace,
        addr: u64,
        record: &R,
    ) -> Result<(), CodecError> {
        self.pack(record, &mut space.writer(addr))
    }

    pub fn read_record<R: GuestRecord>(
        &self,
        space: &AddressSpace,
        addr: u64,
    ) -> Result<R, CodecError> {
        self.unpack(&mut space.reader(addr))
    }
}
