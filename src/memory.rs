use std::{collections::BTreeMap, fmt, io, ops::BitOr};

use goblin::elf::program_header::{PF_R, PF_W, PF_X};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::{Bits, ConfigError, Endian, GuestConfig},
    errno::Errno,
};

/// Access permissions of a mapping, stored as ELF program header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Prot(u32);

impl Prot {
    pub const NONE: Prot = Prot(0);
    pub const READ: Prot = Prot(PF_R);
    pub const WRITE: Prot = Prot(PF_W);
    pub const EXEC: Prot = Prot(PF_X);
    pub const RW: Prot = Prot(PF_R | PF_W);
    pub const RWX: Prot = Prot(PF_R | PF_W | PF_X);

    /// Convert guest `PROT_READ | PROT_WRITE | PROT_EXEC` bits.
    pub fn from_posix(prot: u64) -> Self {
        let mut flags = 0u32;
        if prot & 0x1 != 0 {
            flags |= PF_R;
        }
        if prot & 0x2 != 0 {
            flags |= PF_W;
        }
        if prot & 0x4 != 0 {
            flags |= PF_X;
        }
        Prot(flags)
    }

    pub fn from_elf_flags(flags: u32) -> Self {
        Prot(flags & (PF_R | PF_W | PF_X))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Prot) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn readable(self) -> bool {
        self.contains(Prot::READ)
    }

    pub fn writable(self) -> bool {
        self.contains(Prot::WRITE)
    }
}

impl BitOr for Prot {
    type Output = Prot;

    fn bitor(self, rhs: Prot) -> Prot {
        Prot(self.0 | rhs.0)
    }
}

impl fmt::Display for Prot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.readable(), 'r'),
            flag(self.writable(), 'w'),
            flag(self.contains(Prot::EXEC), 'x')
        )
    }
}

/// A contiguous guest range backed by host memory owned by the address space.
#[derive(Debug, Clone)]
pub struct Mapping {
    start: u64,
    prot: Prot,
    name: String,
    data: Vec<u8>,
}

impl Mapping {
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn end(&self) -> u64 {
        self.start + self.len()
    }

    pub fn prot(&self) -> Prot {
        self.prot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}-{:#x} {}", self.start, self.end(), self.prot)?;
        if !self.name.is_empty() {
            write!(f, " {}", self.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("guest range {addr:#x}+{len:#x} is not mapped readable")]
    OutOfBounds { addr: u64, len: u64 },
    #[error("guest address {addr:#x} is mapped without write permission")]
    ReadOnly { addr: u64 },
    #[error("guest range {addr:#x}+{len:#x} overlaps an existing mapping")]
    Overlap { addr: u64, len: u64 },
    #[error("guest address {addr:#x} is not page aligned")]
    Misaligned { addr: u64 },
    #[error("zero-length mapping request")]
    ZeroLength,
    #[error("no free guest range for {len:#x} bytes")]
    NoFreeRange { len: u64 },
    #[error("guest range {addr:#x}+{len:#x} overflows the address space")]
    AddressOverflow { addr: u64, len: u64 },
    #[error("{len:#x} more bytes would exceed the host memory limit")]
    OverLimit { len: u64 },
}

impl From<MemoryError> for Errno {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfBounds { .. }
            | MemoryError::ReadOnly { .. }
            | MemoryError::AddressOverflow { .. } => Errno::EFAULT,
            MemoryError::Overlap { .. } => Errno::EEXIST,
            MemoryError::Misaligned { .. } | MemoryError::ZeroLength => Errno::EINVAL,
            MemoryError::NoFreeRange { .. } | MemoryError::OverLimit { .. } => Errno::ENOMEM,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
    /// Host-side initialization: the range must be mapped, protection is ignored.
    Load,
}

const HEAP_NAME: &str = "[heap]";

#[derive(Debug, Clone, Copy)]
struct Heap {
    base: u64,
    brk: u64,
}

/// The guest's mapped memory and heap break for one session.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    bits: Bits,
    endian: Endian,
    page_size: u64,
    mmap_base: u64,
    mmap_limit: u64,
    memory_limit: u64,
    mappings: BTreeMap<u64, Mapping>,
    heap: Option<Heap>,
}

impl AddressSpace {
    /// Build an address space from a config that has already passed
    /// [`GuestConfig::validate`]. A page size that is not a power of two
    /// breaks every alignment computation; use [`AddressSpace::try_new`] for
    /// unchecked configs.
    pub fn new(config: &GuestConfig) -> Self {
        let mut space = Self {
            bits: config.bits,
            endian: config.endian,
            page_size: config.page_size,
            mmap_base: config.mmap_base,
            mmap_limit: config.mmap_limit(),
            memory_limit: config.memory_limit,
            mappings: BTreeMap::new(),
            heap: None,
        };
        if let Some(base) = config.heap_base {
            space.set_heap_base(base);
        }
        space
    }

    pub fn try_new(config: &GuestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn bits(&self) -> Bits {
        self.bits
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Live mappings in address order.
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    pub fn find_mapping(&self, addr: u64) -> Option<&Mapping> {
        self.mappings
            .range(..=addr)
            .next_back()
            .map(|(_, m)| m)
            .filter(|m| m.contains(addr))
    }

    /// Place the heap at `base` (rounded up to a page) with an empty break.
    pub fn set_heap_base(&mut self, base: u64) {
        let base = self.align_up(base).unwrap_or(base);
        self.heap = Some(Heap { base, brk: base });
    }

    pub fn heap_base(&self) -> Option<u64> {
        self.heap.map(|h| h.base)
    }

    pub fn current_brk(&self) -> u64 {
        self.heap.map_or(0, |h| h.brk)
    }

    /// Host bytes currently backing guest mappings.
    pub fn mapped_bytes(&self) -> u64 {
        self.mappings.values().map(Mapping::len).sum()
    }

    /// Fail with [`MemoryError::OverLimit`] unless `len` more bytes fit in the
    /// host memory limit.
    pub fn check_room(&self, len: u64) -> Result<(), MemoryError> {
        self.check_room_after_release(len, 0)
    }

    pub fn read(&self, addr: u64, len: u64) -> Result<Vec<u8>, MemoryError> {
        let chunks = self.chunks(addr, len, Access::Read)?;
        let mut out = Vec::with_capacity(len as usize);
        for (start, offset, count) in chunks {
            out.extend_from_slice(&self.mappings[&start].data[offset..offset + count]);
        }
        Ok(out)
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.copy_in(addr, data, Access::Write)
    }

    /// Write ignoring protection, for mapping pre-fill and debugger pokes.
    pub fn load(&mut self, addr: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.copy_in(addr, data, Access::Load)
    }

    pub fn check_readable(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        self.chunks(addr, len, Access::Read).map(drop)
    }

    pub fn check_writable(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        self.chunks(addr, len, Access::Write).map(drop)
    }

    /// Read a NUL-terminated string, without the terminator.
    ///
    /// Stops early (without error) after `max_len` bytes. Running into unmapped
    /// or unreadable memory before the terminator fails.
    pub fn read_c_string(&self, addr: u64, max_len: Option<usize>) -> Result<Vec<u8>, MemoryError> {
        let mut out = Vec::new();
        let mut cur = addr;
        loop {
            if let Some(max) = max_len
                && out.len() >= max
            {
                return Ok(out);
            }
            let mapping = self
                .find_mapping(cur)
                .filter(|m| m.prot.readable())
                .ok_or(MemoryError::OutOfBounds {
                    addr,
                    len: out.len() as u64 + 1,
                })?;
            let avail = &mapping.data[(cur - mapping.start) as usize..];
            let limit = max_len.map_or(avail.len(), |max| avail.len().min(max - out.len()));
            let avail = &avail[..limit];
            if let Some(pos) = avail.iter().position(|&b| b == 0) {
                out.extend_from_slice(&avail[..pos]);
                return Ok(out);
            }
            out.extend_from_slice(avail);
            cur += avail.len() as u64;
        }
    }

    pub fn read_string(&self, addr: u64, max_len: Option<usize>) -> Result<String, MemoryError> {
        let bytes = self.read_c_string(addr, max_len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn read_uint(&self, addr: u64, width: usize) -> Result<u64, MemoryError> {
        let bytes = self.read(addr, width as u64)?;
        Ok(uint_from_bytes(&bytes, self.endian))
    }

    pub fn write_uint(&mut self, addr: u64, value: u64, width: usize) -> Result<(), MemoryError> {
        let bytes = uint_to_bytes(value, width, self.endian);
        self.write(addr, &bytes)
    }

    pub fn reader(&self, addr: u64) -> GuestReader<'_> {
        GuestReader {
            space: self,
            pos: addr,
        }
    }

    pub fn writer(&mut self, addr: u64) -> GuestWriter<'_> {
        GuestWriter {
            space: self,
            pos: addr,
        }
    }

    /// Record a zero-filled mapping at a fixed, page-aligned address.
    pub fn map_fixed(
        &mut self,
        addr: u64,
        len: u64,
        prot: Prot,
        name: impl Into<String>,
    ) -> Result<(), MemoryError> {
        let (addr, len) = self.page_range(addr, len)?;
        let end = self.range_end(addr, len)?;
        if self.overlaps(addr, end, None) {
            return Err(MemoryError::Overlap { addr, len });
        }
        let data = self.backing(len, 0)?;
        self.insert(addr, data, prot, name.into());
        Ok(())
    }

    /// Choose a page-aligned address for `len` bytes and map it.
    ///
    /// A non-zero `hint` is used when the range there is free; otherwise the
    /// first gap at or above the mmap base is taken.
    pub fn mmap_allocate(&mut self, hint: u64, len: u64, prot: Prot) -> Result<u64, MemoryError> {
        if len == 0 {
            return Err(MemoryError::ZeroLength);
        }
        let len = self
            .align_up(len)
            .ok_or(MemoryError::AddressOverflow { addr: hint, len })?;

        let hinted = (hint != 0)
            .then(|| self.align_down(hint))
            .filter(|&start| {
                self.range_end(start, len)
                    .is_ok_and(|end| !self.overlaps(start, end, None))
            });

        let addr = match hinted {
            Some(addr) => addr,
            None => self
                .find_free_range(len)
                .ok_or(MemoryError::NoFreeRange { len })?,
        };
        let data = self.backing(len, 0)?;
        self.insert(addr, data, prot, "mmap".to_string());
        Ok(addr)
    }

    /// `MAP_FIXED` semantics: whatever is mapped in the range is replaced.
    ///
    /// The new backing is allocated before anything is removed, so on error
    /// the old mappings are still in place.
    pub fn map_replace(&mut self, addr: u64, len: u64, prot: Prot) -> Result<(), MemoryError> {
        let (addr, len) = self.page_range(addr, len)?;
        let end = self.range_end(addr, len)?;
        let data = self.backing(len, self.mapped_within(addr, end))?;
        self.remove_range(addr, end);
        self.insert(addr, data, prot, "mmap".to_string());
        Ok(())
    }

    /// Move the heap break. Returns the break in effect afterwards.
    ///
    /// Requests of 0, below the heap base, colliding with another mapping, or
    /// over the host memory limit leave the break unchanged. Shrinking unmaps
    /// every page above the new break, whatever `mprotect` or `munmap` did to
    /// the heap in between.
    pub fn brk(&mut self, new_brk: u64) -> u64 {
        let Some(heap) = self.heap else {
            return 0;
        };
        if new_brk == 0 || new_brk < heap.base {
            return heap.brk;
        }
        let old_end = self.align_up(heap.brk).unwrap_or(heap.brk);
        let resized = match self.align_up(new_brk) {
            Some(new_end) if new_end > old_end => self.grow_heap(heap.base, old_end, new_end),
            Some(new_end) => {
                self.remove_range(new_end, old_end);
                Ok(())
            }
            None => Err(MemoryError::AddressOverflow {
                addr: heap.base,
                len: new_brk - heap.base,
            }),
        };
        if let Err(err) = resized {
            debug!(requested = new_brk, current = heap.brk, %err, "brk request refused");
            return heap.brk;
        }

        self.heap = Some(Heap {
            base: heap.base,
            brk: new_brk,
        });
        new_brk
    }

    /// Remove `[addr, addr + len)`, splitting mappings that straddle the edges.
    pub fn unmap(&mut self, addr: u64, len: u64) -> Result<(), MemoryError> {
        let (addr, len) = self.page_range(addr, len)?;
        let end = self.range_end(addr, len)?;
        self.remove_range(addr, end);
        debug!(addr, len, "unmapped guest range");
        Ok(())
    }

    /// Change protection of a fully mapped range.
    pub fn protect(&mut self, addr: u64, len: u64, prot: Prot) -> Result<(), MemoryError> {
        if addr % self.page_size != 0 {
            return Err(MemoryError::Misaligned { addr });
        }
        if len == 0 {
            return Ok(());
        }
        let len = self
            .align_up(len)
            .ok_or(MemoryError::AddressOverflow { addr, len })?;
        let end = self.range_end(addr, len)?;
        self.chunks(addr, len, Access::Load)?;

        self.split_at(addr);
        self.split_at(end);
        for mapping in self.mappings.range_mut(addr..end).map(|(_, m)| m) {
            mapping.prot = prot;
        }
        debug!(addr, len, %prot, "changed guest protection");
        Ok(())
    }

    fn copy_in(&mut self, addr: u64, data: &[u8], access: Access) -> Result<(), MemoryError> {
        // Validate the whole range first so a failing write leaves memory untouched.
        let chunks = self.chunks(addr, data.len() as u64, access)?;
        let mut src = 0;
        for (start, offset, count) in chunks {
            let mapping = self
                .mappings
                .get_mut(&start)
                .ok_or(MemoryError::OutOfBounds {
                    addr,
                    len: data.len() as u64,
                })?;
            mapping.data[offset..offset + count].copy_from_slice(&data[src..src + count]);
            src += count;
        }
        Ok(())
    }

    /// Split `[addr, addr + len)` into per-mapping pieces of (mapping start, offset, count).
    fn chunks(
        &self,
        addr: u64,
        len: u64,
        access: Access,
    ) -> Result<Vec<(u64, usize, usize)>, MemoryError> {
        let mut chunks = Vec::new();
        if len == 0 {
            return Ok(chunks);
        }
        let end = addr
            .checked_add(len)
            .ok_or(MemoryError::AddressOverflow { addr, len })?;

        let mut cur = addr;
        while cur < end {
            let mapping = self
                .find_mapping(cur)
                .ok_or(MemoryError::OutOfBounds { addr, len })?;
            match access {
                Access::Read if !mapping.prot.readable() => {
                    return Err(MemoryError::OutOfBounds { addr, len });
                }
                Access::Write if !mapping.prot.writable() => {
                    return Err(MemoryError::ReadOnly { addr: cur });
                }
                _ => {}
            }
            let count = mapping.end().min(end) - cur;
            chunks.push((mapping.start, (cur - mapping.start) as usize, count as usize));
            cur += count;
        }
        Ok(chunks)
    }

    /// Number of bytes accessible from `addr` without a gap, up to `max`.
    fn contiguous(&self, addr: u64, max: u64, access: Access) -> u64 {
        let mut cur = addr;
        let mut total = 0;
        while total < max {
            let Some(mapping) = self.find_mapping(cur) else {
                break;
            };
            let allowed = match access {
                Access::Read => mapping.prot.readable(),
                Access::Write => mapping.prot.writable(),
                Access::Load => true,
            };
            if !allowed {
                break;
            }
            let count = (mapping.end() - cur).min(max - total);
            total += count;
            cur += count;
        }
        total
    }

    /// Map `[old_end, new_end)` as heap, extending the heap piece that ends at
    /// `old_end` when it is still plain read-write.
    fn grow_heap(&mut self, base: u64, old_end: u64, new_end: u64) -> Result<(), MemoryError> {
        let len = new_end - old_end;
        self.range_end(old_end, len)?;
        if self.overlaps(old_end, new_end, None) {
            return Err(MemoryError::Overlap { addr: old_end, len });
        }
        self.check_room(len)?;

        let tail = self
            .mappings
            .range_mut(base..old_end)
            .next_back()
            .map(|(_, m)| m)
            .filter(|m| m.end() == old_end && m.prot == Prot::RW && m.name == HEAP_NAME);
        match tail {
            Some(mapping) => zero_extend(&mut mapping.data, len),
            None => {
                let mut data = Vec::new();
                zero_extend(&mut data, len)?;
                self.insert(old_end, data, Prot::RW, HEAP_NAME.to_string());
                Ok(())
            }
        }
    }

    /// Zero-filled host storage for `len` new bytes, once `released` bytes of
    /// existing mappings are gone.
    fn backing(&self, len: u64, released: u64) -> Result<Vec<u8>, MemoryError> {
        self.check_room_after_release(len, released)?;
        let mut data = Vec::new();
        zero_extend(&mut data, len)?;
        Ok(data)
    }

    fn check_room_after_release(&self, len: u64, released: u64) -> Result<(), MemoryError> {
        let in_use = self.mapped_bytes().saturating_sub(released);
        match in_use.checked_add(len) {
            Some(total) if total <= self.memory_limit => Ok(()),
            _ => Err(MemoryError::OverLimit { len }),
        }
    }

    /// Bytes of existing mappings inside `[start, end)`.
    fn mapped_within(&self, start: u64, end: u64) -> u64 {
        self.mappings
            .range(..end)
            .rev()
            .map(|(_, m)| m)
            .take_while(|m| m.end() > start)
            .map(|m| m.end().min(end) - m.start.max(start))
            .sum()
    }

    fn insert(&mut self, start: u64, data: Vec<u8>, prot: Prot, name: String) {
        debug!(start, len = data.len(), %prot, name = name.as_str(), "mapped guest range");
        self.mappings.insert(
            start,
            Mapping {
                start,
                prot,
                name,
                data,
            },
        );
    }

    fn remove_range(&mut self, start: u64, end: u64) {
        self.split_at(start);
        self.split_at(end);
        let doomed: Vec<u64> = self.mappings.range(start..end).map(|(&k, _)| k).collect();
        for key in doomed {
            self.mappings.remove(&key);
        }
    }

    /// Ensure no mapping straddles `at`.
    fn split_at(&mut self, at: u64) {
        let Some(mapping) = self.mappings.range_mut(..at).next_back().map(|(_, m)| m) else {
            return;
        };
        if mapping.end() <= at {
            return;
        }
        let data = mapping.data.split_off((at - mapping.start) as usize);
        let tail = Mapping {
            start: at,
            prot: mapping.prot,
            name: mapping.name.clone(),
            data,
        };
        self.mappings.insert(at, tail);
    }

    fn overlaps(&self, start: u64, end: u64, ignore: Option<u64>) -> bool {
        // Mappings are disjoint, so the nearest one below `end` decides.
        self.mappings
            .range(..end)
            .rev()
            .find(|(k, _)| Some(**k) != ignore)
            .is_some_and(|(_, m)| m.end() > start)
    }

    fn find_free_range(&self, len: u64) -> Option<u64> {
        let mut candidate = self.mmap_base;
        for mapping in self.mappings.values() {
            if mapping.end() <= candidate {
                continue;
            }
            if candidate.checked_add(len)? <= mapping.start {
                break;
            }
            candidate = self.align_up(mapping.end())?;
        }
        (candidate.checked_add(len)? <= self.mmap_limit).then_some(candidate)
    }

    fn page_range(&self, addr: u64, len: u64) -> Result<(u64, u64), MemoryError> {
        if addr % self.page_size != 0 {
            return Err(MemoryError::Misaligned { addr });
        }
        if len == 0 {
            return Err(MemoryError::ZeroLength);
        }
        let len = self
            .align_up(len)
            .ok_or(MemoryError::AddressOverflow { addr, len })?;
        Ok((addr, len))
    }

    fn range_end(&self, addr: u64, len: u64) -> Result<u64, MemoryError> {
        addr.checked_add(len)
            .filter(|&end| end <= self.bits.address_limit())
            .ok_or(MemoryError::AddressOverflow { addr, len })
    }

    fn align_up(&self, value: u64) -> Option<u64> {
        let mask = self.page_size - 1;
        value.checked_add(mask).map(|v| v & !mask)
    }

    fn align_down(&self, value: u64) -> u64 {
        value & !(self.page_size - 1)
    }
}

/// Grow `data` by `len` zero bytes, reporting host allocation failure instead
/// of aborting.
fn zero_extend(data: &mut Vec<u8>, len: u64) -> Result<(), MemoryError> {
    let extra = usize::try_from(len).map_err(|_| MemoryError::OverLimit { len })?;
    data.try_reserve_exact(extra)
        .map_err(|_| MemoryError::OverLimit { len })?;
    data.resize(data.len() + extra, 0);
    Ok(())
}

pub(crate) fn uint_to_bytes(value: u64, width: usize, endian: Endian) -> Vec<u8> {
    match endian {
        Endian::Little => value.to_le_bytes()[..width].to_vec(),
        Endian::Big => value.to_be_bytes()[8 - width..].to_vec(),
    }
}

pub(crate) fn uint_from_bytes(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Little => bytes.iter().rev().fold(0, fold),
        Endian::Big => bytes.iter().fold(0, fold),
    }
}

/// Forward-only cursor reading guest memory in guest byte order.
pub struct GuestReader<'a> {
    space: &'a AddressSpace,
    pos: u64,
}

impl GuestReader<'_> {
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, MemoryError> {
        let bytes = self.space.read(self.pos, len as u64)?;
        self.pos += len as u64;
        Ok(bytes)
    }

    pub fn read_uint(&mut self, width: usize) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(width)?;
        Ok(uint_from_bytes(&bytes, self.space.endian))
    }

    pub fn read_u8(&mut self) -> Result<u8, MemoryError> {
        Ok(self.read_uint(1)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, MemoryError> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, MemoryError> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, MemoryError> {
        self.read_uint(8)
    }

    /// Read one guest native word (pointer width).
    pub fn read_word(&mut self) -> Result<u64, MemoryError> {
        self.read_uint(self.space.bits.word_bytes())
    }
}

impl io::Read for GuestReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = self
            .space
            .contiguous(self.pos, buf.len() as u64, Access::Read) as usize;
        if count == 0 {
            let err = MemoryError::OutOfBounds {
                addr: self.pos,
                len: buf.len() as u64,
            };
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, err));
        }
        let bytes = self.read_bytes(count).map_err(io::Error::other)?;
        buf[..count].copy_from_slice(&bytes);
        Ok(count)
    }
}

/// Forward-only cursor writing guest memory in guest byte order.
pub struct GuestWriter<'a> {
    space: &'a mut AddressSpace,
    pos: u64,
}

impl GuestWriter<'_> {
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn bits(&self) -> Bits {
        self.space.bits
    }

    pub fn endian(&self) -> Endian {
        self.space.endian
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), MemoryError> {
        self.space.write(self.pos, data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn write_uint(&mut self, value: u64, width: usize) -> Result<(), MemoryError> {
        let bytes = uint_to_bytes(value, width, self.space.endian);
        self.write_bytes(&bytes)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), MemoryError> {
        self.write_uint(value.into(), 1)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), MemoryError> {
        self.write_uint(value.into(), 2)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), MemoryError> {
        self.write_uint(value.into(), 4)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), MemoryError> {
        self.write_uint(value, 8)
    }

    pub fn write_word(&mut self, value: u64) -> Result<(), MemoryError> {
        self.write_uint(value, self.space.bits.word_bytes())
    }
}

impl io::Write for GuestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let count = self
            .space
            .contiguous(self.pos, buf.len() as u64, Access::Write) as usize;
        if count == 0 {
            let err = MemoryError::OutOfBounds {
                addr: self.pos,
                len: buf.len() as u64,
            };
            return Err(io::Error::new(io::ErrorKind::WriteZero, err));
        }
        self.write_bytes(&buf[..count]).map_err(io::Error::other)?;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
