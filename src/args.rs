use thiserror::Error;

use crate::{
    config::Bits,
    memory::{AddressSpace, MemoryError},
};

/// How a syscall argument word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Signed integer, sign-extended from the guest word.
    Int,
    /// File descriptor, the low 32 bits as `i32`.
    Fd,
    Ptr,
    Len,
    /// Signed file offset.
    Off,
    /// Pointer to bytes the host reads; its length is the next `Len`.
    InBuf,
    /// Pointer to bytes the host fills; its length is the next `Len`.
    OutBuf,
    /// Pointer to a NUL-terminated string.
    CStr,
    /// This word and every remaining word point at NUL-terminated strings.
    VarStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Fd(i32),
    Ptr(u64),
    Len(u64),
    Off(i64),
    InBuf(u64),
    OutBuf(u64),
    Str(u64),
    Strings(Vec<u64>),
}

impl Arg {
    /// The decoded value as a raw 64-bit word.
    pub fn raw(&self) -> u64 {
        match self {
            Arg::Int(v) | Arg::Off(v) => *v as u64,
            Arg::Fd(v) => *v as i64 as u64,
            Arg::Ptr(v) | Arg::Len(v) | Arg::InBuf(v) | Arg::OutBuf(v) | Arg::Str(v) => *v,
            Arg::Strings(ptrs) => ptrs.first().copied().unwrap_or(0),
        }
    }
}

/// Decoded arguments for one call.
///
/// The getters reinterpret whatever sits in a slot, so a handler can read an
/// `Int` slot as a length; a missing slot reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyscallArgs {
    values: Vec<Arg>,
}

impl SyscallArgs {
    pub fn new(values: Vec<Arg>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.values.iter()
    }

    pub fn int(&self, index: usize) -> i64 {
        match self.values.get(index) {
            Some(Arg::Int(v) | Arg::Off(v)) => *v,
            Some(Arg::Fd(v)) => *v as i64,
            Some(other) => other.raw() as i64,
            None => 0,
        }
    }

    pub fn fd(&self, index: usize) -> i32 {
        self.int(index) as i32
    }

    pub fn ptr(&self, index: usize) -> u64 {
        self.values.get(index).map_or(0, Arg::raw)
    }

    pub fn len(&self, index: usize) -> u64 {
        self.ptr(index)
    }

    pub fn off(&self, index: usize) -> i64 {
        self.int(index)
    }

    /// Read the C string behind a pointer slot.
    pub fn c_string(&self, index: usize, space: &AddressSpace) -> Result<Vec<u8>, MemoryError> {
        space.read_c_string(self.ptr(index), None)
    }

    /// Read every `VarStr` string and join them with a single space.
    pub fn joined_strings(&self, space: &AddressSpace) -> Result<String, MemoryError> {
        let Some(Arg::Strings(ptrs)) = self.values.iter().find(|a| matches!(a, Arg::Strings(_)))
        else {
            return Ok(String::new());
        };
        let parts = ptrs
            .iter()
            .map(|&ptr| space.read_string(ptr, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(" "))
    }
}

/// Supplies raw argument words from the guest's registers or stack.
pub trait WordSource {
    /// The first `n` argument words. Returning fewer signals a short call.
    fn words(&mut self, n: usize) -> anyhow::Result<Vec<u64>>;

    /// Words beyond the fixed arguments, consumed by `VarStr`.
    fn rest(&mut self) -> anyhow::Result<Vec<u64>> {
        Ok(Vec::new())
    }
}

/// A `WordSource` over an in-memory slice.
#[derive(Debug, Clone)]
pub struct WordSlice<'a> {
    words: &'a [u64],
    taken: usize,
}

impl<'a> WordSlice<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self { words, taken: 0 }
    }
}

impl WordSource for WordSlice<'_> {
    fn words(&mut self, n: usize) -> anyhow::Result<Vec<u64>> {
        self.taken = n.min(self.words.len());
        Ok(self.words[..self.taken].to_vec())
    }

    fn rest(&mut self) -> anyhow::Result<Vec<u64>> {
        Ok(self.words[self.taken..].to_vec())
    }
}

impl<F> WordSource for F
where
    F: FnMut(usize) -> anyhow::Result<Vec<u64>>,
{
    fn words(&mut self, n: usize) -> anyhow::Result<Vec<u64>> {
        self(n)
    }
}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("syscall expects {expected} arguments, got {got}")]
    ArgumentCountMismatch { expected: usize, got: usize },
    #[error("failed to fetch syscall arguments: {0}")]
    Source(anyhow::Error),
}

/// Decodes raw words into typed arguments at the guest's word width.
#[derive(Debug, Clone, Copy)]
pub struct Marshaler {
    bits: Bits,
}

impl Marshaler {
    pub fn new(bits: Bits) -> Self {
        Self { bits }
    }

    /// Decode one call's arguments. Guest memory is never touched here.
    pub fn decode(
        &self,
        kinds: &[ArgKind],
        source: &mut dyn WordSource,
    ) -> Result<SyscallArgs, MarshalError> {
        let words = source.words(kinds.len()).map_err(MarshalError::Source)?;
        if words.len() < kinds.len() {
            return Err(MarshalError::ArgumentCountMismatch {
                expected: kinds.len(),
                got: words.len(),
            });
        }

        let bits = self.bits;
        let mut values = Vec::with_capacity(kinds.len());
        for (kind, &word) in kinds.iter().zip(&words) {
            let arg = match kind {
                ArgKind::Int => Arg::Int(bits.sign_extend(word)),
                ArgKind::Fd => Arg::Fd(word as u32 as i32),
                ArgKind::Ptr => Arg::Ptr(bits.truncate(word)),
                ArgKind::Len => Arg::Len(bits.truncate(word)),
                ArgKind::Off => Arg::Off(bits.sign_extend(word)),
                ArgKind::InBuf => Arg::InBuf(bits.truncate(word)),
                ArgKind::OutBuf => Arg::OutBuf(bits.truncate(word)),
                ArgKind::CStr => Arg::Str(bits.truncate(word)),
                ArgKind::VarStr => {
                    let rest = source.rest().map_err(MarshalError::Source)?;
                    let ptrs = std::iter::once(word)
                        .chain(rest)
                        .map(|w| bits.truncate(w))
                        .collect();
                    Arg::Strings(ptrs)
                }
            };
            values.push(arg);
        }
        Ok(SyscallArgs::new(values))
    }
}
