use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::syscall::Arch;

/// Native word width of the guest ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub enum Bits {
    W32,
    W64,
}

impl Bits {
    pub fn word_bytes(self) -> usize {
        match self {
            Bits::W32 => 4,
            Bits::W64 => 8,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Bits::W32 => 32,
            Bits::W64 => 64,
        }
    }

    /// Truncate a raw register word to the guest width.
    pub fn truncate(self, word: u64) -> u64 {
        match self {
            Bits::W32 => word & 0xffff_ffff,
            Bits::W64 => word,
        }
    }

    /// Sign-extend a raw register word from the guest width.
    pub fn sign_extend(self, word: u64) -> i64 {
        match self {
            Bits::W32 => word as u32 as i32 as i64,
            Bits::W64 => word as i64,
        }
    }

    /// One past the highest guest-addressable byte.
    pub fn address_limit(self) -> u64 {
        match self {
            Bits::W32 => 1 << 32,
            Bits::W64 => u64::MAX,
        }
    }
}

impl TryFrom<u32> for Bits {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            32 => Ok(Bits::W32),
            64 => Ok(Bits::W64),
            other => Err(format!("unsupported guest word size {other} (expected 32 or 64)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    Little,
    Big,
}

/// How a failed call is encoded in the guest return register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorEncoding {
    /// `!errno`, flagged negative by the guest's signed return check.
    #[default]
    Complement,
    /// `-errno`, the Linux kernel convention.
    Negate,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Guest ABI and address-space parameters for one emulation session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuestConfig {
    pub bits: Bits,
    pub endian: Endian,
    pub page_size: u64,
    /// First address the mmap allocator considers.
    pub mmap_base: u64,
    pub mmap_limit: Option<u64>,
    /// Start of the brk heap. Without it `brk` always reports 0.
    pub heap_base: Option<u64>,
    /// Host bytes all mappings together may occupy.
    pub memory_limit: u64,
    /// Guest ABI for flag values that differ between architectures. Unset
    /// means the guest uses the host's values.
    pub arch: Option<Arch>,
    pub error_encoding: ErrorEncoding,
    pub trace: bool,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            bits: Bits::W64,
            endian: Endian::Little,
            page_size: 4096,
            mmap_base: 0x4000_0000,
            mmap_limit: None,
            heap_base: None,
            memory_limit: 1 << 30,
            arch: None,
            error_encoding: ErrorEncoding::Complement,
            trace: false,
        }
    }
}

impl GuestConfig {
    pub fn new(bits: Bits, endian: Endian) -> Self {
        Self {
            bits,
            endian,
            ..Self::default()
        }
    }

    pub fn with_heap_base(mut self, base: u64) -> Self {
        self.heap_base = Some(base);
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// End of the mmap allocation window (exclusive).
    pub fn mmap_limit(&self) -> u64 {
        self.mmap_limit.unwrap_or(match self.bits {
            // Stay below the kernel half of a 32-bit address space.
            Bits::W32 => 0xC000_0000,
            Bits::W64 => 0x7fff_ffff_f000,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !self.page_size.is_power_of_two() {
            return invalid(format!("page_size {} is not a power of two", self.page_size));
        }
        let mask = self.page_size - 1;
        if self.mmap_base & mask != 0 {
            return invalid(format!("mmap_base {:#x} is not page aligned", self.mmap_base));
        }
        let limit = self.mmap_limit();
        if self.mmap_base >= limit {
            return invalid(format!(
                "mmap_base {:#x} must be below mmap_limit {limit:#x}",
                self.mmap_base
            ));
        }
        if limit > self.bits.address_limit() {
            return invalid(format!(
                "mmap_limit {limit:#x} exceeds the {}-bit address space",
                self.bits.as_u32()
            ));
        }
        if let Some(heap) = self.heap_base {
            if heap & mask != 0 {
                return invalid(format!("heap_base {heap:#x} is not page aligned"));
            }
            if heap >= self.bits.address_limit() {
                return invalid(format!(
                    "heap_base {heap:#x} exceeds the {}-bit address space",
                    self.bits.as_u32()
                ));
            }
        }
        if self.memory_limit < self.page_size {
            return invalid(format!(
                "memory_limit {:#x} is smaller than one page",
                self.memory_limit
            ));
        }
        Ok(())
    }
}
