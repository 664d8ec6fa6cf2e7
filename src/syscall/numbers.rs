use std::{collections::HashMap, fmt, sync::LazyLock};

use serde::Deserialize;

/// Guest architectures with a known syscall numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    /// asm-generic numbering.
    Aarch64,
    /// asm-generic numbering, identical to aarch64 for this subset.
    Riscv64,
    M68k,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Riscv64 => "riscv64",
            Arch::M68k => "m68k",
        };
        f.write_str(name)
    }
}

/// Name of the syscall `number` on `arch`, when it is one we know.
pub fn syscall_name(arch: Arch, number: u32) -> Option<&'static str> {
    tables(arch).get(&number).copied()
}

/// Reverse lookup, used when a guest stub needs to issue a call by name.
pub fn syscall_number(arch: Arch, name: &str) -> Option<u32> {
    raw_table(arch)
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(number, _)| *number)
}

// Numbers from each architecture's unistd tables. Calls an architecture only
// offers under another name (openat, faccessat, mmap2) are left out.
const X86_64: &[(u32, &str)] = &[
    (0, "read"),
    (1, "write"),
    (2, "open"),
    (3, "close"),
    (5, "fstat"),
    (8, "lseek"),
    (9, "mmap"),
    (10, "mprotect"),
    (11, "munmap"),
    (12, "brk"),
    (20, "writev"),
    (21, "access"),
    (60, "exit"),
    (79, "getcwd"),
];

const ASM_GENERIC: &[(u32, &str)] = &[
    (17, "getcwd"),
    (57, "close"),
    (62, "lseek"),
    (63, "read"),
    (64, "write"),
    (66, "writev"),
    (80, "fstat"),
    (93, "exit"),
    (214, "brk"),
    (215, "munmap"),
    (222, "mmap"),
    (226, "mprotect"),
];

const M68K: &[(u32, &str)] = &[
    (1, "exit"),
    (3, "read"),
    (4, "write"),
    (5, "open"),
    (6, "close"),
    (19, "lseek"),
    (33, "access"),
    (45, "brk"),
    (91, "munmap"),
    (108, "fstat"),
    (125, "mprotect"),
    (146, "writev"),
    (183, "getcwd"),
];

fn raw_table(arch: Arch) -> &'static [(u32, &'static str)] {
    match arch {
        Arch::X86_64 => X86_64,
        Arch::Aarch64 | Arch::Riscv64 => ASM_GENERIC,
        Arch::M68k => M68K,
    }
}

fn tables(arch: Arch) -> &'static HashMap<u32, &'static str> {
    match arch {
        Arch::X86_64 => &X86_64_NAMES,
        Arch::Aarch64 | Arch::Riscv64 => &ASM_GENERIC_NAMES,
        Arch::M68k => &M68K_NAMES,
    }
}

static X86_64_NAMES: LazyLock<HashMap<u32, &'static str>> =
    LazyLock::new(|| X86_64.iter().copied().collect());
static ASM_GENERIC_NAMES: LazyLock<HashMap<u32, &'static str>> =
    LazyLock::new(|| ASM_GENERIC.iter().copied().collect());
static M68K_NAMES: LazyLock<HashMap<u32, &'static str>> =
    LazyLock::new(|| M68K.iter().copied().collect());
