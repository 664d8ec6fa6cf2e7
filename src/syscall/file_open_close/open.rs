use std::ffi::CString;

use crate::{
    Session,
    args::SyscallArgs,
    errno::Errno,
    syscall::{Arch, SysResult},
};

// O_DIRECT, O_LARGEFILE, O_DIRECTORY and O_NOFOLLOW, in that order. These are
// the only open flags whose bits move between Linux ABIs.
const GENERIC_FLAGS: [i32; 4] = [0o040000, 0o100000, 0o200000, 0o400000];
// m68k and arm64 (asm/fcntl.h).
const M68K_FLAGS: [i32; 4] = [0o200000, 0o400000, 0o040000, 0o100000];
const HOST_FLAGS: [i32; 4] = [
    libc::O_DIRECT,
    libc::O_LARGEFILE,
    libc::O_DIRECTORY,
    libc::O_NOFOLLOW,
];
const MOVABLE_MASK: i32 = 0o740000;

/// Translate guest open flags to the host's values. Without a known guest
/// ABI the flags are passed through.
pub(crate) fn host_open_flags(arch: Option<Arch>, flags: i32) -> i32 {
    let guest = match arch {
        None => return flags,
        Some(Arch::M68k | Arch::Aarch64) => &M68K_FLAGS,
        Some(Arch::X86_64 | Arch::Riscv64) => &GENERIC_FLAGS,
    };
    guest
        .iter()
        .zip(HOST_FLAGS)
        .filter(|&(&bit, _)| flags & bit != 0)
        .fold(flags & !MOVABLE_MASK, |acc, (_, host)| acc | host)
}

impl Session {
    /// open(path, flags, mode)
    pub(crate) fn sys_open(&mut self, args: &SyscallArgs) -> SysResult {
        let path = args.c_string(0, self.space())?;
        let path = CString::new(path).map_err(|_| Errno::EINVAL)?;
        let flags = host_open_flags(self.arch(), args.int(1) as i32);
        let mode = args.int(2) as u32;
        let fd = self.host().open(&path, flags, mode)?;
        Ok(fd as u64)
    }
}
