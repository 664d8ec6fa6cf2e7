use crate::{
    Session,
    args::SyscallArgs,
    errno::Errno,
    memory::{MemoryError, Prot},
    syscall::SysResult,
};

impl Session {
    /// mprotect(addr, len, prot)
    pub(crate) fn sys_mprotect(&mut self, args: &SyscallArgs) -> SysResult {
        let prot = Prot::from_posix(args.int(2) as u64);
        self.space_mut()
            .protect(args.ptr(0), args.len(1), prot)
            .map_err(|err| match err {
                // Linux reports unmapped pages in the range as ENOMEM.
                MemoryError::OutOfBounds { .. } => Errno::ENOMEM,
                other => other.into(),
            })?;
        Ok(0)
    }
}
