use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// munmap(addr, length)
    pub(crate) fn sys_munmap(&mut self, args: &SyscallArgs) -> SysResult {
        self.space_mut().unmap(args.ptr(0), args.len(1))?;
        Ok(0)
    }
}
