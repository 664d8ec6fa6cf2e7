use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// brk(addr) - grow or shrink the guest heap; never fails
    pub(crate) fn sys_brk(&mut self, args: &SyscallArgs) -> SysResult {
        Ok(self.space_mut().brk(args.ptr(0)))
    }
}
