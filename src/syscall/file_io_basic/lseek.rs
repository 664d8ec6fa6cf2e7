use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// lseek(fd, offset, whence)
    pub(crate) fn sys_lseek(&mut self, args: &SyscallArgs) -> SysResult {
        let pos = self.host().lseek(args.fd(0), args.off(1), args.int(2) as i32)?;
        Ok(pos as u64)
    }
}
