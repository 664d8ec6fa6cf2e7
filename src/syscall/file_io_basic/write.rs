use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// write(fd, buf, count)
    pub(crate) fn sys_write(&mut self, args: &SyscallArgs) -> SysResult {
        let fd = args.fd(0);
        let data = self.space().read(args.ptr(1), args.len(2))?;
        let n = self.host().write(fd, &data)?;
        Ok(n as u64)
    }
}
