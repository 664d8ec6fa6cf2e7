use crate::{Session, args::SyscallArgs, errno::Errno, syscall::SysResult};

impl Session {
    /// getcwd(buf, size)
    pub(crate) fn sys_getcwd(&mut self, args: &SyscallArgs) -> SysResult {
        let buf = args.ptr(0);
        let size = args.len(1);

        let mut cwd = self.host().getcwd()?;
        cwd.push(0);
        if cwd.len() as u64 > size {
            return Err(Errno::ERANGE);
        }
        self.space_mut().write(buf, &cwd)?;
        // The syscall reports the length including the terminator.
        Ok(cwd.len() as u64)
    }
}
