use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// fstat(fd, statbuf)
    pub(crate) fn sys_fstat(&mut self, args: &SyscallArgs) -> SysResult {
        let stat = self.host().fstat(args.fd(0))?;
        let codec = self.codec();
        codec.write_record(self.space_mut(), args.ptr(1), &stat)?;
        Ok(0)
    }
}
