use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    pub(crate) fn sys_close(&mut self, args: &SyscallArgs) -> SysResult {
        self.host().close(args.fd(0))?;
        Ok(0)
    }
}
