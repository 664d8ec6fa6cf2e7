use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// exit(status). The emulator stops the guest once the status is recorded.
    pub(crate) fn sys_exit(&mut self, args: &SyscallArgs) -> SysResult {
        self.record_exit(args.int(0) as i32);
        Ok(0)
    }
}
