use std::ffi::CString;

use crate::{Session, args::SyscallArgs, errno::Errno, syscall::SysResult};

impl Session {
    /// access(path, mode)
    pub(crate) fn sys_access(&mut self, args: &SyscallArgs) -> SysResult {
        let path = args.c_string(0, self.space())?;
        let path = CString::new(path).map_err(|_| Errno::EINVAL)?;
        self.host().access(&path, args.int(1) as i32)?;
        Ok(0)
    }
}
