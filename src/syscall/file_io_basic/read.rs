use crate::{Session, args::SyscallArgs, syscall::SysResult};

impl Session {
    /// read(fd, buf, count)
    pub(crate) fn sys_read(&mut self, args: &SyscallArgs) -> SysResult {
        let fd = args.fd(0);
        let buf = args.ptr(1);
        let count = args.len(2);

        // Refuse before the host consumes any input.
        self.space().check_writable(buf, count)?;
        let mut host_buf = vec![0u8; count as usize];
        let n = self.host().read(fd, &mut host_buf)?;
        self.space_mut().write(buf, &host_buf[..n])?;
        Ok(n as u64)
    }
}
