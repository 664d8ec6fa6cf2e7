use crate::{
    Session,
    args::SyscallArgs,
    codec::Iovec,
    errno::Errno,
    syscall::SysResult,
};

const IOV_MAX: i64 = 1024;

impl Session {
    /// writev(fd, iov, iovcnt)
    ///
    /// The iovecs are gathered into one buffer and written with a single host
    /// call, so the guest sees the same atomicity as a plain write.
    pub(crate) fn sys_writev(&mut self, args: &SyscallArgs) -> SysResult {
        let fd = args.fd(0);
        let iov_addr = args.ptr(1);
        let iovcnt = args.int(2);
        if !(0..=IOV_MAX).contains(&iovcnt) {
            return Err(Errno::EINVAL);
        }
        if iovcnt == 0 {
            return Ok(0);
        }

        let codec = self.codec();
        let space = self.space();
        let mut reader = space.reader(iov_addr);
        let mut gathered = Vec::new();
        for _ in 0..iovcnt {
            let iov: Iovec = codec.unpack(&mut reader)?;
            gathered.extend(space.read(iov.base, iov.len)?);
        }

        let n = self.host().write(fd, &gathered)?;
        Ok(n as u64)
    }
}
