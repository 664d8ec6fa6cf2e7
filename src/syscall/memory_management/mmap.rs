use tracing::debug;

use crate::{
    Session,
    args::SyscallArgs,
    errno::Errno,
    memory::Prot,
    syscall::SysResult,
};

const MAP_FIXED: i64 = 0x10;
const MAP_ANONYMOUS: i64 = 0x20;

/// Largest single host `pread` while filling a file mapping.
const PREFILL_CHUNK: usize = 64 * 1024;

impl Session {
    /// mmap(addr, length, prot, flags, fd, offset)
    pub(crate) fn sys_mmap(&mut self, args: &SyscallArgs) -> SysResult {
        let hint = args.ptr(0);
        let len = args.len(1);
        let prot = Prot::from_posix(args.int(2) as u64);
        let flags = args.int(3);
        let fd = args.fd(4);
        let offset = args.off(5);

        if len == 0 {
            return Err(Errno::EINVAL);
        }

        // The file is read before the address space changes, so a failing
        // MAP_FIXED leaves the old mappings intact.
        let anonymous = flags & MAP_ANONYMOUS != 0 || fd < 0;
        let contents = if anonymous {
            Vec::new()
        } else {
            self.read_file_contents(fd, offset, len)?
        };

        let addr = if flags & MAP_FIXED != 0 {
            self.space_mut().map_replace(hint, len, prot)?;
            hint
        } else {
            self.space_mut().mmap_allocate(hint, len, prot)?
        };
        self.space_mut().load(addr, &contents)?;

        debug!(addr, len, %prot, anonymous, "mmap");
        Ok(addr)
    }

    /// Up to `len` bytes of the file at `offset`. Short at end of file; the
    /// rest of the mapping stays zero.
    fn read_file_contents(&mut self, fd: i32, offset: i64, len: u64) -> Result<Vec<u8>, Errno> {
        self.space().check_room(len)?;
        let mut contents = Vec::new();
        let mut chunk = vec![0u8; PREFILL_CHUNK];
        while (contents.len() as u64) < len {
            let want = (len - contents.len() as u64).min(PREFILL_CHUNK as u64) as usize;
            let n = self
                .host()
                .pread(fd, &mut chunk[..want], offset + contents.len() as i64)?;
            if n == 0 {
                break;
            }
            contents.extend_from_slice(&chunk[..n]);
        }
        Ok(contents)
    }
}
