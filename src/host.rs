use std::{ffi::CStr, mem::MaybeUninit, os::unix::ffi::OsStringExt};

use crate::{codec::HostStat, errno::Errno};

/// Host operations performed on behalf of the guest.
///
/// Handlers only ever hand owned or borrowed host buffers to these methods;
/// guest memory is copied in or out around each call.
pub trait Host {
    fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno>;

    fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, Errno>;

    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> Result<i32, Errno>;

    fn close(&mut self, fd: i32) -> Result<(), Errno>;

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> Result<i64, Errno>;

    fn fstat(&mut self, fd: i32) -> Result<HostStat, Errno>;

    /// Current working directory, without a trailing NUL.
    fn getcwd(&mut self) -> Result<Vec<u8>, Errno>;

    fn access(&mut self, path: &CStr, mode: i32) -> Result<(), Errno>;

    /// Read at `offset` without moving the file position.
    fn pread(&mut self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Errno>;
}

/// The real host, calling straight into libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHost;

fn check(ret: libc::c_long) -> Result<libc::c_long, Errno> {
    if ret < 0 { Err(Errno::last()) } else { Ok(ret) }
}

impl Host for LibcHost {
    fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        check(ret as libc::c_long).map(|n| n as usize)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
        let ret = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        check(ret as libc::c_long).map(|n| n as usize)
    }

    fn open(&mut self, path: &CStr, flags: i32, mode: u32) -> Result<i32, Errno> {
        let ret = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
        check(ret as libc::c_long).map(|fd| fd as i32)
    }

    fn close(&mut self, fd: i32) -> Result<(), Errno> {
        check(unsafe { libc::close(fd) } as libc::c_long).map(|_| ())
    }

    fn lseek(&mut self, fd: i32, offset: i64, whence: i32) -> Result<i64, Errno> {
        let ret = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
        if ret < 0 {
            return Err(Errno::last());
        }
        Ok(ret as i64)
    }

    fn fstat(&mut self, fd: i32) -> Result<HostStat, Errno> {
        let mut st = MaybeUninit::<libc::stat>::uninit();
        check(unsafe { libc::fstat(fd, st.as_mut_ptr()) } as libc::c_long)?;
        let st = unsafe { st.assume_init() };
        Ok(HostStat::from(&st))
    }

    fn getcwd(&mut self) -> Result<Vec<u8>, Errno> {
        let cwd = std::env::current_dir()?;
        Ok(cwd.into_os_string().into_vec())
    }

    fn access(&mut self, path: &CStr, mode: i32) -> Result<(), Errno> {
        check(unsafe { libc::access(path.as_ptr(), mode) } as libc::c_long).map(|_| ())
    }

    fn pread(&mut self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Errno> {
        let ret = unsafe {
            libc::pread(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                offset as libc::off_t,
            )
        };
        check(ret as libc::c_long).map(|n| n as usize)
    }
}
