use std::{
    collections::VecDeque,
    ffi::CStr,
    io::{self, Write},
    os::fd::AsRawFd,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use guestcall::{
    AddressSpace, ArgKind, Bits, ConfigError, DispatchError, Endian, Errno, ErrorEncoding,
    GuestConfig, Host, HostStat, MarshalError, MemoryError, Prot, Session, SysResult,
    SyscallArgs, SyscallDescriptor, SyscallTable, WordSlice, WriterTracer, syscall::Arch,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const PROT_RW: u64 = 0x3;
const MAP_PRIVATE_ANON: u64 = 0x22;
const NO_FD: u64 = u64::MAX;
const FILE_FD: i32 = 7;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Log {
    writes: Vec<(i32, Vec<u8>)>,
    input: VecDeque<u8>,
    opened: Vec<(String, i32)>,
}

/// A host that records what the guest asked for instead of touching the OS.
#[derive(Clone, Default)]
struct RecordingHost {
    log: Arc<Mutex<Log>>,
    file: Arc<Vec<u8>>,
}

impl RecordingHost {
    fn with_input(input: &[u8]) -> Self {
        let host = Self::default();
        host.log.lock().unwrap().input.extend(input);
        host
    }

    fn with_file(contents: &[u8]) -> Self {
        Self {
            file: Arc::new(contents.to_vec()),
            ..Self::default()
        }
    }

    fn writes(&self) -> Vec<(i32, Vec<u8>)> {
        self.log.lock().unwrap().writes.clone()
    }
}

impl Host for RecordingHost {
    fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        if fd != 0 {
            return Err(Errno::EBADF);
        }
        let mut log = self.log.lock().unwrap();
        let n = buf.len().min(log.input.len());
        for (slot, byte) in buf.iter_mut().zip(log.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
        if fd < 0 {
            return Err(Errno::EBADF);
        }
        self.log.lock().unwrap().writes.push((fd, buf.to_vec()));
        Ok(buf.len())
    }

    fn open(&mut self, path: &CStr, flags: i32, _mode: u32) -> Result<i32, Errno> {
        self.log
            .lock()
            .unwrap()
            .opened
            .push((path.to_string_lossy().into_owned(), flags));
        Ok(FILE_FD)
    }

    fn close(&mut self, fd: i32) -> Result<(), Errno> {
        if fd < 0 { Err(Errno::EBADF) } else { Ok(()) }
    }

    fn lseek(&mut self, _fd: i32, offset: i64, _whence: i32) -> Result<i64, Errno> {
        Ok(offset)
    }

    fn fstat(&mut self, _fd: i32) -> Result<HostStat, Errno> {
        Ok(HostStat {
            size: self.file.len() as i64,
            mode: 0o100644,
            ..HostStat::default()
        })
    }

    fn getcwd(&mut self) -> Result<Vec<u8>, Errno> {
        Ok(b"/guest/home".to_vec())
    }

    fn access(&mut self, path: &CStr, _mode: i32) -> Result<(), Errno> {
        if path.to_bytes() == b"/missing" {
            Err(Errno::ENOENT)
        } else {
            Ok(())
        }
    }

    fn pread(&mut self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Errno> {
        if fd != FILE_FD {
            return Err(Errno::EBADF);
        }
        let start = (offset as usize).min(self.file.len());
        let n = buf.len().min(self.file.len() - start);
        buf[..n].copy_from_slice(&self.file[start..start + n]);
        Ok(n)
    }
}

/// A stream the test can still read after handing it to a tracer.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn table() -> SyscallTable {
    SyscallTable::posix().unwrap()
}

fn session(host: RecordingHost) -> Session {
    init_logging();
    let config = GuestConfig::default().with_heap_base(0x10_0000);
    let mut session = Session::with_host(config, host).unwrap();
    session
        .space_mut()
        .map_fixed(0x1000, 0x1000, Prot::RW, "data")
        .unwrap();
    session
}

fn call(table: &SyscallTable, session: &mut Session, name: &str, words: &[u64]) -> u64 {
    table
        .dispatch(session, name, &mut WordSlice::new(words), false)
        .unwrap()
}

fn failed(errno: Errno) -> u64 {
    errno.encode(ErrorEncoding::Complement)
}

#[test]
fn write_reaches_host_once() {
    let host = RecordingHost::default();
    let mut session = session(host.clone());
    session.space_mut().write(0x1000, b"hello").unwrap();

    let ret = call(&table(), &mut session, "write", &[1, 0x1000, 5]);
    assert_eq!(ret, 5);
    assert_eq!(host.writes(), vec![(1, b"hello".to_vec())]);
}

#[test]
fn write_from_unmapped_buffer_faults() {
    let host = RecordingHost::default();
    let mut session = session(host.clone());

    let ret = call(&table(), &mut session, "write", &[1, 0x1ffe, 5]);
    assert_eq!(ret, failed(Errno::EFAULT));
    assert!(host.writes().is_empty());
}

static COUNTED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn counted(_: &mut Session, args: &SyscallArgs) -> SysResult {
    COUNTED_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(args.len(2))
}

#[test]
fn short_argument_list_never_runs_handler() {
    let table = SyscallTable::builder()
        .register(SyscallDescriptor::new(
            "counted",
            &[ArgKind::Fd, ArgKind::InBuf, ArgKind::Len],
            counted,
        ))
        .build()
        .unwrap();
    let mut session = session(RecordingHost::default());

    let err = table
        .dispatch(&mut session, "counted", &mut WordSlice::new(&[1, 0x1000]), false)
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Marshal(MarshalError::ArgumentCountMismatch { expected: 3, got: 2 })
    ));
    assert!(!err.is_configuration());
    assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 0);

    let ret = call(&table, &mut session, "counted", &[1, 0x1000, 9]);
    assert_eq!(ret, 9);
    assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn mmap_maps_exactly_one_page() {
    let mut session = session(RecordingHost::default());
    let addr = call(
        &table(),
        &mut session,
        "mmap",
        &[0, 4096, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
    );
    assert_eq!(addr, 0x4000_0000);

    session.space_mut().write(addr, &[0xaa; 4096]).unwrap();
    assert!(matches!(
        session.space_mut().write(addr, &[0xaa; 4097]),
        Err(MemoryError::OutOfBounds { .. })
    ));

    let second = call(
        &table(),
        &mut session,
        "mmap",
        &[0, 10, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
    );
    assert_eq!(second, 0x4000_1000);

    let zero = call(
        &table(),
        &mut session,
        "mmap",
        &[0, 0, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
    );
    assert_eq!(zero, failed(Errno::EINVAL));
}

#[test]
fn mmap_prefills_from_file() {
    let host = RecordingHost::with_file(b"#!/bin/guest\n");
    let mut session = session(host);
    let table = table();

    let addr = call(
        &table,
        &mut session,
        "mmap",
        &[0, 8192, 0x1, 0x2, FILE_FD as u64, 3],
    );
    assert_eq!(session.space().read(addr, 10).unwrap(), b"bin/guest\n");
    assert_eq!(session.space().read(addr + 10, 4).unwrap(), vec![0; 4]);
    // Read-only mapping: guest writes fault.
    assert!(session.space_mut().write(addr, b"x").is_err());

    let before = session.space().mappings().count();
    let ret = call(&table, &mut session, "mmap", &[0, 4096, 0x1, 0x2, 8, 0]);
    assert_eq!(ret, failed(Errno::EBADF));
    assert_eq!(session.space().mappings().count(), before);
}

#[test]
fn mmap_fixed_replaces_existing_pages() {
    let mut session = session(RecordingHost::default());
    session.space_mut().write(0x1000, b"old").unwrap();

    let ret = call(
        &table(),
        &mut session,
        "mmap",
        &[0x1000, 4096, PROT_RW, 0x32, NO_FD, 0],
    );
    assert_eq!(ret, 0x1000);
    assert_eq!(session.space().read(0x1000, 3).unwrap(), vec![0; 3]);
}

#[test]
fn failed_fixed_file_mapping_keeps_old_contents() {
    let mut session = session(RecordingHost::default());
    session.space_mut().write(0x1000, b"keep").unwrap();
    let before: Vec<String> = session.space().mappings().map(|m| m.to_string()).collect();

    let ret = call(
        &table(),
        &mut session,
        "mmap",
        &[0x1000, 4096, PROT_RW, 0x12, 999, 0],
    );
    assert_eq!(ret, failed(Errno::EBADF));
    assert_eq!(session.space().read(0x1000, 4).unwrap(), b"keep");
    let after: Vec<String> = session.space().mappings().map(|m| m.to_string()).collect();
    assert_eq!(after, before);
}

#[test]
fn fixed_file_mapping_replaces_with_file_contents() {
    let mut session = session(RecordingHost::with_file(b"from file"));
    session.space_mut().write(0x1000, b"old data").unwrap();

    let ret = call(
        &table(),
        &mut session,
        "mmap",
        &[0x1000, 4096, PROT_RW, 0x12, FILE_FD as u64, 0],
    );
    assert_eq!(ret, 0x1000);
    assert_eq!(session.space().read(0x1000, 10).unwrap(), b"from file\0");
}

#[test]
fn oversized_mappings_fail_with_enomem() {
    let mut session = session(RecordingHost::with_file(b"tiny"));
    let table = table();

    assert_eq!(
        call(&table, &mut session, "mmap", &[0, 1 << 44, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0]),
        failed(Errno::ENOMEM)
    );
    assert_eq!(
        call(&table, &mut session, "mmap", &[0, 1 << 44, 0x1, 0x2, FILE_FD as u64, 0]),
        failed(Errno::ENOMEM)
    );
    assert_eq!(
        call(&table, &mut session, "mmap", &[0x1000, 1 << 44, PROT_RW, 0x32, NO_FD, 0]),
        failed(Errno::ENOMEM)
    );
    assert!(session.space().find_mapping(0x1000).is_some());

    assert_eq!(call(&table, &mut session, "brk", &[0x10_0000 + (1 << 44)]), 0x10_0000);
    assert_eq!(session.space().mappings().count(), 1);
}

#[test]
fn munmap_and_mprotect_update_mappings() {
    let mut session = session(RecordingHost::with_input(b"abc"));
    let table = table();

    assert_eq!(call(&table, &mut session, "mprotect", &[0x1000, 4096, 0x1]), 0);
    let ret = call(&table, &mut session, "read", &[0, 0x1000, 3]);
    assert_eq!(ret, failed(Errno::EFAULT));

    assert_eq!(
        call(&table, &mut session, "mprotect", &[0x8000, 4096, 0x1]),
        failed(Errno::ENOMEM)
    );
    assert_eq!(
        call(&table, &mut session, "mprotect", &[0x1001, 4096, 0x1]),
        failed(Errno::EINVAL)
    );

    assert_eq!(call(&table, &mut session, "munmap", &[0x1000, 4096]), 0);
    assert!(session.space().find_mapping(0x1000).is_none());
    // Unmapping a hole is fine.
    assert_eq!(call(&table, &mut session, "munmap", &[0x1000, 4096]), 0);
    assert_eq!(
        call(&table, &mut session, "munmap", &[0x1004, 4096]),
        failed(Errno::EINVAL)
    );
}

#[test]
fn read_into_read_only_memory_consumes_nothing() {
    let host = RecordingHost::with_input(b"abc");
    let mut session = session(host.clone());
    session
        .space_mut()
        .map_fixed(0x3000, 0x1000, Prot::READ, "ro")
        .unwrap();
    let table = table();

    assert_eq!(
        call(&table, &mut session, "read", &[0, 0x3000, 3]),
        failed(Errno::EFAULT)
    );
    assert_eq!(host.log.lock().unwrap().input.len(), 3);

    assert_eq!(call(&table, &mut session, "read", &[0, 0x1000, 16]), 3);
    assert_eq!(session.space().read(0x1000, 3).unwrap(), b"abc");
}

#[test]
fn unknown_syscall_is_a_configuration_error() {
    let mut session = session(RecordingHost::default());
    let table = table();

    let err = table
        .dispatch(&mut session, "frobnicate", &mut WordSlice::new(&[]), false)
        .unwrap_err();
    assert!(matches!(&err, DispatchError::Unimplemented(name) if name == "frobnicate"));
    assert!(err.is_configuration());

    let err = table
        .dispatch_number(&mut session, Arch::X86_64, 4242, &mut WordSlice::new(&[]), false)
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnknownNumber { arch: Arch::X86_64, number: 4242 }
    ));
}

#[test]
fn dispatch_by_number() {
    let host = RecordingHost::default();
    let mut session = session(host.clone());
    session.space_mut().write(0x1000, b"hi").unwrap();
    let table = table();

    let ret = table
        .dispatch_number(&mut session, Arch::M68k, 4, &mut WordSlice::new(&[2, 0x1000, 2]), false)
        .unwrap();
    assert_eq!(ret, 2);
    let ret = table
        .dispatch_number(&mut session, Arch::Aarch64, 64, &mut WordSlice::new(&[1, 0x1000, 1]), false)
        .unwrap();
    assert_eq!(ret, 1);
    assert_eq!(host.writes(), vec![(2, b"hi".to_vec()), (1, b"h".to_vec())]);
}

#[test]
fn failures_use_the_configured_encoding() {
    let table = table();

    let mut complement = session(RecordingHost::default());
    let ret = call(&table, &mut complement, "close", &[u64::MAX]);
    assert_eq!(ret, !(libc::EBADF as u64));
    assert_eq!(call(&table, &mut complement, "close", &[4]), 0);

    let config = GuestConfig {
        error_encoding: ErrorEncoding::Negate,
        ..GuestConfig::default()
    };
    let mut negate = Session::with_host(config, RecordingHost::default()).unwrap();
    let ret = call(&table, &mut negate, "close", &[u64::MAX]);
    assert_eq!(ret as i64, -(libc::EBADF as i64));
}

#[test]
fn brk_grows_and_refuses_collisions() {
    let mut session = session(RecordingHost::default());
    let table = table();

    assert_eq!(call(&table, &mut session, "brk", &[0]), 0x10_0000);
    assert_eq!(call(&table, &mut session, "brk", &[0x10_2010]), 0x10_2010);
    session.space_mut().write(0x10_2000, b"heap").unwrap();

    session
        .space_mut()
        .map_fixed(0x20_0000, 0x1000, Prot::RW, "blocker")
        .unwrap();
    assert_eq!(call(&table, &mut session, "brk", &[0x30_0000]), 0x10_2010);
    assert_eq!(call(&table, &mut session, "brk", &[0x100]), 0x10_2010);
}

#[test]
fn brk_shrink_unmaps_split_heap_pages() {
    let mut session = session(RecordingHost::default());
    let table = table();

    assert_eq!(call(&table, &mut session, "brk", &[0x10_3000]), 0x10_3000);
    assert_eq!(call(&table, &mut session, "mprotect", &[0x10_1000, 0x1000, 0x1]), 0);

    assert_eq!(call(&table, &mut session, "brk", &[0x10_1000]), 0x10_1000);
    assert!(session.space().find_mapping(0x10_1000).is_none());
    assert!(session.space().find_mapping(0x10_2000).is_none());

    assert_eq!(call(&table, &mut session, "brk", &[0x10_3000]), 0x10_3000);
    session.space_mut().write(0x10_1000, b"writable again").unwrap();
    assert_eq!(session.space().find_mapping(0x10_2fff).unwrap().prot(), Prot::RW);
}

#[test]
fn open_flags_follow_the_guest_abi() {
    let host = RecordingHost::default();
    let config = GuestConfig {
        arch: Some(Arch::M68k),
        ..GuestConfig::new(Bits::W32, Endian::Big)
    };
    let mut session = Session::with_host(config, host.clone()).unwrap();
    session
        .space_mut()
        .map_fixed(0x1000, 0x1000, Prot::RW, "data")
        .unwrap();
    session.space_mut().write(0x1000, b"/tmp\0").unwrap();

    // m68k O_DIRECTORY | O_NOFOLLOW
    assert_eq!(
        call(&table(), &mut session, "open", &[0x1000, 0o140000, 0]),
        FILE_FD as u64
    );
    assert_eq!(
        host.log.lock().unwrap().opened,
        vec![("/tmp".to_string(), libc::O_DIRECTORY | libc::O_NOFOLLOW)]
    );
}

#[test]
fn dispatch_by_number_adopts_the_guest_abi() {
    let host = RecordingHost::default();
    let mut session = session(host.clone());
    session.space_mut().write(0x1000, b"/tmp\0").unwrap();
    assert_eq!(session.arch(), None);

    let ret = table()
        .dispatch_number(
            &mut session,
            Arch::M68k,
            5,
            &mut WordSlice::new(&[0x1000, 0o040000, 0]),
            false,
        )
        .unwrap();
    assert_eq!(ret, FILE_FD as u64);
    assert_eq!(session.arch(), Some(Arch::M68k));
    assert_eq!(host.log.lock().unwrap().opened[0].1, libc::O_DIRECTORY);
}

#[test]
fn sessions_reject_invalid_configs() {
    let config = GuestConfig {
        page_size: 0,
        ..GuestConfig::default()
    };
    assert!(matches!(
        Session::with_host(config, RecordingHost::default()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn getcwd_reports_length_with_terminator() {
    let mut session = session(RecordingHost::default());
    let table = table();

    assert_eq!(call(&table, &mut session, "getcwd", &[0x1000, 256]), 12);
    assert_eq!(session.space().read(0x1000, 12).unwrap(), b"/guest/home\0");
    assert_eq!(
        call(&table, &mut session, "getcwd", &[0x1000, 11]),
        failed(Errno::ERANGE)
    );
}

#[test]
fn open_and_access_read_guest_paths() {
    let host = RecordingHost::default();
    let mut session = session(host.clone());
    session.space_mut().write(0x1000, b"/etc/passwd\0").unwrap();
    session.space_mut().write(0x1100, b"/missing\0").unwrap();
    let table = table();

    assert_eq!(call(&table, &mut session, "open", &[0x1000, 0, 0]), FILE_FD as u64);
    assert_eq!(
        host.log.lock().unwrap().opened,
        vec![("/etc/passwd".to_string(), 0)]
    );
    assert_eq!(call(&table, &mut session, "access", &[0x1000, 0]), 0);
    assert_eq!(
        call(&table, &mut session, "access", &[0x1100, 0]),
        failed(Errno::ENOENT)
    );
    assert_eq!(
        call(&table, &mut session, "open", &[0x9000, 0, 0]),
        failed(Errno::EFAULT)
    );
}

#[test]
fn writev_gathers_into_one_host_write() {
    let host = RecordingHost::default();
    let mut session =
        Session::with_host(GuestConfig::new(Bits::W32, Endian::Big), host.clone()).unwrap();
    let space = session.space_mut();
    space.map_fixed(0x1000, 0x1000, Prot::RW, "data").unwrap();
    space.write(0x1800, b"hello ").unwrap();
    space.write(0x1900, b"world").unwrap();
    space
        .write(0x1000, &[0, 0, 0x18, 0, 0, 0, 0, 6, 0, 0, 0x19, 0, 0, 0, 0, 5])
        .unwrap();
    let table = table();

    assert_eq!(call(&table, &mut session, "writev", &[1, 0x1000, 2]), 11);
    assert_eq!(host.writes(), vec![(1, b"hello world".to_vec())]);

    assert_eq!(
        call(&table, &mut session, "writev", &[1, 0x1000, 1025]),
        failed(Errno::EINVAL)
    );
    assert_eq!(call(&table, &mut session, "writev", &[1, 0x1000, 0]), 0);
    assert_eq!(host.writes().len(), 1);
}

#[test]
fn fstat_packs_host_stat_for_the_guest() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"twelve bytes").unwrap();
    let fd = file.as_raw_fd() as u64;
    let table = table();

    let mut native = Session::new(GuestConfig::default()).unwrap();
    native
        .space_mut()
        .map_fixed(0x1000, 0x1000, Prot::RW, "stat")
        .unwrap();
    assert_eq!(call(&table, &mut native, "fstat", &[fd, 0x1000]), 0);
    let stat: HostStat = native.codec().read_record(native.space(), 0x1000).unwrap();
    assert_eq!(stat.size, 12);
    assert_eq!(stat.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);

    let mut m68k = Session::new(GuestConfig::new(Bits::W32, Endian::Big)).unwrap();
    m68k.space_mut()
        .map_fixed(0x1000, 0x1000, Prot::RW, "stat")
        .unwrap();
    assert_eq!(call(&table, &mut m68k, "fstat", &[fd, 0x1000]), 0);
    assert_eq!(m68k.space().read(0x1000 + 32, 4).unwrap(), vec![0, 0, 0, 12]);

    // No room for the record: nothing is written.
    assert_eq!(
        call(&table, &mut m68k, "fstat", &[fd, 0x1fc0]),
        failed(Errno::EFAULT)
    );
    assert_eq!(m68k.space().read(0x1fc0, 0x40).unwrap(), vec![0; 0x40]);
}

#[test]
fn exit_records_status() {
    let mut session = session(RecordingHost::default());
    assert!(!session.has_exited());
    assert_eq!(call(&table(), &mut session, "exit", &[3]), 0);
    assert_eq!(session.exit_status(), Some(3));
}

#[test]
fn tracer_sees_each_call() {
    let out = SharedBuf::default();
    let mut session = session(RecordingHost::default());
    session.set_tracer(WriterTracer::new(out.clone()));
    session.space_mut().write(0x1000, b"hello").unwrap();
    let table = table();

    table
        .dispatch(&mut session, "write", &mut WordSlice::new(&[1, 0x1000, 5]), true)
        .unwrap();
    table
        .dispatch(&mut session, "close", &mut WordSlice::new(&[u64::MAX]), true)
        .unwrap();
    // Untraced calls leave no line.
    call(&table, &mut session, "close", &[1]);

    let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
    insta::assert_snapshot!(text, @r#"
    write(1, "hello", 5) = 5
    close(-1) = -1 EBADF (errno 9)
    "#);
}

#[test]
fn sessions_share_one_table_across_threads() {
    let table = Arc::new(table());

    thread::scope(|scope| {
        for id in 0..4u64 {
            let table = Arc::clone(&table);
            scope.spawn(move || {
                let mut session = session(RecordingHost::default());
                for _ in 0..=id {
                    call(
                        &table,
                        &mut session,
                        "mmap",
                        &[0, 4096, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
                    );
                }
                let next = call(
                    &table,
                    &mut session,
                    "mmap",
                    &[0, 4096, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
                );
                // Each session allocates in its own space.
                assert_eq!(next, 0x4000_0000 + (id + 1) * 0x1000);
            });
        }
    });
}

fn assert_disjoint(space: &AddressSpace) {
    let maps: Vec<_> = space.mappings().collect();
    for pair in maps.windows(2) {
        assert!(pair[0].end() <= pair[1].start(), "{} overlaps {}", pair[0], pair[1]);
    }
}

#[test]
fn random_mmap_munmap_keeps_mappings_disjoint() {
    let mut rng = StdRng::seed_from_u64(0x6775_6573);
    let mut session = session(RecordingHost::default());
    let table = table();
    let mut live: Vec<(u64, u64)> = Vec::new();

    for _ in 0..300 {
        if live.is_empty() || rng.random_bool(0.6) {
            let len = rng.random_range(1..=6u64) * 4096 - rng.random_range(0..4096);
            let hint = if rng.random_bool(0.3) {
                0x4000_0000 + rng.random_range(0..64u64) * 4096
            } else {
                0
            };
            let addr = call(
                &table,
                &mut session,
                "mmap",
                &[hint, len, PROT_RW, MAP_PRIVATE_ANON, NO_FD, 0],
            );
            assert_eq!(addr % 4096, 0);
            live.push((addr, len));
        } else {
            let (addr, len) = live.swap_remove(rng.random_range(0..live.len()));
            assert_eq!(call(&table, &mut session, "munmap", &[addr, len]), 0);
        }
        assert_disjoint(session.space());
    }

    for (addr, len) in live {
        assert!(session.space().check_writable(addr, len).is_ok());
    }
}
