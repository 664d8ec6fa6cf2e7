mod file_io_basic;
mod file_metadata;
mod file_open_close;
mod memory_management;
pub mod numbers;
mod process_management;

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    args::{ArgKind, MarshalError, Marshaler, SyscallArgs, WordSource},
    config::ErrorEncoding,
    errno::Errno,
    session::Session,
    trace::CallRecord,
};
pub use numbers::{Arch, syscall_name, syscall_number};

/// Largest number of fixed argument words any guest ABI passes in registers.
const MAX_FIXED_ARGS: usize = 6;

pub type SysResult = Result<u64, Errno>;

/// Every handler has this shape; the descriptor's kinds fix the arity.
pub type Handler = fn(&mut Session, &SyscallArgs) -> SysResult;

#[derive(Debug, Clone, Copy)]
pub struct SyscallDescriptor {
    pub name: &'static str,
    pub args: &'static [ArgKind],
    pub handler: Handler,
}

impl SyscallDescriptor {
    pub const fn new(name: &'static str, args: &'static [ArgKind], handler: Handler) -> Self {
        Self {
            name,
            args,
            handler,
        }
    }
}

/// Outcome of a handler before it is encoded for the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallResult {
    Success(u64),
    Failure(Errno),
}

impl CallResult {
    pub fn encode(self, encoding: ErrorEncoding) -> u64 {
        match self {
            CallResult::Success(value) => value,
            CallResult::Failure(errno) => errno.encode(encoding),
        }
    }
}

impl From<SysResult> for CallResult {
    fn from(result: SysResult) -> Self {
        match result {
            Ok(value) => CallResult::Success(value),
            Err(errno) => CallResult::Failure(errno),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unimplemented syscall {0}")]
    Unimplemented(String),
    #[error("unknown {arch} syscall number {number}")]
    UnknownNumber { arch: Arch, number: u32 },
    #[error("malformed descriptor for {name}: {reason}")]
    MalformedDescriptor { name: &'static str, reason: String },
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

impl DispatchError {
    /// True for problems with the table or the guest's syscall choice rather
    /// than with one call's arguments.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, DispatchError::Marshal(_))
    }
}

#[derive(Debug, Default)]
pub struct SyscallTableBuilder {
    descriptors: Vec<SyscallDescriptor>,
}

impl SyscallTableBuilder {
    pub fn register(mut self, descriptor: SyscallDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> Result<SyscallTable, DispatchError> {
        let mut seen = HashSet::new();
        for desc in &self.descriptors {
            let malformed = |reason: &str| DispatchError::MalformedDescriptor {
                name: desc.name,
                reason: reason.to_string(),
            };
            if !seen.insert(desc.name) {
                return Err(malformed("registered twice"));
            }
            if let Some(pos) = desc.args.iter().position(|k| *k == ArgKind::VarStr)
                && pos + 1 != desc.args.len()
            {
                return Err(malformed("VarStr must be the last argument"));
            }
            let fixed = desc.args.iter().filter(|k| **k != ArgKind::VarStr).count();
            if fixed > MAX_FIXED_ARGS {
                return Err(malformed(&format!(
                    "{fixed} fixed arguments, at most {MAX_FIXED_ARGS} supported"
                )));
            }
        }

        let entries = self
            .descriptors
            .into_iter()
            .map(|desc| (desc.name, desc))
            .collect();
        Ok(SyscallTable { entries })
    }
}

/// Immutable registry of syscall handlers, shared freely between sessions.
#[derive(Debug, Clone)]
pub struct SyscallTable {
    entries: HashMap<&'static str, SyscallDescriptor>,
}

impl SyscallTable {
    pub fn builder() -> SyscallTableBuilder {
        SyscallTableBuilder::default()
    }

    /// The built-in handler set.
    pub fn posix() -> Result<Self, DispatchError> {
        use ArgKind::*;

        Self::builder()
            .register(SyscallDescriptor::new("exit", &[Int], Session::sys_exit))
            .register(SyscallDescriptor::new("read", &[Fd, OutBuf, Len], Session::sys_read))
            .register(SyscallDescriptor::new("write", &[Fd, InBuf, Len], Session::sys_write))
            .register(SyscallDescriptor::new("open", &[CStr, Int, Int], Session::sys_open))
            .register(SyscallDescriptor::new("close", &[Fd], Session::sys_close))
            .register(SyscallDescriptor::new("lseek", &[Fd, Off, Int], Session::sys_lseek))
            .register(SyscallDescriptor::new(
                "mmap",
                &[Ptr, Len, Int, Int, Fd, Off],
                Session::sys_mmap,
            ))
            .register(SyscallDescriptor::new("munmap", &[Ptr, Len], Session::sys_munmap))
            .register(SyscallDescriptor::new(
                "mprotect",
                &[Ptr, Len, Int],
                Session::sys_mprotect,
            ))
            .register(SyscallDescriptor::new("brk", &[Ptr], Session::sys_brk))
            .register(SyscallDescriptor::new("fstat", &[Fd, Ptr], Session::sys_fstat))
            .register(SyscallDescriptor::new("getcwd", &[Ptr, Len], Session::sys_getcwd))
            .register(SyscallDescriptor::new("access", &[CStr, Int], Session::sys_access))
            .register(SyscallDescriptor::new("writev", &[Fd, Ptr, Int], Session::sys_writev))
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&SyscallDescriptor> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run one guest syscall and return the value for its return register.
    ///
    /// Handler failures are encoded into the returned word. An `Err` means the
    /// handler never ran.
    pub fn dispatch(
        &self,
        session: &mut Session,
        name: &str,
        words: &mut dyn WordSource,
        trace: bool,
    ) -> Result<u64, DispatchError> {
        let Some(desc) = self.entries.get(name) else {
            warn!(syscall = name, "unimplemented syscall");
            return Err(DispatchError::Unimplemented(name.to_string()));
        };

        let args = Marshaler::new(session.space().bits()).decode(desc.args, words)?;
        let call = CallRecord {
            name: desc.name,
            kinds: desc.args,
            args: &args,
        };

        if trace {
            session.trace_before(&call);
        }
        let result = CallResult::from((desc.handler)(session, &args));
        debug!(syscall = desc.name, ?result, "dispatched");
        if trace {
            session.trace_after(&call, &result);
        }

        Ok(result.encode(session.error_encoding()))
    }

    /// Dispatch by guest syscall number.
    pub fn dispatch_number(
        &self,
        session: &mut Session,
        arch: Arch,
        number: u32,
        words: &mut dyn WordSource,
        trace: bool,
    ) -> Result<u64, DispatchError> {
        let Some(name) = syscall_name(arch, number) else {
            warn!(%arch, number, "unknown syscall number");
            return Err(DispatchError::UnknownNumber { arch, number });
        };
        session.adopt_arch(arch);
        self.dispatch(session, name, words, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Session, _: &SyscallArgs) -> SysResult {
        Ok(0)
    }

    #[test]
    fn test_posix_table_builds() {
        let table = SyscallTable::posix().unwrap();
        assert_eq!(table.len(), 14);
        assert!(table.contains("writev"));
        assert_eq!(table.get("mmap").unwrap().args.len(), 6);
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = SyscallTable::builder()
            .register(SyscallDescriptor::new("noop", &[], noop))
            .register(SyscallDescriptor::new("noop", &[ArgKind::Int], noop))
            .build()
            .unwrap_err();
        assert!(matches!(err, DispatchError::MalformedDescriptor { name: "noop", .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_misplaced_varstr() {
        let err = SyscallTable::builder()
            .register(SyscallDescriptor::new(
                "exec",
                &[ArgKind::VarStr, ArgKind::Int],
                noop,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DispatchError::MalformedDescriptor { name: "exec", .. }));
    }

    #[test]
    fn test_rejects_too_many_fixed_args() {
        use ArgKind::*;
        let err = SyscallTable::builder()
            .register(SyscallDescriptor::new(
                "wide",
                &[Int, Int, Int, Int, Int, Int, Int],
                noop,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DispatchError::MalformedDescriptor { name: "wide", .. }));

        // VarStr does not count toward the fixed limit.
        SyscallTable::builder()
            .register(SyscallDescriptor::new(
                "spawn",
                &[Int, Int, Int, Int, Int, Int, VarStr],
                noop,
            ))
            .build()
            .unwrap();
    }

    #[test]
    fn test_call_result_encoding() {
        let failure = CallResult::Failure(Errno::EBADF);
        assert_eq!(
            failure.encode(ErrorEncoding::Complement),
            !(libc::EBADF as u64)
        );
        assert_eq!(
            failure.encode(ErrorEncoding::Negate) as i64,
            -(libc::EBADF as i64)
        );
        assert_eq!(CallResult::Success(7).encode(ErrorEncoding::Complement), 7);
    }
}
