//! Syscall translation and guest-memory marshaling for user-space CPU emulators.
//!
//! A guest program running under an emulator traps into [`SyscallTable::dispatch`]
//! with a syscall name (or number, via [`SyscallTable::dispatch_number`]) and a
//! source of raw argument words. The table decodes the words, runs the handler
//! against the guest's [`Session`], and returns the value for the guest's
//! return register.

pub mod args;
pub mod codec;
pub mod config;
pub mod debug;
pub mod errno;
pub mod host;
pub mod memory;
pub mod session;
pub mod syscall;
pub mod trace;

pub use args::{Arg, ArgKind, MarshalError, Marshaler, SyscallArgs, WordSlice, WordSource};
pub use codec::{CodecError, HostStat, Iovec, StructCodec};
pub use config::{Bits, ConfigError, Endian, ErrorEncoding, GuestConfig};
pub use errno::Errno;
pub use host::{Host, LibcHost};
pub use memory::{AddressSpace, Mapping, MemoryError, Prot};
pub use session::Session;
pub use syscall::{
    Arch, CallResult, DispatchError, SysResult, SyscallDescriptor, SyscallTable, syscall_name,
};
pub use trace::{LogTracer, Tracer, WriterTracer};
