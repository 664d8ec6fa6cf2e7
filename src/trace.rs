use std::io;

use tracing::{debug, info};

use crate::{
    args::{Arg, ArgKind, SyscallArgs},
    memory::AddressSpace,
    syscall::CallResult,
};

/// Bytes of an input buffer shown in a trace line.
const PREVIEW_LEN: u64 = 32;
const MAX_TRACED_STRING: usize = 256;

/// A call as the tracer sees it.
#[derive(Debug, Clone, Copy)]
pub struct CallRecord<'a> {
    pub name: &'a str,
    pub kinds: &'a [ArgKind],
    pub args: &'a SyscallArgs,
}

/// Render a call strace-style, e.g. `write(1, "hello", 5)`.
pub fn format_call(
    name: &str,
    kinds: &[ArgKind],
    args: &SyscallArgs,
    space: &AddressSpace,
) -> String {
    let rendered: Vec<String> = kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| format_arg(i, *kind, kinds, args, space))
        .collect();
    format!("{name}({})", rendered.join(", "))
}

fn format_arg(
    index: usize,
    kind: ArgKind,
    kinds: &[ArgKind],
    args: &SyscallArgs,
    space: &AddressSpace,
) -> String {
    match kind {
        ArgKind::Int | ArgKind::Off => args.int(index).to_string(),
        ArgKind::Fd => args.fd(index).to_string(),
        ArgKind::Len => args.len(index).to_string(),
        ArgKind::Ptr | ArgKind::OutBuf => format!("{:#x}", args.ptr(index)),
        ArgKind::InBuf => {
            let ptr = args.ptr(index);
            let len = kinds[index + 1..]
                .iter()
                .position(|k| *k == ArgKind::Len)
                .map_or(0, |offset| args.len(index + 1 + offset));
            let shown = len.min(PREVIEW_LEN);
            match space.read(ptr, shown) {
                Ok(bytes) => {
                    let ellipsis = if len > shown { "..." } else { "" };
                    format!("{}{ellipsis}", quote(&bytes))
                }
                Err(_) => format!("{ptr:#x}"),
            }
        }
        ArgKind::CStr => {
            let ptr = args.ptr(index);
            space
                .read_c_string(ptr, Some(MAX_TRACED_STRING))
                .map_or_else(|_| format!("{ptr:#x}"), |s| quote(&s))
        }
        ArgKind::VarStr => {
            let ptrs: &[u64] = match args.get(index) {
                Some(Arg::Strings(ptrs)) => ptrs.as_slice(),
                _ => &[],
            };
            let items: Vec<String> = ptrs
                .iter()
                .map(|&ptr| {
                    space
                        .read_c_string(ptr, Some(MAX_TRACED_STRING))
                        .map_or_else(|_| format!("{ptr:#x}"), |s| quote(&s))
                })
                .collect();
            format!("[{}]", items.join(", "))
        }
    }
}

fn quote(bytes: &[u8]) -> String {
    format!("\"{}\"", bytes.escape_ascii())
}

/// Append the outcome: `= 5` or `= -1 EBADF (errno 9)`.
pub fn format_return(call_line: &str, result: &CallResult) -> String {
    match result {
        CallResult::Success(value) => format!("{call_line} = {}", *value as i64),
        CallResult::Failure(errno) => format!("{call_line} = -1 {errno}"),
    }
}

/// Hooks run around every traced call. Tracers observe memory but never
/// change it, and cannot fail the call.
pub trait Tracer {
    fn before(&mut self, call: &CallRecord<'_>, space: &AddressSpace);

    fn after(&mut self, call: &CallRecord<'_>, result: &CallResult, space: &AddressSpace);
}

/// Emits each completed call through `tracing` under the `strace` target.
#[derive(Debug, Default)]
pub struct LogTracer {
    pending: Option<String>,
}

impl Tracer for LogTracer {
    fn before(&mut self, call: &CallRecord<'_>, space: &AddressSpace) {
        let line = format_call(call.name, call.kinds, call.args, space);
        debug!(target: "strace", "{line} ...");
        self.pending = Some(line);
    }

    fn after(&mut self, call: &CallRecord<'_>, result: &CallResult, space: &AddressSpace) {
        let line = self
            .pending
            .take()
            .unwrap_or_else(|| format_call(call.name, call.kinds, call.args, space));
        info!(target: "strace", "{}", format_return(&line, result));
    }
}

/// Writes one line per completed call to a stream. Write errors are ignored.
#[derive(Debug)]
pub struct WriterTracer<W> {
    out: W,
    pending: Option<String>,
}

impl<W: io::Write> WriterTracer<W> {
    pub fn new(out: W) -> Self {
        Self { out, pending: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> Tracer for WriterTracer<W> {
    fn before(&mut self, call: &CallRecord<'_>, space: &AddressSpace) {
        self.pending = Some(format_call(call.name, call.kinds, call.args, space));
    }

    fn after(&mut self, call: &CallRecord<'_>, result: &CallResult, space: &AddressSpace) {
        let line = self
            .pending
            .take()
            .unwrap_or_else(|| format_call(call.name, call.kinds, call.args, space));
        let _ = writeln!(self.out, "{}", format_return(&line, result));
    }
}
