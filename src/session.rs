use tracing::info;

use crate::{
    args::WordSource,
    codec::StructCodec,
    config::{ConfigError, ErrorEncoding, GuestConfig},
    host::{Host, LibcHost},
    memory::AddressSpace,
    syscall::{Arch, CallResult, DispatchError, SyscallTable},
    trace::{CallRecord, LogTracer, Tracer},
};

/// One emulated guest: its memory, its view of the host, and its exit state.
///
/// A session is driven by a single instruction stream. Sessions share nothing
/// with each other except a read-only [`SyscallTable`].
pub struct Session {
    space: AddressSpace,
    host: Box<dyn Host + Send>,
    codec: StructCodec,
    tracer: Box<dyn Tracer + Send>,
    config: GuestConfig,
    arch: Option<Arch>,
    exit_status: Option<i32>,
}

impl Session {
    pub fn new(config: GuestConfig) -> Result<Self, ConfigError> {
        Self::with_host(config, LibcHost)
    }

    /// Fails when `config` does not pass [`GuestConfig::validate`].
    pub fn with_host(
        config: GuestConfig,
        host: impl Host + Send + 'static,
    ) -> Result<Self, ConfigError> {
        let space = AddressSpace::try_new(&config)?;
        Ok(Self {
            codec: StructCodec::for_space(&space),
            space,
            host: Box::new(host),
            tracer: Box::new(LogTracer::default()),
            arch: config.arch,
            config,
            exit_status: None,
        })
    }

    pub fn set_tracer(&mut self, tracer: impl Tracer + Send + 'static) {
        self.tracer = Box::new(tracer);
    }

    pub fn config(&self) -> &GuestConfig {
        &self.config
    }

    /// Guest ABI, from the config or from the first call dispatched by number.
    pub fn arch(&self) -> Option<Arch> {
        self.arch
    }

    pub fn error_encoding(&self) -> ErrorEncoding {
        self.config.error_encoding
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    pub fn codec(&self) -> StructCodec {
        self.codec
    }

    /// Status passed to `exit`, once the guest has called it.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Dispatch with the configured default trace flag.
    pub fn dispatch(
        &mut self,
        table: &SyscallTable,
        name: &str,
        words: &mut dyn WordSource,
    ) -> Result<u64, DispatchError> {
        let trace = self.config.trace;
        table.dispatch(self, name, words, trace)
    }

    pub(crate) fn host(&mut self) -> &mut (dyn Host + Send) {
        self.host.as_mut()
    }

    pub(crate) fn adopt_arch(&mut self, arch: Arch) {
        self.arch.get_or_insert(arch);
    }

    pub(crate) fn record_exit(&mut self, status: i32) {
        info!(status, "guest exited");
        self.exit_status = Some(status);
    }

    pub(crate) fn trace_before(&mut self, call: &CallRecord<'_>) {
        self.tracer.before(call, &self.space);
    }

    pub(crate) fn trace_after(&mut self, call: &CallRecord<'_>, result: &CallResult) {
        self.tracer.after(call, result, &self.space);
    }
}
