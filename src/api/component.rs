//! Purpose: Load a native component and verify its contract before first use.
//! Exports: `SymbolSource`, `DylibSource`, `StaticSymbols`, `BufferOps`, `Component`, `ComponentCell`.
//! Role: Host-side entry point; every other host module reaches native code through here.
//! Invariants: The contract version and every checksum are checked before any other symbol
//! is resolved or called; a mismatch leaves the library untouched.
//! Invariants: Buffers received from a component are freed through its own `BufferOps`.
use crate::abi;
use crate::api::call::rust_call;
use crate::api::cleaner::{Cleaner, cleaner_for};
use crate::core::buffer::{BufferAllocator, ForeignBytes, RustBuffer};
use crate::core::checksum::{CONTRACT_VERSION_SYMBOL, Contract};
use crate::core::config::RuntimeConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::status::CallStatus;
use libloading::Library;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Where a component's symbols come from.
pub trait SymbolSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<*const c_void>;

    /// Human-readable origin for logs and errors.
    fn describe(&self) -> String;
}

/// A dynamically loaded shared library.
pub struct DylibSource {
    library: Library,
    path: PathBuf,
}

impl DylibSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::Load)
                .with_message(format!("failed to load library {}", path.display()))
                .with_hint("Check the path, or set the library override for this namespace.")
                .with_source(err)
        })?;
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Loads `lib<name>.so` (or the platform equivalent) from the loader's search path.
    pub fn load_by_name(name: &str) -> Result<Self, Error> {
        Self::load(platform_library_name(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for DylibSource {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let ptr = *symbol;
        (!ptr.is_null()).then_some(ptr)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn platform_library_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}

/// Explicit symbol table for components linked into the host process.
#[derive(Clone, Debug, Default)]
pub struct StaticSymbols {
    label: String,
    symbols: HashMap<String, usize>,
}

impl StaticSymbols {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            symbols: HashMap::new(),
        }
    }

    /// Table with the crate's own fixed entry points already registered.
    pub fn with_runtime(label: impl Into<String>) -> Self {
        let ops = BufferOps::in_process();
        Self::new(label)
            .with(CONTRACT_VERSION_SYMBOL, abi::uniwire_contract_version as *const c_void)
            .with(BUFFER_ALLOC_SYMBOL, ops.alloc as *const c_void)
            .with(BUFFER_FROM_BYTES_SYMBOL, ops.from_bytes as *const c_void)
            .with(BUFFER_FREE_SYMBOL, ops.free as *const c_void)
            .with(BUFFER_RESERVE_SYMBOL, ops.reserve as *const c_void)
    }

    pub fn with(mut self, name: impl Into<String>, ptr: *const c_void) -> Self {
        self.symbols.insert(name.into(), ptr as usize);
        self
    }
}

impl SymbolSource for StaticSymbols {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).map(|addr| *addr as *const c_void)
    }

    fn describe(&self) -> String {
        format!("static:{}", self.label)
    }
}

pub const BUFFER_ALLOC_SYMBOL: &str = "uniwire_rustbuffer_alloc";
pub const BUFFER_FROM_BYTES_SYMBOL: &str = "uniwire_rustbuffer_from_bytes";
pub const BUFFER_FREE_SYMBOL: &str = "uniwire_rustbuffer_free";
pub const BUFFER_RESERVE_SYMBOL: &str = "uniwire_rustbuffer_reserve";

pub type BufferAllocFn = unsafe extern "C" fn(len: u64, status: &mut CallStatus) -> RustBuffer;
pub type BufferFromBytesFn =
    unsafe extern "C" fn(bytes: ForeignBytes, status: &mut CallStatus) -> RustBuffer;
pub type BufferFreeFn = unsafe extern "C" fn(buf: RustBuffer, status: &mut CallStatus);
pub type BufferReserveFn =
    unsafe extern "C" fn(buf: RustBuffer, additional: u64, status: &mut CallStatus) -> RustBuffer;

/// A component's buffer entry points, used as the host's allocator for it.
#[derive(Clone, Copy, Debug)]
pub struct BufferOps {
    pub alloc: BufferAllocFn,
    pub from_bytes: BufferFromBytesFn,
    pub free: BufferFreeFn,
    pub reserve: BufferReserveFn,
}

impl BufferOps {
    /// The entry points of this crate's own `abi` module.
    pub fn in_process() -> Self {
        Self {
            alloc: abi::uniwire_rustbuffer_alloc,
            from_bytes: abi::uniwire_rustbuffer_from_bytes,
            free: abi::uniwire_rustbuffer_free,
            reserve: abi::uniwire_rustbuffer_reserve,
        }
    }

    fn resolve(source: &dyn SymbolSource) -> Result<Self, Error> {
        unsafe {
            Ok(Self {
                alloc: resolve_symbol(source, BUFFER_ALLOC_SYMBOL)?,
                from_bytes: resolve_symbol(source, BUFFER_FROM_BYTES_SYMBOL)?,
                free: resolve_symbol(source, BUFFER_FREE_SYMBOL)?,
                reserve: resolve_symbol(source, BUFFER_RESERVE_SYMBOL)?,
            })
        }
    }

    pub fn alloc(&self, len: u64) -> Result<RustBuffer, Error> {
        let alloc = self.alloc;
        rust_call(self, |status| unsafe { alloc(len, status) })
    }

    pub fn reserve(&self, buf: RustBuffer, additional: u64) -> Result<RustBuffer, Error> {
        let reserve = self.reserve;
        rust_call(self, |status| unsafe { reserve(buf, additional, status) })
    }
}

impl BufferAllocator for BufferOps {
    fn alloc_from_bytes(&self, bytes: &[u8]) -> Result<RustBuffer, Error> {
        let foreign = ForeignBytes::from_slice(bytes)?;
        let from_bytes = self.from_bytes;
        rust_call(self, |status| unsafe { from_bytes(foreign, status) })
    }

    fn free(&self, buf: RustBuffer) -> Result<(), Error> {
        let free = self.free;
        rust_call(self, |status| unsafe { free(buf, status) })
    }
}

/// Resolves `name` as a function pointer of type `F`.
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's real signature.
pub unsafe fn resolve_symbol<F: Copy>(source: &dyn SymbolSource, name: &str) -> Result<F, Error> {
    if size_of::<F>() != size_of::<*const c_void>() {
        return Err(Error::new(ErrorKind::Internal)
            .with_message("symbol type is not pointer-sized")
            .with_symbol(name));
    }
    let ptr = source.lookup(name).ok_or_else(|| {
        Error::new(ErrorKind::Load)
            .with_message(format!("symbol missing from {}", source.describe()))
            .with_symbol(name)
    })?;
    Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&ptr) })
}

type ContractVersionFn = unsafe extern "C" fn() -> u32;
type ChecksumFn = unsafe extern "C" fn() -> u16;

/// A loaded component whose contract has been verified.
pub struct Component {
    namespace: String,
    source: Box<dyn SymbolSource>,
    buffers: BufferOps,
    cleaner: Arc<dyn Cleaner>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("namespace", &self.namespace)
            .field("source", &self.source.describe())
            .finish_non_exhaustive()
    }
}

impl Component {
    pub fn load(
        source: impl SymbolSource + 'static,
        contract: &Contract,
        config: &RuntimeConfig,
    ) -> Result<Self, Error> {
        verify_contract(&source, contract)?;
        let buffers = BufferOps::resolve(&source)?;
        let cleaner = cleaner_for(config.cleaner)?;
        tracing::debug!(
            namespace = %contract.namespace,
            source = %source.describe(),
            checksums = contract.checksums.len(),
            "component loaded"
        );
        Ok(Self {
            namespace: contract.namespace.clone(),
            source: Box::new(source),
            buffers,
            cleaner,
        })
    }

    /// Loads the namespace's library from the override path or by platform name.
    pub fn open(contract: &Contract, config: &RuntimeConfig) -> Result<Self, Error> {
        let source = match &config.library_override {
            Some(path) => DylibSource::load(path)?,
            None => DylibSource::load_by_name(&contract.namespace.to_lowercase())?,
        };
        Self::load(source, contract, config)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn buffers(&self) -> &BufferOps {
        &self.buffers
    }

    pub fn cleaner(&self) -> Arc<dyn Cleaner> {
        Arc::clone(&self.cleaner)
    }

    /// # Safety
    ///
    /// `F` must be a function pointer type matching the symbol's real signature.
    pub unsafe fn symbol<F: Copy>(&self, name: &str) -> Result<F, Error> {
        unsafe { resolve_symbol(self.source.as_ref(), name) }
    }
}

/// Checks the contract version, then each checksum, calling nothing else.
pub fn verify_contract(source: &dyn SymbolSource, contract: &Contract) -> Result<(), Error> {
    let version_fn: ContractVersionFn = unsafe { resolve_symbol(source, CONTRACT_VERSION_SYMBOL) }?;
    let version = unsafe { version_fn() };
    if version != contract.contract_version {
        tracing::error!(
            source = %source.describe(),
            expected = contract.contract_version,
            actual = version,
            "contract version mismatch"
        );
        return Err(Error::new(ErrorKind::Checksum)
            .with_message(format!(
                "contract version mismatch: expected {}, library has {version}",
                contract.contract_version
            ))
            .with_symbol(CONTRACT_VERSION_SYMBOL)
            .with_hint("Rebuild the bindings and the library from the same interface."));
    }
    for entry in &contract.checksums {
        let checksum_fn: ChecksumFn = unsafe { resolve_symbol(source, &entry.symbol) }.map_err(|err| {
            Error::new(ErrorKind::Checksum)
                .with_message(format!("checksum symbol missing: {err}"))
                .with_symbol(entry.symbol.as_str())
        })?;
        let actual = unsafe { checksum_fn() };
        if actual != entry.expected {
            tracing::error!(
                symbol = %entry.symbol,
                expected = entry.expected,
                actual,
                "API checksum mismatch"
            );
            return Err(Error::new(ErrorKind::Checksum)
                .with_message(format!(
                    "API checksum mismatch: expected {}, library has {actual}",
                    entry.expected
                ))
                .with_symbol(entry.symbol.as_str())
                .with_hint("Rebuild the bindings and the library from the same interface."));
        }
    }
    Ok(())
}

/// Process-wide, load-once home for a component.
pub struct ComponentCell {
    cell: OnceLock<Component>,
    init: Mutex<()>,
}

impl ComponentCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn get(&self) -> Option<&Component> {
        self.cell.get()
    }

    /// Runs `load` at most once successfully; a failed load is retried next time.
    pub fn get_or_load<F>(&self, load: F) -> Result<&Component, Error>
    where
        F: FnOnce() -> Result<Component, Error>,
    {
        if let Some(component) = self.cell.get() {
            return Ok(component);
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(component) = self.cell.get() {
            return Ok(component);
        }
        let component = load()?;
        Ok(self.cell.get_or_init(|| component))
    }
}

impl Default for ComponentCell {
    fn default() -> Self {
        Self::new()
    }
}
