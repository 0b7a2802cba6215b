// Hand-written `demo` component: native entry points built from `uniwire::native`
// and the host bindings a generator would emit for them, linked in-process.
#![allow(dead_code)]

use std::ffi::c_void;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll};

use uniwire::abi::{
    uniwire_contract_version, uniwire_rust_future_cancel_rust_buffer,
    uniwire_rust_future_cancel_u32, uniwire_rust_future_complete_rust_buffer,
    uniwire_rust_future_complete_u32, uniwire_rust_future_free_rust_buffer,
    uniwire_rust_future_free_u32, uniwire_rust_future_poll_rust_buffer,
    uniwire_rust_future_poll_u32, uniwire_rustbuffer_alloc, uniwire_rustbuffer_free,
    uniwire_rustbuffer_from_bytes, uniwire_rustbuffer_reserve,
};
use uniwire::api::{
    AsyncEntryPoints, BufferOps, CallError, CallStatus, CallbackRegistry, CleanerKind, Component,
    ComponentCell, ComponentDef, Contract, Error, FfiConverter, ForeignBytes, ForeignFuture,
    ForeignFutureResult, LocalAllocator, ObjectVTable, RuntimeConfig, RustBuffer, StaticSymbols,
    handle_callback, register_vtable, rust_call, rust_call_async,
    rust_call_async_infallible, rust_call_with_error, spawn_foreign_future,
};
use uniwire::core::checksum::{constructor_symbol, function_symbol, method_symbol};
use uniwire::core::status::{ContinuationCallback, ForeignFutureComplete};
use uniwire::native::foreign::{ForeignFutureReceiver, VTableSlot, check_foreign_result, invoke_callback};
use uniwire::native::future::rust_future_new;
use uniwire::native::handles::{clone_arc, export_arc, free_arc, take_arc};
use uniwire::native::scaffolding::{
    LoweredError, lift_arg, lower_result, lower_result_with, lower_return,
};

pub const NAMESPACE: &str = "demo";

pub const DEF: &str = r#"{
  "namespace": "demo",
  "functions": [
    {"name": "greet", "args": [{"name": "who", "type": "string"}], "returns": "string"},
    {"name": "divide", "args": [{"name": "a", "type": "i32"}, {"name": "b", "type": "i32"}],
     "returns": "i32", "throws": "MathError"},
    {"name": "explode"},
    {"name": "add_slowly", "args": [{"name": "a", "type": "u32"}, {"name": "b", "type": "u32"},
     {"name": "steps", "type": "u32"}], "returns": "u32", "async": true},
    {"name": "wait_forever", "returns": "u32", "async": true},
    {"name": "shout", "args": [{"name": "logger", "type": "Logger"}, {"name": "line", "type": "string"}],
     "throws": "string"},
    {"name": "lookup", "args": [{"name": "logger", "type": "Logger"}, {"name": "key", "type": "string"}],
     "returns": "string", "throws": "string", "async": true}
  ],
  "objects": [
    {"name": "Counter",
     "constructors": [{"name": "new", "args": [{"name": "start", "type": "u64"}]}],
     "methods": [{"name": "incr", "returns": "u64"}]}
  ],
  "callback_interfaces": [
    {"name": "Logger", "methods": [
      {"name": "log", "args": [{"name": "line", "type": "string"}], "throws": "string"},
      {"name": "lookup", "args": [{"name": "key", "type": "string"}], "returns": "string",
       "throws": "string", "async": true}
    ]}
  ]
}"#;

pub fn def() -> ComponentDef {
    ComponentDef::from_json(DEF).expect("demo definition")
}

pub fn contract() -> Contract {
    def().contract()
}

/// Tests that read the shared counters below hold this for their duration.
pub fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = Mutex::new(());
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Native half
// ---------------------------------------------------------------------------

/// Every native entry point except the contract version and checksums bumps this.
pub static NATIVE_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static COUNTER_DROPS: AtomicUsize = AtomicUsize::new(0);
pub static FOREVER_DROPS: AtomicUsize = AtomicUsize::new(0);

fn touch() {
    NATIVE_CALLS.fetch_add(1, Ordering::SeqCst);
}

fn expected_checksum(symbol: &str) -> u16 {
    contract()
        .checksums
        .iter()
        .find(|entry| entry.symbol == symbol)
        .map(|entry| entry.expected)
        .unwrap_or(0)
}

macro_rules! checksum_fns {
    ($($name:ident),* $(,)?) => {
        $(
            extern "C" fn $name() -> u16 {
                expected_checksum(stringify!($name))
            }
        )*

        fn checksum_symbols(symbols: StaticSymbols) -> StaticSymbols {
            symbols$(.with(stringify!($name), $name as *const c_void))*
        }
    };
}

checksum_fns!(
    uniwire_demo_checksum_func_greet,
    uniwire_demo_checksum_func_divide,
    uniwire_demo_checksum_func_explode,
    uniwire_demo_checksum_func_add_slowly,
    uniwire_demo_checksum_func_wait_forever,
    uniwire_demo_checksum_func_shout,
    uniwire_demo_checksum_func_lookup,
    uniwire_demo_checksum_constructor_counter_new,
    uniwire_demo_checksum_method_counter_incr,
    uniwire_demo_checksum_callback_logger_log,
    uniwire_demo_checksum_callback_logger_lookup,
);

extern "C" fn counted_alloc(len: u64, status: &mut CallStatus) -> RustBuffer {
    touch();
    uniwire_rustbuffer_alloc(len, status)
}

extern "C" fn counted_from_bytes(bytes: ForeignBytes, status: &mut CallStatus) -> RustBuffer {
    touch();
    uniwire_rustbuffer_from_bytes(bytes, status)
}

extern "C" fn counted_free(buf: RustBuffer, status: &mut CallStatus) {
    touch();
    uniwire_rustbuffer_free(buf, status)
}

extern "C" fn counted_reserve(buf: RustBuffer, additional: u64, status: &mut CallStatus) -> RustBuffer {
    touch();
    uniwire_rustbuffer_reserve(buf, additional, status)
}

uniwire::wire_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum MathError {
        DivideByZero,
        Overflow,
    }
}

extern "C" fn native_greet(who: RustBuffer, status: &mut CallStatus) -> RustBuffer {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        let who: String = lift_arg(who, "who")?;
        lower_return(format!("Hello, {who}!"))
    })
}

extern "C" fn native_divide(a: i32, b: i32, status: &mut CallStatus) -> i32 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        let result = if b == 0 {
            Err(MathError::DivideByZero)
        } else {
            a.checked_div(b).ok_or(MathError::Overflow)
        };
        lower_result(result)
    })
}

extern "C" fn native_explode(status: &mut CallStatus) {
    touch();
    uniwire::native::scaffolding::rust_call(status, || -> Result<(), LoweredError> {
        panic!("kaboom")
    })
}

pub struct NativeCounter {
    value: AtomicU64,
}

impl Drop for NativeCounter {
    fn drop(&mut self) {
        COUNTER_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

extern "C" fn native_counter_new(start: u64, status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        Ok(export_arc(Arc::new(NativeCounter {
            value: AtomicU64::new(start),
        })))
    })
}

extern "C" fn native_counter_incr(handle: u64, status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        let counter = unsafe { take_arc::<NativeCounter>(handle) }?;
        Ok(counter.value.fetch_add(1, Ordering::SeqCst) + 1)
    })
}

extern "C" fn native_counter_clone(handle: u64, status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        Ok(unsafe { clone_arc::<NativeCounter>(handle) }?)
    })
}

extern "C" fn native_counter_free(handle: u64, status: &mut CallStatus) {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        Ok(unsafe { free_arc::<NativeCounter>(handle) }?)
    })
}

/// Wakes itself `remaining` times before resolving.
struct Steps {
    remaining: u32,
    value: u32,
}

impl Future for Steps {
    type Output = u32;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u32> {
        if self.remaining == 0 {
            return Poll::Ready(self.value);
        }
        self.remaining -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

extern "C" fn native_add_slowly(a: u32, b: u32, steps: u32, status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        Ok(rust_future_new(async move {
            let value = Steps {
                remaining: steps,
                value: a.wrapping_add(b),
            }
            .await;
            Ok::<u32, LoweredError>(value)
        }))
    })
}

struct DropFlag;

impl Drop for DropFlag {
    fn drop(&mut self) {
        FOREVER_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

extern "C" fn native_wait_forever(status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        Ok(rust_future_new(async move {
            let _flag = DropFlag;
            std::future::pending::<()>().await;
            Ok::<u32, LoweredError>(0)
        }))
    })
}

#[repr(C)]
pub struct LoggerVTable {
    pub log: extern "C" fn(handle: u64, line: RustBuffer, status: &mut CallStatus),
    pub lookup: extern "C" fn(
        handle: u64,
        key: RustBuffer,
        complete: ForeignFutureComplete<RustBuffer>,
        callback_data: u64,
    ) -> ForeignFuture,
    pub free: extern "C" fn(handle: u64),
}

static LOGGER_SLOT: VTableSlot<LoggerVTable> = VTableSlot::new("Logger");

extern "C" fn native_init_logger_vtable(vtable: *const LoggerVTable) {
    touch();
    if let Some(vtable) = unsafe { vtable.as_ref() } {
        LOGGER_SLOT.register(vtable);
    }
}

fn expected_string(message: String) -> Result<LoweredError, Error> {
    Ok(LoweredError::Expected(String::lower(message, &LocalAllocator)?))
}

extern "C" fn native_shout(logger: u64, line: RustBuffer, status: &mut CallStatus) {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        let line: String = lift_arg(line, "line")?;
        let vtable = LOGGER_SLOT.get()?;
        let loud = String::lower(line.to_uppercase(), &LocalAllocator)?;
        let outcome = invoke_callback::<(), String, _>(|status| (vtable.log)(logger, loud, status));
        (vtable.free)(logger);
        match outcome {
            Ok(()) => Ok(()),
            Err(CallError::Expected(message)) => Err(expected_string(message)?),
            Err(CallError::Runtime(err)) => Err(err.into()),
        }
    })
}

/// Native-side reference to a host logger; released through the vtable on drop.
struct LoggerRef {
    vtable: &'static LoggerVTable,
    handle: u64,
}

impl Drop for LoggerRef {
    fn drop(&mut self) {
        (self.vtable.free)(self.handle);
    }
}

async fn lookup_via_logger(logger: LoggerRef, key: String) -> Result<RustBuffer, LoweredError> {
    let mut receiver = ForeignFutureReceiver::<RustBuffer>::new();
    let arg = String::lower(key, &LocalAllocator)?;
    let callback_data = receiver.callback_data()?;
    let future = (logger.vtable.lookup)(logger.handle, arg, receiver.complete_fn(), callback_data);
    receiver.attach(future);
    let result = receiver.receive().await?;
    drop(logger);
    match check_foreign_result::<RustBuffer, String>(result) {
        Ok(buf) => {
            let value = String::try_lift(buf, &LocalAllocator)?;
            lower_return(format!("found:{value}"))
        }
        Err(CallError::Expected(message)) => Err(expected_string(message)?),
        Err(CallError::Runtime(err)) => Err(err.into()),
    }
}

extern "C" fn native_lookup(logger: u64, key: RustBuffer, status: &mut CallStatus) -> u64 {
    touch();
    uniwire::native::scaffolding::rust_call(status, || {
        let key: String = lift_arg(key, "key")?;
        let logger = LoggerRef {
            vtable: LOGGER_SLOT.get()?,
            handle: logger,
        };
        Ok(rust_future_new(lookup_via_logger(logger, key)))
    })
}

// Future entry points for `u32`, wrapped so tests can watch the poll protocol.

pub static POLLS: AtomicUsize = AtomicUsize::new(0);
pub static POLL_KEYS: Mutex<Vec<u64>> = Mutex::new(Vec::new());
pub static COMPLETES: AtomicUsize = AtomicUsize::new(0);
pub static CANCELS: AtomicUsize = AtomicUsize::new(0);
pub static FUTURE_FREES: AtomicUsize = AtomicUsize::new(0);

pub fn reset_future_counters() {
    POLLS.store(0, Ordering::SeqCst);
    COMPLETES.store(0, Ordering::SeqCst);
    CANCELS.store(0, Ordering::SeqCst);
    FUTURE_FREES.store(0, Ordering::SeqCst);
    POLL_KEYS.lock().unwrap_or_else(PoisonError::into_inner).clear();
}

pub fn poll_keys() -> Vec<u64> {
    POLL_KEYS.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

extern "C" fn counted_poll_u32(handle: u64, callback: ContinuationCallback, data: u64) {
    POLLS.fetch_add(1, Ordering::SeqCst);
    POLL_KEYS.lock().unwrap_or_else(PoisonError::into_inner).push(data);
    uniwire_rust_future_poll_u32(handle, callback, data)
}

extern "C" fn counted_cancel_u32(handle: u64) {
    CANCELS.fetch_add(1, Ordering::SeqCst);
    uniwire_rust_future_cancel_u32(handle)
}

extern "C" fn counted_complete_u32(handle: u64, status: &mut CallStatus) -> u32 {
    COMPLETES.fetch_add(1, Ordering::SeqCst);
    uniwire_rust_future_complete_u32(handle, status)
}

extern "C" fn counted_free_u32(handle: u64) {
    FUTURE_FREES.fetch_add(1, Ordering::SeqCst);
    uniwire_rust_future_free_u32(handle)
}

/// The in-process symbol table of the demo library.
pub fn demo_symbols() -> StaticSymbols {
    let symbols = StaticSymbols::new(NAMESPACE)
        .with("uniwire_contract_version", uniwire_contract_version as *const c_void)
        .with("uniwire_rustbuffer_alloc", counted_alloc as *const c_void)
        .with("uniwire_rustbuffer_from_bytes", counted_from_bytes as *const c_void)
        .with("uniwire_rustbuffer_free", counted_free as *const c_void)
        .with("uniwire_rustbuffer_reserve", counted_reserve as *const c_void)
        .with("uniwire_demo_fn_func_greet", native_greet as *const c_void)
        .with("uniwire_demo_fn_func_divide", native_divide as *const c_void)
        .with("uniwire_demo_fn_func_explode", native_explode as *const c_void)
        .with("uniwire_demo_fn_func_add_slowly", native_add_slowly as *const c_void)
        .with("uniwire_demo_fn_func_wait_forever", native_wait_forever as *const c_void)
        .with("uniwire_demo_fn_func_shout", native_shout as *const c_void)
        .with("uniwire_demo_fn_func_lookup", native_lookup as *const c_void)
        .with("uniwire_demo_fn_constructor_counter_new", native_counter_new as *const c_void)
        .with("uniwire_demo_fn_method_counter_incr", native_counter_incr as *const c_void)
        .with("uniwire_demo_fn_clone_counter", native_counter_clone as *const c_void)
        .with("uniwire_demo_fn_free_counter", native_counter_free as *const c_void)
        .with(
            "uniwire_demo_fn_init_callback_vtable_logger",
            native_init_logger_vtable as *const c_void,
        )
        .with("uniwire_rust_future_poll_u32", counted_poll_u32 as *const c_void)
        .with("uniwire_rust_future_cancel_u32", counted_cancel_u32 as *const c_void)
        .with("uniwire_rust_future_complete_u32", counted_complete_u32 as *const c_void)
        .with("uniwire_rust_future_free_u32", counted_free_u32 as *const c_void)
        .with(
            "uniwire_rust_future_poll_rust_buffer",
            uniwire_rust_future_poll_rust_buffer as *const c_void,
        )
        .with(
            "uniwire_rust_future_cancel_rust_buffer",
            uniwire_rust_future_cancel_rust_buffer as *const c_void,
        )
        .with(
            "uniwire_rust_future_complete_rust_buffer",
            uniwire_rust_future_complete_rust_buffer as *const c_void,
        )
        .with(
            "uniwire_rust_future_free_rust_buffer",
            uniwire_rust_future_free_rust_buffer as *const c_void,
        );
    checksum_symbols(symbols)
}

// ---------------------------------------------------------------------------
// Host half
// ---------------------------------------------------------------------------

pub fn demo_config() -> RuntimeConfig {
    RuntimeConfig::new().with_cleaner(CleanerKind::Inline)
}

static DEMO: ComponentCell = ComponentCell::new();

pub fn component() -> &'static Component {
    DEMO.get_or_load(|| {
        let component = Component::load(demo_symbols(), &contract(), &demo_config())?;
        unsafe { register_vtable(&component, "Logger", &HOST_LOGGER_VTABLE) }?;
        Ok(component)
    })
    .expect("demo component")
}

fn buffers() -> &'static BufferOps {
    component().buffers()
}

pub fn greet(who: &str) -> Result<String, Error> {
    let component = component();
    let func: unsafe extern "C" fn(RustBuffer, &mut CallStatus) -> RustBuffer =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "greet")) }?;
    let arg = String::lower(who.to_string(), buffers())?;
    let raw = rust_call(buffers(), |status| unsafe { func(arg, status) })?;
    String::try_lift(raw, buffers())
}

pub fn divide(a: i32, b: i32) -> Result<i32, CallError<MathError>> {
    let component = component();
    let func: unsafe extern "C" fn(i32, i32, &mut CallStatus) -> i32 =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "divide")) }?;
    rust_call_with_error::<MathError, _, _>(buffers(), |status| unsafe { func(a, b, status) })
}

pub fn explode() -> Result<(), Error> {
    let component = component();
    let func: unsafe extern "C" fn(&mut CallStatus) =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "explode")) }?;
    rust_call(buffers(), |status| unsafe { func(status) })
}

fn counter_vtable() -> Result<Arc<ObjectVTable>, Error> {
    static VTABLE: OnceLock<Arc<ObjectVTable>> = OnceLock::new();
    if let Some(vtable) = VTABLE.get() {
        return Ok(Arc::clone(vtable));
    }
    let vtable = ObjectVTable::resolve(component(), "Counter")?;
    Ok(Arc::clone(VTABLE.get_or_init(|| vtable)))
}

uniwire::wire_object!(pub struct Counter, vtable = counter_vtable());

impl Counter {
    pub fn new(start: u64) -> Result<Self, Error> {
        let component = component();
        let ctor: unsafe extern "C" fn(u64, &mut CallStatus) -> u64 =
            unsafe { component.symbol(&constructor_symbol(NAMESPACE, "Counter", "new")) }?;
        let raw = rust_call(buffers(), |status| unsafe { ctor(start, status) })?;
        Self::try_lift(raw, buffers())
    }

    pub fn incr(&self) -> Result<u64, Error> {
        let component = component();
        let method: unsafe extern "C" fn(u64, &mut CallStatus) -> u64 =
            unsafe { component.symbol(&method_symbol(NAMESPACE, "Counter", "incr")) }?;
        self.object()
            .call_with_handle(|handle| {
                rust_call(buffers(), |status| unsafe { method(handle.into_raw(), status) })
            })
    }
}

pub async fn add_slowly(a: u32, b: u32, steps: u32) -> Result<u32, Error> {
    let component = component();
    let func: unsafe extern "C" fn(u32, u32, u32, &mut CallStatus) -> u64 =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "add_slowly")) }?;
    let entry = AsyncEntryPoints::<u32>::resolve(component, "u32")?;
    rust_call_async_infallible(
        buffers(),
        |status| unsafe { func(a, b, steps, status) },
        entry,
        Ok,
    )
    .await
}

pub async fn wait_forever() -> Result<u32, Error> {
    let component = component();
    let func: unsafe extern "C" fn(&mut CallStatus) -> u64 =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "wait_forever")) }?;
    let entry = AsyncEntryPoints::<u32>::resolve(component, "u32")?;
    rust_call_async_infallible(buffers(), |status| unsafe { func(status) }, entry, Ok).await
}

pub trait Logger: Send + Sync {
    fn log(&self, line: String) -> Result<(), String>;

    fn lookup(&self, key: String) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>>;
}

pub static LOGGERS: CallbackRegistry<dyn Logger> = CallbackRegistry::new();

extern "C" fn host_log(handle: u64, line: RustBuffer, status: &mut CallStatus) {
    let ops = *buffers();
    handle_callback(status, &ops, || {
        let logger = LOGGERS.get(handle)?;
        let line = String::try_lift(line, &ops)?;
        match logger.log(line) {
            Ok(()) => Ok(()),
            Err(message) => Err(LoweredError::Expected(String::lower(message, &ops)?)),
        }
    })
}

extern "C" fn noop_free(_handle: u64) {}

fn report_now(
    ops: &BufferOps,
    complete: ForeignFutureComplete<RustBuffer>,
    callback_data: u64,
    err: Error,
) -> ForeignFuture {
    let mut call_status = CallStatus::new();
    LoweredError::from(err).write_with(&mut call_status, ops);
    complete(
        callback_data,
        ForeignFutureResult {
            return_value: RustBuffer::new(),
            call_status,
        },
    );
    ForeignFuture {
        handle: 0,
        free: noop_free,
    }
}

extern "C" fn host_lookup(
    handle: u64,
    key: RustBuffer,
    complete: ForeignFutureComplete<RustBuffer>,
    callback_data: u64,
) -> ForeignFuture {
    let ops = *buffers();
    let prepared = LOGGERS
        .get(handle)
        .and_then(|logger| Ok((logger, String::try_lift(key, &ops)?)));
    let (logger, key) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return report_now(&ops, complete, callback_data, err),
    };
    let spawned = spawn_foreign_future(ops, complete, callback_data, async move {
        let outcome = logger.lookup(key).await;
        lower_result_with::<String, String>(&ops, outcome)
    });
    match spawned {
        Ok(future) => future,
        Err(err) => report_now(&ops, complete, callback_data, err),
    }
}

extern "C" fn host_free(handle: u64) {
    LOGGERS.remove(handle);
}

static HOST_LOGGER_VTABLE: LoggerVTable = LoggerVTable {
    log: host_log,
    lookup: host_lookup,
    free: host_free,
};

pub fn shout(logger: Arc<dyn Logger>, line: &str) -> Result<(), CallError<String>> {
    let component = component();
    let func: unsafe extern "C" fn(u64, RustBuffer, &mut CallStatus) =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "shout")) }?;
    let arg = String::lower(line.to_string(), buffers())?;
    let handle = LOGGERS.insert(logger);
    rust_call_with_error::<String, _, _>(buffers(), |status| unsafe { func(handle, arg, status) })
}

pub async fn lookup(logger: Arc<dyn Logger>, key: &str) -> Result<String, CallError<String>> {
    let component = component();
    let func: unsafe extern "C" fn(u64, RustBuffer, &mut CallStatus) -> u64 =
        unsafe { component.symbol(&function_symbol(NAMESPACE, "lookup")) }?;
    let entry = AsyncEntryPoints::<RustBuffer>::resolve(component, "rust_buffer")?;
    let arg = String::lower(key.to_string(), buffers())?;
    let handle = LOGGERS.insert(logger);
    rust_call_async(
        buffers(),
        |status| unsafe { func(handle, arg, status) },
        entry,
        |raw| String::try_lift(raw, buffers()),
    )
    .await
}
