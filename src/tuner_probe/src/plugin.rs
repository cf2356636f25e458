//! The tuner plugin seen as a decision oracle.
//!
//! [`TunerPlugin`] is the seam between typed code and the foreign function
//! table. [`NativePlugin`] implements it on top of a dynamically loaded
//! shared object; tests implement it directly.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_ulong, c_void};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::abi::{
    DebugLogLevel, NcclResult, NcclTunerV3, TunerDestroyFn, TunerGetCollInfoFn, TunerInitFn,
    NCCL_INVALID_USAGE, TUNER_PLUGIN_SYMBOL,
};
use crate::cost_table::CostTable;
use crate::error::{Error, Result};
use crate::{Algorithm, CollectiveFunction, Protocol};

/// Log target of records emitted by the plugin itself.
pub const PLUGIN_LOG_TARGET: &str = "tuner_plugin";

/// The three entry points of a tuner plugin. Errors carry the plugin's
/// non-zero status code.
pub trait TunerPlugin {
    fn name(&self) -> String;

    fn init(&mut self, nranks: usize, nnodes: usize) -> std::result::Result<(), i32>;

    /// Fills `cost_table` and returns the channel count.
    fn get_coll_info(
        &mut self,
        function: CollectiveFunction,
        nbytes: usize,
        num_pipe_ops: i32,
        cost_table: &mut CostTable,
    ) -> std::result::Result<i32, i32>;

    fn destroy(&mut self) -> std::result::Result<(), i32>;
}

impl<T: TunerPlugin + ?Sized> TunerPlugin for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn init(&mut self, nranks: usize, nnodes: usize) -> std::result::Result<(), i32> {
        (**self).init(nranks, nnodes)
    }

    fn get_coll_info(
        &mut self,
        function: CollectiveFunction,
        nbytes: usize,
        num_pipe_ops: i32,
        cost_table: &mut CostTable,
    ) -> std::result::Result<i32, i32> {
        (**self).get_coll_info(function, nbytes, num_pipe_ops, cost_table)
    }

    fn destroy(&mut self) -> std::result::Result<(), i32> {
        (**self).destroy()
    }
}

/// A tuner plugin living in a shared object.
///
/// Calls made out of order (`getCollInfo` before `init`, a second `init`)
/// never reach the plugin and fail with `ncclInvalidUsage`. An initialized
/// plugin is destroyed when dropped.
pub struct NativePlugin {
    path: PathBuf,
    name: String,
    init: TunerInitFn,
    get_coll_info: TunerGetCollInfoFn,
    destroy: TunerDestroyFn,
    context: *mut c_void,
    initialized: bool,
    // declared last so the function pointers above never outlive it
    _library: Library,
}

impl std::fmt::Debug for NativePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePlugin")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl NativePlugin {
    /// Opens `path` and resolves `ncclTunerPlugin_v3`. Does not call `init`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let load_error = |reason: String| Error::PluginLoad {
            path: path.clone(),
            reason,
        };

        log::debug!("opening tuner plugin: {:?}", path);
        let library = unsafe { Library::new(&path) }.map_err(|e| load_error(e.to_string()))?;

        let table: NcclTunerV3 = unsafe {
            let symbol: Symbol<*const NcclTunerV3> = library
                .get(TUNER_PLUGIN_SYMBOL)
                .map_err(|e| load_error(format!("ncclTunerPlugin_v3: {}", e)))?;
            let ptr: *const NcclTunerV3 = *symbol;
            if ptr.is_null() {
                return Err(load_error("ncclTunerPlugin_v3 is null".to_owned()));
            }
            *ptr
        };

        let (init, get_coll_info, destroy) = match (table.init, table.get_coll_info, table.destroy)
        {
            (Some(init), Some(get_coll_info), Some(destroy)) => (init, get_coll_info, destroy),
            _ => {
                return Err(load_error(
                    "ncclTunerPlugin_v3 has a null entry point".to_owned(),
                ))
            }
        };

        let name = if table.name.is_null() {
            String::from("<unnamed>")
        } else {
            unsafe { CStr::from_ptr(table.name) }
                .to_string_lossy()
                .into_owned()
        };
        log::info!("loaded tuner plugin '{}' from {:?}", name, path);

        Ok(NativePlugin {
            path,
            name,
            init,
            get_coll_info,
            destroy,
            context: std::ptr::null_mut(),
            initialized: false,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Drop for NativePlugin {
    fn drop(&mut self) {
        if let Err(code) = TunerPlugin::destroy(self) {
            log::warn!(
                "tuner plugin '{}' destroy failed on drop: status {}",
                self.name,
                code
            );
        }
    }
}

#[inline]
fn check(status: NcclResult) -> std::result::Result<(), i32> {
    if status == 0 {
        Ok(())
    } else {
        Err(status)
    }
}

impl TunerPlugin for NativePlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn init(&mut self, nranks: usize, nnodes: usize) -> std::result::Result<(), i32> {
        if self.initialized {
            log::error!("tuner plugin '{}' is already initialized", self.name);
            return Err(NCCL_INVALID_USAGE);
        }
        let mut context: *mut c_void = std::ptr::null_mut();
        let status = unsafe { (self.init)(nranks, nnodes, Some(plugin_logger), &mut context) };
        check(status)?;
        self.context = context;
        self.initialized = true;
        Ok(())
    }

    fn get_coll_info(
        &mut self,
        function: CollectiveFunction,
        nbytes: usize,
        num_pipe_ops: i32,
        cost_table: &mut CostTable,
    ) -> std::result::Result<i32, i32> {
        if !self.initialized {
            log::error!("getCollInfo on tuner plugin '{}' before init", self.name);
            return Err(NCCL_INVALID_USAGE);
        }
        let mut nchannels: c_int = 0;
        let status = unsafe {
            (self.get_coll_info)(
                self.context,
                function.code(),
                nbytes,
                num_pipe_ops,
                cost_table.as_mut_ptr() as *mut *mut f32,
                Algorithm::COUNT as c_int,
                Protocol::COUNT as c_int,
                &mut nchannels,
            )
        };
        check(status)?;
        Ok(nchannels)
    }

    fn destroy(&mut self) -> std::result::Result<(), i32> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        let context = std::mem::replace(&mut self.context, std::ptr::null_mut());
        check(unsafe { (self.destroy)(context) })
    }
}

/// Receives the plugin's log records and forwards them to the `log` facade.
///
/// Called synchronously from inside plugin calls on the calling thread.
unsafe extern "C" fn plugin_logger(
    level: c_int,
    _flags: c_ulong,
    file: *const c_char,
    line: c_int,
    fmt: *const c_char,
) {
    match DebugLogLevel::host_level(level) {
        Some(l) if l <= log::max_level() => {}
        _ => return,
    }

    // must not unwind into the plugin
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        forward_record(log::logger(), level, lossy(file), line, lossy(fmt));
    }));
}

/// Emits one plugin record on `logger`, keeping the plugin's source location.
fn forward_record(
    logger: &dyn log::Log,
    level: c_int,
    file: String,
    line: c_int,
    message: String,
) {
    let host_level = match DebugLogLevel::host_level(level) {
        Some(l) => l,
        None => return,
    };
    let metadata = log::Metadata::builder()
        .level(host_level)
        .target(PLUGIN_LOG_TARGET)
        .build();
    if !logger.enabled(&metadata) {
        return;
    }

    let file = if file.is_empty() { None } else { Some(file.as_str()) };
    let line = if line > 0 { Some(line as u32) } else { None };
    logger.log(
        &log::Record::builder()
            .metadata(metadata)
            .args(format_args!("{}", message.trim_end()))
            .file(file)
            .line(line)
            .module_path(None)
            .build(),
    );
}

unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
