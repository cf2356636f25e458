//! `#[repr(C)]` mirror of the NCCL tuner plugin ABI (`ncclTuner_v3_t`).
//!
//! Only this module and [`crate::plugin`] deal with raw pointers; everything
//! else goes through [`crate::TunerPlugin`].

use std::os::raw::{c_char, c_float, c_int, c_ulong, c_void};

/// `ncclResult_t`, zero on success.
pub type NcclResult = c_int;

/// `ncclInvalidUsage`
pub const NCCL_INVALID_USAGE: NcclResult = 5;

/// Name of the exported function table.
pub const TUNER_PLUGIN_SYMBOL: &[u8] = b"ncclTunerPlugin_v3\0";

/// `ncclDebugLogger_t`.
///
/// The real type is variadic (`const char *fmt, ...`). The host side only
/// reads the fixed arguments, which is call-compatible on the SysV x86_64
/// and AAPCS64 Linux ABIs.
pub type NcclDebugLogger = unsafe extern "C" fn(
    level: c_int,
    flags: c_ulong,
    file: *const c_char,
    line: c_int,
    fmt: *const c_char,
);

pub type TunerInitFn = unsafe extern "C" fn(
    n_ranks: usize,
    n_nodes: usize,
    log_function: Option<NcclDebugLogger>,
    context: *mut *mut c_void,
) -> NcclResult;

pub type TunerGetCollInfoFn = unsafe extern "C" fn(
    context: *mut c_void,
    coll_type: c_int,
    n_bytes: usize,
    num_pipe_ops: c_int,
    coll_cost_table: *mut *mut c_float,
    num_algo: c_int,
    num_proto: c_int,
    n_channels: *mut c_int,
) -> NcclResult;

pub type TunerDestroyFn = unsafe extern "C" fn(context: *mut c_void) -> NcclResult;

/// `ncclTuner_v3_t`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NcclTunerV3 {
    pub name: *const c_char,
    pub init: Option<TunerInitFn>,
    pub get_coll_info: Option<TunerGetCollInfoFn>,
    pub destroy: Option<TunerDestroyFn>,
}

/// `ncclDebugLogLevel`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugLogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl DebugLogLevel {
    pub fn from_raw(level: c_int) -> Option<Self> {
        use DebugLogLevel::*;
        match level {
            0 => Some(None),
            1 => Some(Error),
            2 => Some(Warn),
            3 => Some(Info),
            4 => Some(Debug),
            5 => Some(Trace),
            _ => Option::None,
        }
    }

    /// The host level a plugin record is emitted at. `None` means drop it.
    /// Unknown plugin levels go to the most verbose host level.
    pub fn host_level(level: c_int) -> Option<log::Level> {
        match Self::from_raw(level) {
            Some(DebugLogLevel::None) => Option::None,
            Some(DebugLogLevel::Error) => Some(log::Level::Error),
            Some(DebugLogLevel::Warn) => Some(log::Level::Warn),
            Some(DebugLogLevel::Info) => Some(log::Level::Info),
            Some(DebugLogLevel::Debug) => Some(log::Level::Debug),
            Some(DebugLogLevel::Trace) | Option::None => Some(log::Level::Trace),
        }
    }
}
