//! A small tuner plugin exporting `ncclTunerPlugin_v3`, built as a shared
//! object so the host can be driven through a real `dlopen`.
//!
//! AllReduce picks Tree/LL below [`BOUNDARY`] bytes and Ring/Simple from it
//! on. Every other collective is left to the fallback. `init` rejects more
//! than [`MAX_NODES`] nodes, and `getCollInfo` rejects `numPipeOps < 1`.
//! The `test_tuner_*_calls` functions expose call counters.
#![allow(non_upper_case_globals)]

use std::os::raw::{c_char, c_float, c_int, c_ulong, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BOUNDARY: usize = 65536;
pub const MAX_NODES: usize = 1024;

pub const SMALL_CHANNELS: c_int = 4;
pub const LARGE_CHANNELS: c_int = 16;

pub const NCCL_SUCCESS: c_int = 0;
pub const NCCL_INVALID_ARGUMENT: c_int = 4;
pub const NCCL_INVALID_USAGE: c_int = 5;

const NCCL_LOG_WARN: c_int = 2;
const NCCL_LOG_INFO: c_int = 3;
const NCCL_ALL: c_ulong = !0;

const ALL_REDUCE: c_int = 4;
const NUM_PROTOCOLS: usize = 3;
const TREE: usize = 0;
const RING: usize = 1;
const LL: usize = 0;
const SIMPLE: usize = 2;

const CONTEXT_MAGIC: u64 = 0x7475_6e65_725f_7633;

type DebugLogger = unsafe extern "C" fn(
    level: c_int,
    flags: c_ulong,
    file: *const c_char,
    line: c_int,
    fmt: *const c_char,
    ...
);

#[repr(C)]
pub struct TunerV3 {
    name: *const c_char,
    init: unsafe extern "C" fn(usize, usize, Option<DebugLogger>, *mut *mut c_void) -> c_int,
    get_coll_info: unsafe extern "C" fn(
        *mut c_void,
        c_int,
        usize,
        c_int,
        *mut *mut c_float,
        c_int,
        c_int,
        *mut c_int,
    ) -> c_int,
    destroy: unsafe extern "C" fn(*mut c_void) -> c_int,
}

// only read by the host, never mutated
unsafe impl Sync for TunerV3 {}

#[no_mangle]
pub static ncclTunerPlugin_v3: TunerV3 = TunerV3 {
    name: b"test_tuner\0".as_ptr() as *const c_char,
    init: tuner_init,
    get_coll_info: tuner_get_coll_info,
    destroy: tuner_destroy,
};

static INIT_CALLS: AtomicUsize = AtomicUsize::new(0);
static QUERY_CALLS: AtomicUsize = AtomicUsize::new(0);
static DESTROY_CALLS: AtomicUsize = AtomicUsize::new(0);

#[no_mangle]
pub extern "C" fn test_tuner_init_calls() -> usize {
    INIT_CALLS.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn test_tuner_query_calls() -> usize {
    QUERY_CALLS.load(Ordering::SeqCst)
}

#[no_mangle]
pub extern "C" fn test_tuner_destroy_calls() -> usize {
    DESTROY_CALLS.load(Ordering::SeqCst)
}

struct Context {
    magic: u64,
    nranks: usize,
    nnodes: usize,
}

unsafe fn log_line(
    logger: Option<DebugLogger>,
    level: c_int,
    line: u32,
    fmt: &[u8],
    value: usize,
) {
    if let Some(logger) = logger {
        logger(
            level,
            NCCL_ALL,
            concat!(file!(), "\0").as_ptr() as *const c_char,
            line as c_int,
            fmt.as_ptr() as *const c_char,
            value,
        );
    }
}

unsafe extern "C" fn tuner_init(
    n_ranks: usize,
    n_nodes: usize,
    log_function: Option<DebugLogger>,
    context: *mut *mut c_void,
) -> c_int {
    INIT_CALLS.fetch_add(1, Ordering::SeqCst);
    if context.is_null() {
        return NCCL_INVALID_ARGUMENT;
    }
    if n_nodes > MAX_NODES {
        log_line(
            log_function,
            NCCL_LOG_WARN,
            line!(),
            b"test_tuner: %zu nodes is too many\0",
            n_nodes,
        );
        return NCCL_INVALID_ARGUMENT;
    }

    let ctx = Box::new(Context {
        magic: CONTEXT_MAGIC,
        nranks: n_ranks,
        nnodes: n_nodes,
    });
    *context = Box::into_raw(ctx) as *mut c_void;
    log_line(
        log_function,
        NCCL_LOG_INFO,
        line!(),
        b"test_tuner: initialized for %zu ranks\0",
        n_ranks,
    );
    NCCL_SUCCESS
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn tuner_get_coll_info(
    context: *mut c_void,
    coll_type: c_int,
    n_bytes: usize,
    num_pipe_ops: c_int,
    coll_cost_table: *mut *mut c_float,
    num_algo: c_int,
    num_proto: c_int,
    n_channels: *mut c_int,
) -> c_int {
    QUERY_CALLS.fetch_add(1, Ordering::SeqCst);
    let ctx = context as *const Context;
    if ctx.is_null() || (*ctx).magic != CONTEXT_MAGIC {
        return NCCL_INVALID_USAGE;
    }
    if (*ctx).nranks < (*ctx).nnodes {
        return NCCL_INVALID_USAGE;
    }
    if coll_cost_table.is_null() || n_channels.is_null() {
        return NCCL_INVALID_ARGUMENT;
    }
    if num_proto as usize != NUM_PROTOCOLS || num_algo as usize <= RING || num_pipe_ops < 1 {
        return NCCL_INVALID_ARGUMENT;
    }

    // the host passes a flat float[numAlgo][numProto]
    let table = coll_cost_table as *mut c_float;
    if coll_type == ALL_REDUCE {
        if n_bytes < BOUNDARY {
            *table.add(TREE * NUM_PROTOCOLS + LL) = 0.0;
            *n_channels = SMALL_CHANNELS;
        } else {
            *table.add(RING * NUM_PROTOCOLS + SIMPLE) = 0.0;
            *n_channels = LARGE_CHANNELS;
        }
    }
    NCCL_SUCCESS
}

unsafe extern "C" fn tuner_destroy(context: *mut c_void) -> c_int {
    let ctx = context as *mut Context;
    if ctx.is_null() || (*ctx).magic != CONTEXT_MAGIC {
        return NCCL_INVALID_USAGE;
    }
    drop(Box::from_raw(ctx));
    DESTROY_CALLS.fetch_add(1, Ordering::SeqCst);
    NCCL_SUCCESS
}
