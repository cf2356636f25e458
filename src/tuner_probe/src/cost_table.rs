use std::os::raw::c_float;

use crate::{Algorithm, Decision, Protocol};

/// Marker written into every cell before a query. The plugin knows nothing
/// about it; a cell that differs afterwards is one the plugin touched.
pub const COST_SENTINEL: c_float = 1337.0;

const NUM_ENTRIES: usize = Algorithm::COUNT * Protocol::COUNT;

/// `float[NCCL_NUM_ALGORITHMS][NCCL_NUM_PROTOCOLS]`, algorithm-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CostTable {
    costs: [c_float; NUM_ENTRIES],
}

impl Default for CostTable {
    fn default() -> Self {
        CostTable {
            costs: [COST_SENTINEL; NUM_ENTRIES],
        }
    }
}

/// Outcome of scanning a table after a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extraction {
    pub decision: Decision,
    /// Number of cells that no longer hold the sentinel.
    pub touched: usize,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn index(algo: Algorithm, proto: Protocol) -> usize {
        algo as usize * Protocol::COUNT + proto as usize
    }

    #[inline]
    pub fn get(&self, algo: Algorithm, proto: Protocol) -> c_float {
        self.costs[Self::index(algo, proto)]
    }

    #[inline]
    pub fn set(&mut self, algo: Algorithm, proto: Protocol, cost: c_float) {
        self.costs[Self::index(algo, proto)] = cost;
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut c_float {
        self.costs.as_mut_ptr()
    }

    /// Scans algorithm-major, protocol-minor. When several cells were
    /// touched the last one scanned wins.
    pub fn extract(&self) -> Extraction {
        let mut decision = Decision::Fallback;
        let mut touched = 0;
        for &algo in Algorithm::ALL.iter() {
            for &proto in Protocol::ALL.iter() {
                if self.get(algo, proto) != COST_SENTINEL {
                    decision = Decision::Selected(algo, proto);
                    touched += 1;
                }
            }
        }
        Extraction { decision, touched }
    }
}
