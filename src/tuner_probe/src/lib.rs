use serde::{Deserialize, Serialize};

pub mod abi;
pub mod argument;
pub mod binding;
pub mod config;
pub mod cost_table;
pub mod error;
pub mod plugin;
pub mod report;
pub mod search;

pub use binding::TunerBinding;
pub use error::{Error, Result};
pub use plugin::{NativePlugin, TunerPlugin};

/// The cluster a tuner session is initialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterShape {
    ranks_per_node: usize,
    node_count: usize,
}

impl ClusterShape {
    pub fn new(ranks_per_node: usize, node_count: usize) -> Result<Self> {
        if ranks_per_node == 0 || node_count == 0 {
            return Err(Error::InvalidShape(ranks_per_node, node_count));
        }
        Ok(ClusterShape {
            ranks_per_node,
            node_count,
        })
    }

    #[inline]
    pub fn ranks_per_node(&self) -> usize {
        self.ranks_per_node
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn total_ranks(&self) -> usize {
        self.ranks_per_node * self.node_count
    }
}

impl std::fmt::Display for ClusterShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ranks ({} per node x {} nodes)",
            self.total_ranks(),
            self.ranks_per_node,
            self.node_count
        )
    }
}

/// Collective operations, numbered as the tuner ABI's `ncclFunc_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum CollectiveFunction {
    Broadcast = 0,
    Reduce = 1,
    AllGather = 2,
    ReduceScatter = 3,
    AllReduce = 4,
    SendRecv = 5,
    Send = 6,
    Recv = 7,
}

impl CollectiveFunction {
    pub const ALL: [CollectiveFunction; 8] = {
        use CollectiveFunction::*;
        [
            Broadcast,
            Reduce,
            AllGather,
            ReduceScatter,
            AllReduce,
            SendRecv,
            Send,
            Recv,
        ]
    };

    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for CollectiveFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Tree = 0,
    Ring = 1,
    CollnetDirect = 2,
    CollnetChain = 3,
    Nvls = 4,
    NvlsTree = 5,
    Pat = 6,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = {
        use Algorithm::*;
        [
            Tree,
            Ring,
            CollnetDirect,
            CollnetChain,
            Nvls,
            NvlsTree,
            Pat,
        ]
    };

    pub const COUNT: usize = Self::ALL.len();
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Algorithm::*;
        let name = match self {
            Tree => "Tree",
            Ring => "Ring",
            CollnetDirect => "CollNetDirect",
            CollnetChain => "CollNetChain",
            Nvls => "NVLS",
            NvlsTree => "NVLSTree",
            Pat => "PAT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    LL = 0,
    LL128 = 1,
    Simple = 2,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::LL, Protocol::LL128, Protocol::Simple];

    pub const COUNT: usize = Self::ALL.len();
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// What the tuner chose for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The plugin left every cost untouched, so NCCL falls back to its own model.
    Fallback,
    Selected(Algorithm, Protocol),
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Fallback => f.write_str("fallback"),
            Decision::Selected(algo, proto) => write!(f, "{}/{}", algo, proto),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    pub decision: Decision,
    pub channels: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub message_size: usize,
    pub result: QueryResult,
}

impl Breakpoint {
    #[inline]
    pub fn new(message_size: usize, result: QueryResult) -> Self {
        Breakpoint {
            message_size,
            result,
        }
    }

    #[inline]
    pub fn decision(&self) -> Decision {
        self.result.decision
    }
}
