use std::path::Path;

use fnv::FnvHashMap as HashMap;

use crate::cost_table::CostTable;
use crate::error::{Error, Result};
use crate::plugin::{NativePlugin, TunerPlugin};
use crate::{ClusterShape, CollectiveFunction, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct QueryKey {
    function: CollectiveFunction,
    message_size: usize,
    num_pipe_ops: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Initialized,
    Closed,
}

/// One initialized tuner session for a single cluster shape.
///
/// Queries are pure for a given session, so every result is cached until
/// [`TunerBinding::close`]. The plugin's `destroy` runs exactly once, either
/// from `close` or on drop.
pub struct TunerBinding<P: TunerPlugin = NativePlugin> {
    shape: ClusterShape,
    plugin: P,
    state: SessionState,
    cache: HashMap<QueryKey, QueryResult>,
}

impl TunerBinding<NativePlugin> {
    /// Loads the plugin at `path` and initializes it for `shape`.
    pub fn open<A: AsRef<Path>>(path: A, shape: ClusterShape) -> Result<Self> {
        let plugin = NativePlugin::load(path)?;
        Self::with_plugin(plugin, shape)
    }
}

impl<P: TunerPlugin> TunerBinding<P> {
    pub fn with_plugin(mut plugin: P, shape: ClusterShape) -> Result<Self> {
        log::debug!("initializing tuner '{}' for {}", plugin.name(), shape);
        plugin
            .init(shape.total_ranks(), shape.node_count())
            .map_err(Error::PluginInit)?;

        Ok(TunerBinding {
            shape,
            plugin,
            state: SessionState::Initialized,
            cache: Default::default(),
        })
    }

    #[inline]
    pub fn shape(&self) -> ClusterShape {
        self.shape
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Number of distinct queries answered so far in this session.
    #[inline]
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    pub fn query_decision(
        &mut self,
        function: CollectiveFunction,
        message_size: usize,
    ) -> Result<QueryResult> {
        self.query_decision_with(function, message_size, 1)
    }

    pub fn query_decision_with(
        &mut self,
        function: CollectiveFunction,
        message_size: usize,
        num_pipe_ops: i32,
    ) -> Result<QueryResult> {
        if self.state != SessionState::Initialized {
            return Err(Error::NotInitialized);
        }

        let key = QueryKey {
            function,
            message_size,
            num_pipe_ops,
        };
        if let Some(result) = self.cache.get(&key) {
            return Ok(*result);
        }

        let mut cost_table = CostTable::new();
        let channels = self
            .plugin
            .get_coll_info(function, message_size, num_pipe_ops, &mut cost_table)
            .map_err(|code| Error::PluginQuery {
                function,
                message_size,
                code,
            })?;

        let extraction = cost_table.extract();
        if extraction.touched > 1 {
            log::warn!(
                "{} at {} bytes: plugin changed {} cost cells, keeping the last one ({})",
                function,
                message_size,
                extraction.touched,
                extraction.decision
            );
        }

        let result = QueryResult {
            decision: extraction.decision,
            channels,
        };
        log::trace!("{} {} bytes -> {:?}", function, message_size, result);
        self.cache.insert(key, result);
        Ok(result)
    }

    /// Destroys the plugin context. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.cache.clear();
        log::debug!("destroying tuner session for {}", self.shape);
        self.plugin.destroy().map_err(Error::PluginDestroy)
    }
}

impl<P: TunerPlugin> Drop for TunerBinding<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("closing tuner session for {}: {}", self.shape, e);
        }
    }
}
