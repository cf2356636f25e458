use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{ClusterShape, CollectiveFunction};

/// Read by the OFI tuner to pick its platform model.
pub const PRODUCT_NAME_ENV: &str = "OFI_NCCL_FORCE_PRODUCT_NAME";

pub const DEFAULT_PRODUCT_NAME: &str = "p5en.48xlarge";

/// What to do when one shape or one collective fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Stop the whole sweep at the first failure.
    Abort,
    /// Log the failure and move on to the next collective or shape.
    Skip,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Abort
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SweepConfig {
    /// Ranks per node, crossed with every entry of `node_counts`
    pub ranks_per_node: Vec<usize>,

    /// Node counts of the swept clusters
    pub node_counts: Vec<usize>,

    /// Smallest message size, in bytes
    pub min_size: usize,

    /// Largest message size, in bytes
    pub max_size: usize,

    /// numPipeOps passed to getCollInfo
    pub num_pipe_ops: i32,

    /// Platform the tuner should assume, e.g. "p5en.48xlarge"
    pub product_name: String,

    /// Collectives to analyze; all of them when absent
    pub collectives: Option<Vec<CollectiveFunction>>,

    pub on_error: ErrorPolicy,

    /// Write every row of the report to this CSV file as well
    pub output: Option<PathBuf>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            ranks_per_node: vec![1, 2, 4, 8],
            node_counts: (1..=11).map(|i| 1 << i).collect(),
            min_size: 32,
            max_size: 32 * 1024 * 1024 * 1024,
            num_pipe_ops: 1,
            product_name: DEFAULT_PRODUCT_NAME.to_owned(),
            collectives: None,
            on_error: ErrorPolicy::Abort,
            output: None,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ranks_per_node.is_empty() || self.node_counts.is_empty() {
            return Err(Error::Config("no cluster shape to sweep".to_owned()));
        }
        if self.min_size == 0 || self.max_size < self.min_size {
            return Err(Error::InvalidRange(self.min_size, self.max_size));
        }
        if self.num_pipe_ops < 1 {
            return Err(Error::Config(format!(
                "num_pipe_ops must be positive, got {}",
                self.num_pipe_ops
            )));
        }
        if self.product_name.trim().is_empty() {
            return Err(Error::Config("product_name must not be empty".to_owned()));
        }
        if let Some(collectives) = &self.collectives {
            if collectives.is_empty() {
                return Err(Error::Config("collectives must not be empty".to_owned()));
            }
            for (i, function) in collectives.iter().enumerate() {
                if collectives[..i].contains(function) {
                    return Err(Error::Config(format!(
                        "collective {:?} is listed more than once",
                        function
                    )));
                }
            }
        }
        self.shapes().map(|_| ())
    }

    /// Every (ranks per node, node count) pair, ranks per node outermost.
    pub fn shapes(&self) -> Result<Vec<ClusterShape>> {
        let mut shapes = Vec::with_capacity(self.ranks_per_node.len() * self.node_counts.len());
        for &rpn in &self.ranks_per_node {
            for &nodes in &self.node_counts {
                shapes.push(ClusterShape::new(rpn, nodes)?);
            }
        }
        Ok(shapes)
    }

    pub fn collectives(&self) -> Vec<CollectiveFunction> {
        match &self.collectives {
            Some(c) => c.clone(),
            None => CollectiveFunction::ALL.to_vec(),
        }
    }

    /// Exports the product name for the plugin. Must happen before any
    /// plugin is opened.
    pub fn apply_environment(&self) {
        log::info!("{}={}", PRODUCT_NAME_ENV, self.product_name);
        std::env::set_var(PRODUCT_NAME_ENV, &self.product_name);
    }
}

pub fn read_config<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("parse {:?} failed: {}", path.as_ref(), e)))
}
