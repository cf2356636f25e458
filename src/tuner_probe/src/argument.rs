use std::path::PathBuf;

use structopt::StructOpt;

use crate::config::{ErrorPolicy, SweepConfig};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "show-tuner-decisions",
    about = "Print the algorithm/protocol boundaries chosen by an NCCL tuner plugin"
)]
pub struct Opt {
    /// Path to the tuner plugin shared object
    #[structopt(parse(from_os_str))]
    pub library: PathBuf,

    /// The configure file of the sweep
    #[structopt(short = "c", long = "config")]
    pub config: Option<PathBuf>,

    /// Platform name exported to the plugin
    #[structopt(long = "product-name")]
    pub product_name: Option<String>,

    /// Smallest message size in bytes
    #[structopt(long = "min-size")]
    pub min_size: Option<usize>,

    /// Largest message size in bytes
    #[structopt(long = "max-size")]
    pub max_size: Option<usize>,

    /// numPipeOps passed to the plugin
    #[structopt(long = "num-pipe-ops")]
    pub num_pipe_ops: Option<i32>,

    /// Keep going when a shape or a collective fails
    #[structopt(long = "skip-errors")]
    pub skip_errors: bool,

    /// Also write the report as CSV to this file
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    pub output: Option<PathBuf>,
}

impl Opt {
    /// Command-line values take precedence over the configure file.
    pub fn apply_to(&self, config: &mut SweepConfig) {
        if let Some(name) = &self.product_name {
            config.product_name = name.clone();
        }
        if let Some(min_size) = self.min_size {
            config.min_size = min_size;
        }
        if let Some(max_size) = self.max_size {
            config.max_size = max_size;
        }
        if let Some(num_pipe_ops) = self.num_pipe_ops {
            config.num_pipe_ops = num_pipe_ops;
        }
        if self.skip_errors {
            config.on_error = ErrorPolicy::Skip;
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let opt = Opt::from_iter(vec![
            "show-tuner-decisions",
            "/opt/lib/libnccl-ofi-tuner.so",
            "--max-size",
            "1048576",
            "--skip-errors",
            "-o",
            "out.csv",
        ]);
        assert_eq!(opt.library, PathBuf::from("/opt/lib/libnccl-ofi-tuner.so"));

        let mut config = SweepConfig::default();
        opt.apply_to(&mut config);
        assert_eq!(config.min_size, 32);
        assert_eq!(config.max_size, 1048576);
        assert_eq!(config.on_error, ErrorPolicy::Skip);
        assert_eq!(config.output, Some(PathBuf::from("out.csv")));
        assert_eq!(config.product_name, crate::config::DEFAULT_PRODUCT_NAME);
    }
}
