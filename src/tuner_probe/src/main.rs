use anyhow::Context;
use structopt::StructOpt;

use tuner_probe::argument::Opt;
use tuner_probe::config::{read_config, ErrorPolicy, SweepConfig};
use tuner_probe::report::{analyze_shape, AnalysisOptions, CsvSink, Report};
use tuner_probe::{ClusterShape, Error, TunerBinding};

fn main() -> anyhow::Result<()> {
    logging::init_log();

    let opt = Opt::from_args();
    log::info!("Opts: {:#?}", opt);

    let mut config: SweepConfig = if let Some(path) = &opt.config {
        log::info!("parsing sweep configuration from file: {:?}", path);
        read_config(path)?
    } else {
        SweepConfig::default()
    };
    opt.apply_to(&mut config);
    config.validate()?;
    log::debug!("config: {:#?}", config);

    config.apply_environment();

    let options = AnalysisOptions {
        collectives: config.collectives(),
        min_size: config.min_size,
        max_size: config.max_size,
        num_pipe_ops: config.num_pipe_ops,
        on_error: config.on_error,
    };

    let mut sink = match &config.output {
        Some(path) => Some(CsvSink::create(path)?),
        None => None,
    };

    let shapes = config.shapes()?;
    let mut failed = 0;
    for (i, shape) in shapes.iter().enumerate() {
        log::info!("[{}/{}] analyzing {}", i + 1, shapes.len(), shape);
        match run_shape(&opt, *shape, &options) {
            Ok(report) => {
                println!("{}\n", report);
                if let Some(sink) = sink.as_mut() {
                    sink.write_report(&report)?;
                }
            }
            Err(e) if config.on_error == ErrorPolicy::Skip => {
                log::warn!("skipping {}: {}", shape, e);
                failed += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("analyzing {}", shape)),
        }
    }

    if failed > 0 {
        log::warn!("{} of {} cluster shapes failed", failed, shapes.len());
    }
    Ok(())
}

fn run_shape(
    opt: &Opt,
    shape: ClusterShape,
    options: &AnalysisOptions,
) -> Result<Report, Error> {
    let mut binding = TunerBinding::open(&opt.library, shape)?;
    let report = analyze_shape(&mut binding, options);
    // the next shape may only load once this session is gone
    let closed = binding.close();
    let report = report?;
    closed?;
    Ok(report)
}
