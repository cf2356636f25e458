use std::cell::Cell;
use std::rc::Rc;

use tuner_probe::config::ErrorPolicy;
use tuner_probe::cost_table::CostTable;
use tuner_probe::report::{analyze_message_range, analyze_shape, AnalysisOptions};
use tuner_probe::search::find_breakpoints;
use tuner_probe::{
    Algorithm, ClusterShape, CollectiveFunction, Decision, Error, Protocol, QueryResult,
    TunerBinding, TunerPlugin,
};

/// Selects (Ring, LL) below `boundary` and (Ring, Simple) from it on for
/// `stepping`; leaves every other collective to the fallback.
struct StepPlugin {
    stepping: CollectiveFunction,
    boundary: usize,
    failing: Option<CollectiveFunction>,
    calls: Rc<Cell<usize>>,
    destroyed: Rc<Cell<usize>>,
    shape_seen: Rc<Cell<(usize, usize)>>,
}

impl StepPlugin {
    fn new(stepping: CollectiveFunction, boundary: usize) -> Self {
        StepPlugin {
            stepping,
            boundary,
            failing: None,
            calls: Default::default(),
            destroyed: Default::default(),
            shape_seen: Default::default(),
        }
    }
}

impl TunerPlugin for StepPlugin {
    fn name(&self) -> String {
        "step".to_owned()
    }

    fn init(&mut self, nranks: usize, nnodes: usize) -> Result<(), i32> {
        self.shape_seen.set((nranks, nnodes));
        Ok(())
    }

    fn get_coll_info(
        &mut self,
        function: CollectiveFunction,
        nbytes: usize,
        _num_pipe_ops: i32,
        cost_table: &mut CostTable,
    ) -> Result<i32, i32> {
        self.calls.set(self.calls.get() + 1);
        if self.failing == Some(function) {
            return Err(2);
        }
        if function == self.stepping {
            let proto = if nbytes < self.boundary {
                Protocol::LL
            } else {
                Protocol::Simple
            };
            cost_table.set(Algorithm::Ring, proto, 0.0);
            return Ok(if nbytes < self.boundary { 2 } else { 16 });
        }
        Ok(0)
    }

    fn destroy(&mut self) -> Result<(), i32> {
        self.destroyed.set(self.destroyed.get() + 1);
        Ok(())
    }
}

fn shape() -> ClusterShape {
    ClusterShape::new(8, 4).unwrap()
}

#[test]
fn memoized_queries_hit_the_plugin_once() {
    logging::init_test_log();

    for &function in CollectiveFunction::ALL.iter() {
        let plugin = StepPlugin::new(CollectiveFunction::AllReduce, 65536);
        let calls = Rc::clone(&plugin.calls);
        let mut binding = TunerBinding::with_plugin(plugin, shape()).unwrap();

        let a = binding.query_decision(function, 123_456).unwrap();
        let b = binding.query_decision(function, 123_456).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.get(), 1);
    }
}

#[test]
fn init_receives_total_ranks_and_nodes() {
    let plugin = StepPlugin::new(CollectiveFunction::AllReduce, 65536);
    let seen = Rc::clone(&plugin.shape_seen);
    let _binding = TunerBinding::with_plugin(plugin, shape()).unwrap();
    assert_eq!(seen.get(), (32, 4));
}

#[test]
fn step_function_boundary_is_found() {
    logging::init_test_log();

    let boundary = 1024;
    let query = |size: usize| -> tuner_probe::Result<QueryResult> {
        Ok(QueryResult {
            decision: if size < boundary {
                Decision::Fallback
            } else {
                Decision::Selected(Algorithm::Ring, Protocol::Simple)
            },
            channels: 0,
        })
    };
    let points = find_breakpoints(1, 4096, query).unwrap();

    for w in points.windows(2) {
        assert_ne!(w[0].decision(), w[1].decision());
    }
    let crossing: Vec<_> = points
        .windows(2)
        .filter(|w| w[0].message_size < boundary && w[1].message_size >= boundary)
        .collect();
    assert_eq!(crossing.len(), 1);
    assert_eq!(crossing[0][1].message_size, boundary);
    assert_eq!(query(boundary - 1).unwrap().decision, Decision::Fallback);
}

#[test]
fn constant_plugin_yields_endpoints() {
    let plugin = StepPlugin::new(CollectiveFunction::AllReduce, 65536);
    let mut binding = TunerBinding::with_plugin(plugin, shape()).unwrap();

    for &(min, max) in &[(1usize, 2usize), (32, 4096), (7, 1 << 33)] {
        let rows =
            analyze_message_range(&mut binding, CollectiveFunction::Reduce, min, max, 1).unwrap();
        let sizes: Vec<_> = rows.iter().map(|r| r.message_size).collect();
        assert_eq!(sizes, vec![min, max]);
        assert!(rows.iter().all(|r| r.decision == Decision::Fallback));
    }
}

#[test]
fn open_nonexistent_library_fails() {
    logging::init_test_log();

    let result = TunerBinding::open("/nonexistent/libnccl-ofi-tuner.so", shape());
    assert!(matches!(result, Err(Error::PluginLoad { .. })));
}

#[test]
fn close_is_idempotent_and_final() {
    let plugin = StepPlugin::new(CollectiveFunction::AllReduce, 65536);
    let destroyed = Rc::clone(&plugin.destroyed);
    let mut binding = TunerBinding::with_plugin(plugin, shape()).unwrap();

    binding
        .query_decision(CollectiveFunction::AllReduce, 32)
        .unwrap();
    binding.close().unwrap();
    binding.close().unwrap();
    assert!(matches!(
        binding.query_decision(CollectiveFunction::AllReduce, 32),
        Err(Error::NotInitialized)
    ));
    drop(binding);
    assert_eq!(destroyed.get(), 1);
}

#[test]
fn allreduce_boundary_end_to_end() {
    logging::init_test_log();

    let boundary = 65536;
    let plugin = StepPlugin::new(CollectiveFunction::AllReduce, boundary);
    let mut binding = TunerBinding::with_plugin(plugin, shape()).unwrap();
    let options = AnalysisOptions {
        min_size: 32,
        max_size: 32 * 1024 * 1024 * 1024,
        ..Default::default()
    };

    let report = analyze_shape(&mut binding, &options).unwrap();
    assert!(report.skipped().is_empty());

    let transitions = report.transitions(CollectiveFunction::AllReduce);
    assert_eq!(transitions.len(), 1);
    let (before, after) = transitions[0];
    assert!(before.message_size < boundary && after.message_size >= boundary);
    assert_eq!(after.message_size, boundary);
    assert_eq!(
        before.decision,
        Decision::Selected(Algorithm::Ring, Protocol::LL)
    );
    assert_eq!(
        after.decision,
        Decision::Selected(Algorithm::Ring, Protocol::Simple)
    );
    assert_eq!(after.channels, 16);
    assert_eq!((after.ranks, after.nodes), (32, 4));

    for &function in CollectiveFunction::ALL.iter() {
        if function != CollectiveFunction::AllReduce {
            assert!(report.transitions(function).is_empty());
            assert_eq!(report.rows_for(function).count(), 2);
        }
    }
}

#[test]
fn query_errors_follow_the_policy() {
    let mut plugin = StepPlugin::new(CollectiveFunction::AllReduce, 65536);
    plugin.failing = Some(CollectiveFunction::AllGather);
    let mut binding = TunerBinding::with_plugin(plugin, shape()).unwrap();

    let abort = AnalysisOptions::default();
    match analyze_shape(&mut binding, &abort) {
        Err(Error::PluginQuery {
            function: CollectiveFunction::AllGather,
            code: 2,
            ..
        }) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("failing collective must abort the analysis"),
    }

    let skip = AnalysisOptions {
        on_error: ErrorPolicy::Skip,
        ..Default::default()
    };
    let report = analyze_shape(&mut binding, &skip).unwrap();
    assert_eq!(report.skipped(), &[CollectiveFunction::AllGather]);
    assert_eq!(report.rows_for(CollectiveFunction::AllGather).count(), 0);
    assert_eq!(report.transitions(CollectiveFunction::AllReduce).len(), 1);
}
