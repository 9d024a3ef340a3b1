//! End-to-end tests for the uberts engine.
//!
//! These exercise the full loop from schema registration through rule
//! matching, generation and commit, through the public API only.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uberts::config::UbertsConfig;
use uberts::engine::{StopReason, Uberts};
use uberts::error::{StateError, UbertsError};
use uberts::fact::Fact;
use uberts::node::Value;
use uberts::program::Program;
use uberts::rule::Match;
use uberts::schema::Schema;
use uberts::score::Adjoints;
use uberts::state::State;
use uberts::transition::RuleGenerator;

type Generated = uberts::error::UbertsResult<Vec<(Fact, Adjoints)>>;

/// A generator that counts its calls and proposes nothing.
fn counter(hits: &Arc<AtomicUsize>) -> impl Fn(&Match, &State, &Schema) -> Generated + Send + Sync + 'static {
    let hits = Arc::clone(hits);
    move |_m: &Match, _s: &State, _schema: &Schema| -> Generated {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn ints(u: &Uberts, relation: &str, values: &[i64]) -> Fact {
    let values: Vec<Value> = values.iter().map(|v| Value::Int(*v)).collect();
    u.fact(relation, &values).unwrap()
}

#[test]
fn join_fires_once_per_pairing() {
    let mut u = Uberts::new(UbertsConfig::default());
    u.define_relation("R1", &["n", "n"]).unwrap();
    u.define_relation("R2", &["n", "n"]).unwrap();
    u.define_relation("R3", &["n", "n", "n", "n"]).unwrap();
    let r = u.add_rule_text("R2(a, b) & R1(c, d) => R3(a, b, c, d)").unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    u.add_generator(r, counter(&hits)).unwrap();

    for i in 0..3 {
        let f = ints(&u, "R1", &[i, i + 10]);
        u.commit_initial_fact(f).unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let f = ints(&u, "R2", &[100, 101]);
    u.commit_initial_fact(f).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let f = ints(&u, "R2", &[200, 201]);
    u.commit_initial_fact(f).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 6);
}

#[test]
fn join_binds_distinct_variables() {
    let mut u = Uberts::new(UbertsConfig::default());
    u.define_relation("R1", &["n", "n"]).unwrap();
    u.define_relation("R2", &["n", "n"]).unwrap();
    u.define_relation("R3", &["n", "n", "n", "n"]).unwrap();
    let r = u.add_rule_text("R2(a, b) & R1(c, d) => R3(a, b, c, d)").unwrap();
    u.add_generator(r, RuleGenerator::constant("r3", 1.0)).unwrap();
    for f in [[1, 2], [3, 4]] {
        let f = ints(&u, "R1", &f);
        u.commit_initial_fact(f).unwrap();
    }
    let f = ints(&u, "R2", &[5, 6]);
    u.commit_initial_fact(f).unwrap();
    u.run().unwrap();
    let state = u.dump_state();
    assert!(state.contains("R3(5, 6, 1, 2)\n"));
    assert!(state.contains("R3(5, 6, 3, 4)\n"));
    assert_eq!(state.lines().filter(|l| l.starts_with("R3")).count(), 2);
}

#[test]
fn matching_happens_once_per_commit() {
    let mut u = Uberts::new(UbertsConfig::default());
    u.define_relation("word", &["i"]).unwrap();
    let r = u.add_rule_text("word(i)").unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    u.add_generator(r, counter(&hits)).unwrap();

    let f = ints(&u, "word", &[0]);
    u.commit_initial_fact(f.clone()).unwrap();
    let err = u.commit_initial_fact(f).unwrap_err();
    assert!(matches!(err, UbertsError::State(StateError::DuplicateFact { .. })));
    u.run().unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn duplicate_candidates_are_dropped() {
    let mut u = Uberts::new(UbertsConfig::default());
    u.define_relation("word", &["i", "w"]).unwrap();
    u.define_relation("seen", &["i"]).unwrap();
    let r = u.add_rule_text("word(i, w) => seen(i)").unwrap();
    u.add_generator(r, RuleGenerator::constant("seen", 1.0)).unwrap();
    for w in ["a", "b"] {
        let f = u.fact("word", &[Value::Int(0), Value::str(w)]).unwrap();
        u.commit_initial_fact(f).unwrap();
    }
    assert_eq!(u.agenda().len(), 1);
    let result = u.run().unwrap();
    assert_eq!(result.committed.len(), 1);
    assert_eq!(result.stop, StopReason::Exhausted);
}

#[test]
fn interning_round_trip() {
    let u = Uberts::new(UbertsConfig::default());
    let t = u.define_node_type("tok");
    let a = u.schema().intern_node(t, "dog");
    let b = u.schema().intern_node(t, "dog");
    assert_eq!(a, b);
    u.define_relation("word", &["tok"]).unwrap();
    let f = u.fact("word", &[Value::str("dog")]).unwrap();
    let g = u.fact("word", &[Value::str("dog")]).unwrap();
    assert_eq!(f, g);
    assert_eq!(f.tail(), &[a]);
}

#[test]
fn schema_is_shared_across_engines() {
    let schema = Arc::new(Schema::new());
    schema.define_relation_by_names("edge", &["v", "v"]).unwrap();
    let a = Uberts::with_schema(Arc::clone(&schema), UbertsConfig::default());
    let b = Uberts::with_schema(Arc::clone(&schema), UbertsConfig::default());
    let f = a.fact("edge", &[Value::Int(1), Value::Int(2)]).unwrap();
    let g = b.fact("edge", &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(f, g);
}

#[test]
fn program_and_config_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let program = dir.path().join("chain.ub");
    std::fs::write(
        &program,
        "def edge v v\n\
         def path v v\n\
         rule edge(x, y) => path(x, y)\n\
         rule path(x, y) & edge(y, z) => path(x, z) @ 0.5\n\
         x edge 1 2\n\
         x edge 2 3\n\
         x edge 3 4\n",
    )
    .unwrap();
    let config = dir.path().join("uberts.toml");
    std::fs::write(&config, "max_steps = 4\npriority = \"bfs\"\n").unwrap();

    let config = UbertsConfig::load(&config).unwrap();
    let mut u = Program::load(&program).unwrap().build(config).unwrap();
    let result = u.run().unwrap();
    assert_eq!(result.stop, StopReason::StepLimit);
    assert_eq!(result.steps, 4);

    let mut u = Program::load(&program)
        .unwrap()
        .build(UbertsConfig::default())
        .unwrap();
    u.run().unwrap();
    assert_eq!(
        u.dump_state(),
        "edge(1, 2)\nedge(2, 3)\nedge(3, 4)\n\
         path(1, 2)\npath(1, 3)\npath(1, 4)\npath(2, 3)\npath(2, 4)\npath(3, 4)\n"
    );
}

#[test]
fn cancel_from_another_thread() {
    let mut u = Uberts::new(UbertsConfig::default());
    u.define_relation("n", &["i"]).unwrap();
    let r = u.add_rule_text("n(i)").unwrap();
    // An endless counter: every committed n(i) proposes n(i + 1).
    u.add_generator(r, |m: &Match, _: &State, schema: &Schema| -> Generated {
        let i = m
            .var("i")
            .and_then(|n| schema.node_value(n).as_int())
            .unwrap_or(0);
        Ok(vec![(schema.fact_from_values("n", &[Value::Int(i + 1)])?, Adjoints::constant(1.0))])
    })
    .unwrap();
    let f = ints(&u, "n", &[0]);
    u.commit_initial_fact(f).unwrap();

    let handle = u.cancel_handle();
    let worker = std::thread::spawn(move || u.run().map(|r| (r.stop, r.steps)));
    std::thread::sleep(std::time::Duration::from_millis(20));
    handle.cancel();
    let (stop, steps) = worker.join().unwrap().unwrap();
    assert_eq!(stop, StopReason::Cancelled);
    assert!(steps > 0);
}
