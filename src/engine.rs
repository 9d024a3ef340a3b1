//! Engine facade: the `Uberts` driver loop and its registration API.
//!
//! An engine owns one [`State`], one [`Agenda`], the compiled rules and the
//! pattern trie built from them, and the generators and global factors
//! attached to those rules. The [`Schema`] is shared behind an `Arc` so that
//! independent engines can decode in parallel over the same relations.
//!
//! Lifecycle: an engine starts [`RunStatus::Idle`]. Rules and initial facts
//! are added while idle; [`Uberts::run`] moves it to `Running` and, once the
//! agenda is drained, cancelled or the step cap is hit, to `Done`.
//! [`Uberts::reset`] returns it to `Idle` with an empty state and agenda.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::agenda::Agenda;
use crate::config::UbertsConfig;
use crate::decision::Decision;
use crate::error::{RuleError, RunError, StateError, UbertsError, UbertsResult};
use crate::factor::{FactorContext, GlobalFactor};
use crate::fact::{Fact, RelationId};
use crate::node::{NodeTypeId, Value};
use crate::rule::{CompiledRule, Match, PatternTrie, Rule, RuleId, TrieStats};
use crate::schema::Schema;
use crate::score::Adjoints;
use crate::state::State;
use crate::transition::TransitionGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
    Done,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Done => write!(f, "done"),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The agenda ran empty.
    Exhausted,
    Cancelled,
    /// `max_steps` pops were made.
    StepLimit,
}

/// Outcome of one [`Uberts::run`].
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Popped and committed facts with their final scores, in commit order.
    /// Facts seeded with `commit_initial_fact` are not included.
    pub committed: Vec<(Fact, Adjoints)>,
    /// Popped facts the decision policy refused, in pop order.
    pub pruned: Vec<(Fact, Adjoints)>,
    /// Facts global factors removed from the agenda.
    pub retracted: Vec<Fact>,
    pub steps: usize,
    pub stop: StopReason,
}

impl RunResult {
    pub fn committed_facts(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.committed.iter().map(|(f, _)| f)
    }

    /// Committed facts with their scores evaluated.
    pub fn final_scores(&self) -> Vec<(Fact, f64)> {
        self.committed
            .iter()
            .map(|(f, s)| (f.clone(), s.forward()))
            .collect()
    }

    pub fn cancelled(&self) -> bool {
        self.stop == StopReason::Cancelled
    }
}

/// A cloneable handle that stops a run from another thread. The flag is
/// checked once per iteration, before each pop.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Uberts {
    config: UbertsConfig,
    schema: Arc<Schema>,
    state: State,
    agenda: Agenda,
    trie: PatternTrie,
    rules: Vec<Arc<CompiledRule>>,
    generators: HashMap<RuleId, Vec<Box<dyn TransitionGenerator>>>,
    factors: Vec<Box<dyn GlobalFactor>>,
    rule_factors: HashMap<RuleId, Vec<usize>>,
    term_owners: HashMap<(RelationId, String), String>,
    retracted: Vec<Fact>,
    status: RunStatus,
    cancel: Arc<AtomicBool>,
}

impl Uberts {
    /// An engine with a fresh schema.
    pub fn new(config: UbertsConfig) -> Self {
        Self::with_schema(Arc::new(Schema::new()), config)
    }

    /// An engine over an existing, possibly shared, schema.
    pub fn with_schema(schema: Arc<Schema>, config: UbertsConfig) -> Self {
        let agenda = Agenda::with_priority(Arc::clone(&schema), config.priority);
        Self {
            config,
            schema,
            state: State::new(),
            agenda,
            trie: PatternTrie::new(),
            rules: Vec::new(),
            generators: HashMap::new(),
            factors: Vec::new(),
            rule_factors: HashMap::new(),
            term_owners: HashMap::new(),
            retracted: Vec::new(),
            status: RunStatus::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &UbertsConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn trie_stats(&self) -> TrieStats {
        self.trie.stats()
    }

    // -----------------------------------------------------------------------
    // Schema and rule registration
    // -----------------------------------------------------------------------

    pub fn define_node_type(&self, name: &str) -> NodeTypeId {
        self.schema.define_node_type(name)
    }

    pub fn define_relation(&self, name: &str, arg_types: &[&str]) -> UbertsResult<RelationId> {
        self.schema.define_relation_by_names(name, arg_types)
    }

    /// Build a fact of `relation` from raw argument values.
    pub fn fact(&self, relation: &str, values: &[Value]) -> UbertsResult<Fact> {
        self.schema.fact_from_values(relation, values)
    }

    /// Compile a rule and index it in the pattern trie.
    pub fn add_rule(&mut self, rule: Rule) -> UbertsResult<RuleId> {
        self.require_idle("add a rule")?;
        let id = RuleId(self.rules.len());
        let compiled = Arc::new(CompiledRule::compile(id, rule, &self.schema)?);
        self.trie.insert(Arc::clone(&compiled));
        tracing::debug!(rule = %compiled.rule, id = id.index(), "rule added");
        self.rules.push(compiled);
        Ok(id)
    }

    pub fn add_rule_text(&mut self, text: &str) -> UbertsResult<RuleId> {
        self.add_rule(Rule::parse(text)?)
    }

    /// Attach a transition generator, called on every match of `rule`.
    pub fn add_generator(&mut self, rule: RuleId, generator: impl TransitionGenerator + 'static) -> UbertsResult<()> {
        self.check_rule(rule)?;
        self.generators
            .entry(rule)
            .or_default()
            .push(Box::new(generator));
        Ok(())
    }

    /// Register a global factor and call its `rescore` on every match of
    /// `rule`.
    pub fn attach_global_factor(&mut self, rule: RuleId, factor: impl GlobalFactor + 'static) -> UbertsResult<()> {
        self.check_rule(rule)?;
        let index = self.register_factor(Box::new(factor))?;
        self.rule_factors.entry(rule).or_default().push(index);
        Ok(())
    }

    /// Register a global factor that only sees pushes, commits and
    /// retractions.
    pub fn add_global_factor(&mut self, factor: impl GlobalFactor + 'static) -> UbertsResult<()> {
        self.register_factor(Box::new(factor)).map(|_| ())
    }

    fn register_factor(&mut self, factor: Box<dyn GlobalFactor>) -> UbertsResult<usize> {
        self.require_idle("add a global factor")?;
        if let Some((relation, term)) = factor.owned_term() {
            let key = (relation, term.to_string());
            if let Some(owner) = self.term_owners.get(&key) {
                return Err(RuleError::ConflictingGlobalFactor {
                    factor: factor.name().to_string(),
                    owner: owner.clone(),
                    relation: self.schema.relation_name(relation).to_string(),
                    term: term.to_string(),
                }
                .into());
            }
            self.term_owners.insert(key, factor.name().to_string());
        }
        self.factors.push(factor);
        Ok(self.factors.len() - 1)
    }

    fn check_rule(&self, rule: RuleId) -> UbertsResult<()> {
        if rule.index() < self.rules.len() {
            Ok(())
        } else {
            Err(RuleError::UnknownRule { id: rule.index() }.into())
        }
    }

    fn require_idle(&self, action: &str) -> UbertsResult<()> {
        if self.status == RunStatus::Idle {
            Ok(())
        } else {
            Err(RunError::InvalidTransition {
                action: action.to_string(),
                status: self.status.to_string(),
            }
            .into())
        }
    }

    // -----------------------------------------------------------------------
    // Facts
    // -----------------------------------------------------------------------

    /// Commit a fact before the run. Its rule matches fire immediately, so
    /// their candidates are already on the agenda when `run` starts.
    ///
    /// A fact an earlier seed already put on the agenda is taken off it
    /// first, so the agenda and the state stay disjoint.
    pub fn commit_initial_fact(&mut self, fact: Fact) -> UbertsResult<()> {
        self.require_idle("commit an initial fact")?;
        if self.agenda.contains(&fact) {
            self.agenda.remove(&fact)?;
            tracing::debug!(fact = %self.schema.display_fact(&fact), "seed was pending, taken off the agenda");
        }
        self.commit(&fact)
    }

    /// Push a scored candidate. Candidates already committed or pending are
    /// dropped; returns whether the fact reached the agenda.
    pub fn propose(&mut self, fact: Fact, score: Adjoints) -> UbertsResult<bool> {
        if self.state.contains(&fact) || self.agenda.contains(&fact) {
            tracing::trace!(fact = %self.schema.display_fact(&fact), "dropped duplicate candidate");
            return Ok(false);
        }
        let mut ctx = FactorContext::new(&self.schema, &self.state, &mut self.agenda);
        let mut score = Some(score);
        let mut rescored = Vec::new();
        for (index, factor) in self.factors.iter_mut().enumerate() {
            let Some(current) = score.take() else {
                break;
            };
            score = factor
                .on_push(&fact, current, &mut ctx)
                .map_err(|e| factor_error(factor.name(), e))?;
            rescored.extend(ctx.take_rescored().into_iter().map(|f| (Some(index), f)));
        }
        let retracted = ctx.take_retracted();
        let pushed = match score {
            Some(score) => {
                self.agenda.push(fact.clone(), score)?;
                rescored.push((None, fact));
                true
            }
            None => {
                tracing::trace!(fact = %self.schema.display_fact(&fact), "candidate dropped by a global factor");
                false
            }
        };
        self.notify_retracted(retracted)?;
        self.notify_rescored(rescored)?;
        Ok(pushed)
    }

    fn commit(&mut self, fact: &Fact) -> UbertsResult<()> {
        self.state.commit(fact.clone()).map_err(|e| match e {
            UbertsError::State(StateError::DuplicateFact { .. }) => StateError::DuplicateFact {
                fact: self.schema.display_fact(fact),
            }
            .into(),
            other => other,
        })?;
        let mut ctx = FactorContext::new(&self.schema, &self.state, &mut self.agenda);
        let mut rescored = Vec::new();
        for (index, factor) in self.factors.iter_mut().enumerate() {
            factor
                .on_commit(fact, &mut ctx)
                .map_err(|e| factor_error(factor.name(), e))?;
            rescored.extend(ctx.take_rescored().into_iter().map(|f| (Some(index), f)));
        }
        let retracted = ctx.take_retracted();
        self.notify_retracted(retracted)?;
        self.notify_rescored(rescored)?;
        self.expand(fact)
    }

    /// Match a freshly committed fact and run what its matches trigger.
    fn expand(&mut self, fact: &Fact) -> UbertsResult<()> {
        let matches = self.trie.match_fact(fact, &self.state);
        tracing::debug!(
            fact = %self.schema.display_fact(fact),
            matches = matches.len(),
            "committed"
        );
        for m in &matches {
            for (candidate, score) in self.generate(m)? {
                self.propose(candidate, score)?;
            }
            let attached = self.rule_factors.get(&m.rule_id()).cloned().unwrap_or_default();
            for index in attached {
                self.rescore(index, m)?;
            }
        }
        Ok(())
    }

    fn generate(&self, m: &Match) -> UbertsResult<Vec<(Fact, Adjoints)>> {
        let Some(generators) = self.generators.get(&m.rule_id()) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for generator in generators {
            let produced = generator
                .generate(m, &self.state, &self.schema)
                .map_err(|e| RunError::Generator {
                    rule: format!("{} ({})", m.rule().rule, generator.name()),
                    message: e.to_string(),
                })?;
            out.extend(produced);
        }
        Ok(out)
    }

    fn rescore(&mut self, index: usize, m: &Match) -> UbertsResult<()> {
        let factor = &mut self.factors[index];
        let mut ctx = FactorContext::new(&self.schema, &self.state, &mut self.agenda);
        factor
            .rescore(m, &mut ctx)
            .map_err(|e| factor_error(factor.name(), e))?;
        let retracted = ctx.take_retracted();
        let rescored = ctx.take_rescored().into_iter().map(|f| (Some(index), f)).collect();
        self.notify_retracted(retracted)?;
        self.notify_rescored(rescored)
    }

    /// Tell every factor but the one that set it about a fact's new score.
    /// `None` as the origin means the engine pushed the fact. Rescoring those
    /// calls cause is handled in turn.
    fn notify_rescored(&mut self, mut pending: Vec<(Option<usize>, Fact)>) -> UbertsResult<()> {
        while let Some((origin, fact)) = pending.pop() {
            let mut ctx = FactorContext::new(&self.schema, &self.state, &mut self.agenda);
            for (index, factor) in self.factors.iter_mut().enumerate() {
                if origin == Some(index) {
                    continue;
                }
                factor
                    .on_rescored(&fact, &mut ctx)
                    .map_err(|e| factor_error(factor.name(), e))?;
                pending.extend(ctx.take_rescored().into_iter().map(|f| (Some(index), f)));
            }
            let retracted = ctx.take_retracted();
            self.notify_retracted(retracted)?;
        }
        Ok(())
    }

    /// Record retracted facts and tell every factor about them.
    fn notify_retracted(&mut self, retracted: Vec<Fact>) -> UbertsResult<()> {
        for fact in retracted {
            self.left_agenda(&fact)?;
            self.retracted.push(fact);
        }
        Ok(())
    }

    /// Call `on_retract` for a fact that left the agenda uncommitted.
    /// Retractions those calls cause are handled in turn.
    fn left_agenda(&mut self, fact: &Fact) -> UbertsResult<()> {
        let mut ctx = FactorContext::new(&self.schema, &self.state, &mut self.agenda);
        let mut rescored = Vec::new();
        for (index, factor) in self.factors.iter_mut().enumerate() {
            factor
                .on_retract(fact, &mut ctx)
                .map_err(|e| factor_error(factor.name(), e))?;
            rescored.extend(ctx.take_rescored().into_iter().map(|f| (Some(index), f)));
        }
        let cascaded = ctx.take_retracted();
        self.notify_retracted(cascaded)?;
        self.notify_rescored(rescored)
    }

    // -----------------------------------------------------------------------
    // Run control
    // -----------------------------------------------------------------------

    /// Pop, decide, commit and expand until the agenda is empty, the run is
    /// cancelled or `max_steps` is reached.
    ///
    /// An error aborts the run. The engine is left `Done` with its state and
    /// agenda untouched for inspection.
    pub fn run(&mut self) -> UbertsResult<RunResult> {
        self.require_idle("run")?;
        self.status = RunStatus::Running;
        self.retracted.clear();
        tracing::info!(
            initial = self.state.len(),
            pending = self.agenda.len(),
            rules = self.rules.len(),
            "run started"
        );
        let outcome = self.drive();
        self.status = RunStatus::Done;
        if let Ok(result) = &outcome {
            tracing::info!(
                steps = result.steps,
                committed = result.committed.len(),
                pruned = result.pruned.len(),
                retracted = result.retracted.len(),
                stop = ?result.stop,
                "run finished"
            );
        }
        outcome
    }

    fn drive(&mut self) -> UbertsResult<RunResult> {
        let mut committed = Vec::new();
        let mut pruned = Vec::new();
        let mut steps = 0;
        let stop = loop {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!(steps, pending = self.agenda.len(), "run cancelled");
                break StopReason::Cancelled;
            }
            if self.config.max_steps.is_some_and(|max| steps >= max) {
                break StopReason::StepLimit;
            }
            if self.agenda.is_empty() {
                break StopReason::Exhausted;
            }
            let (fact, score) = self.agenda.pop()?;
            steps += 1;
            match self.config.decision.decide(score.forward()) {
                Decision::Commit => {
                    self.commit(&fact)?;
                    committed.push((fact, score));
                }
                Decision::Prune => {
                    tracing::debug!(fact = %self.schema.display_fact(&fact), "pruned");
                    self.left_agenda(&fact)?;
                    pruned.push((fact, score));
                }
            }
        };
        Ok(RunResult {
            committed,
            pruned,
            retracted: std::mem::take(&mut self.retracted),
            steps,
            stop,
        })
    }

    /// Request cancellation. Takes effect at the top of the next iteration.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Drop all facts, pending candidates and per-run factor state. The
    /// schema, rules, generators and factors stay registered.
    pub fn reset(&mut self) {
        self.state.clear();
        self.agenda.clear();
        self.retracted.clear();
        for factor in self.factors.iter_mut() {
            factor.reset();
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.status = RunStatus::Idle;
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Pending facts, one per line, in pop order: `<score>\t<fact>`.
    pub fn dump_agenda(&self) -> String {
        self.agenda
            .sorted_items()
            .into_iter()
            .map(|(f, s)| format!("{:.4}\t{}\n", s.forward(), self.schema.display_fact(f)))
            .collect()
    }

    /// Committed facts, one per line, sorted by text.
    pub fn dump_state(&self) -> String {
        let mut lines: Vec<String> = self
            .state
            .iter()
            .map(|f| self.schema.display_fact(f))
            .collect();
        lines.sort();
        lines.into_iter().map(|l| l + "\n").collect()
    }
}

impl fmt::Debug for Uberts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uberts")
            .field("status", &self.status)
            .field("rules", &self.rules.len())
            .field("factors", &self.factors.len())
            .field("state", &self.state.len())
            .field("agenda", &self.agenda.len())
            .finish()
    }
}

fn factor_error(name: &str, error: UbertsError) -> UbertsError {
    RunError::Factor {
        factor: name.to_string(),
        message: error.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionPolicy;
    use crate::transition::RuleGenerator;

    fn chain() -> Uberts {
        let mut u = Uberts::new(UbertsConfig::default());
        u.define_relation("edge", &["v", "v"]).unwrap();
        u.define_relation("path", &["v", "v"]).unwrap();
        let r = u.add_rule_text("edge(x, y) => path(x, y)").unwrap();
        u.add_generator(r, RuleGenerator::constant("base", 1.0)).unwrap();
        let r = u.add_rule_text("path(x, y) & edge(y, z) => path(x, z)").unwrap();
        u.add_generator(r, RuleGenerator::constant("step", 0.5)).unwrap();
        u
    }

    fn edge(u: &Uberts, a: i64, b: i64) -> Fact {
        u.fact("edge", &[Value::Int(a), Value::Int(b)]).unwrap()
    }

    #[test]
    fn transitive_closure() {
        let mut u = chain();
        for (a, b) in [(1, 2), (2, 3), (3, 4)] {
            let f = edge(&u, a, b);
            u.commit_initial_fact(f).unwrap();
        }
        let result = u.run().unwrap();
        assert_eq!(result.stop, StopReason::Exhausted);
        assert_eq!(result.committed.len(), 6);
        assert_eq!(u.status(), RunStatus::Done);
        assert!(u.dump_state().contains("path(1, 4)\n"));
        assert!(u.agenda().is_empty());
    }

    #[test]
    fn run_twice_needs_reset() {
        let mut u = chain();
        u.run().unwrap();
        assert!(matches!(
            u.run().unwrap_err(),
            UbertsError::Run(RunError::InvalidTransition { .. })
        ));
        assert!(u.add_rule_text("edge(x, y)").is_err());
        u.reset();
        assert_eq!(u.status(), RunStatus::Idle);
        assert!(u.run().is_ok());
    }

    #[test]
    fn reset_keeps_rules() {
        let mut u = chain();
        let f = edge(&u, 1, 2);
        u.commit_initial_fact(f.clone()).unwrap();
        u.run().unwrap();
        u.reset();
        assert!(u.state().is_empty());
        u.commit_initial_fact(f).unwrap();
        assert_eq!(u.run().unwrap().committed.len(), 1);
    }

    #[test]
    fn cancel_stops_before_the_first_pop() {
        let mut u = chain();
        let f = edge(&u, 1, 2);
        u.commit_initial_fact(f).unwrap();
        u.cancel_handle().cancel();
        let result = u.run().unwrap();
        assert!(result.cancelled());
        assert_eq!(result.steps, 0);
        assert_eq!(u.agenda().len(), 1);
    }

    #[test]
    fn step_limit() {
        let mut u = Uberts::new(UbertsConfig {
            max_steps: Some(2),
            ..Default::default()
        });
        u.define_relation("edge", &["v", "v"]).unwrap();
        u.define_relation("path", &["v", "v"]).unwrap();
        let r = u.add_rule_text("edge(x, y) => path(x, y)").unwrap();
        u.add_generator(r, RuleGenerator::constant("base", 1.0)).unwrap();
        for i in 0..5 {
            let f = u.fact("edge", &[Value::Int(i), Value::Int(i + 1)]).unwrap();
            u.commit_initial_fact(f).unwrap();
        }
        let result = u.run().unwrap();
        assert_eq!(result.stop, StopReason::StepLimit);
        assert_eq!(result.steps, 2);
        assert_eq!(u.agenda().len(), 3);
    }

    #[test]
    fn threshold_prunes_non_positive() {
        let mut u = Uberts::new(UbertsConfig {
            decision: DecisionPolicy::positive(),
            ..Default::default()
        });
        u.define_relation("word", &["i"]).unwrap();
        u.define_relation("keep", &["i"]).unwrap();
        let r = u.add_rule_text("word(i) => keep(i)").unwrap();
        u.add_generator(r, |m: &Match, _: &State, schema: &Schema| -> UbertsResult<Vec<(Fact, Adjoints)>> {
            let i = m.var("i").map(|n| schema.node_value(n)).and_then(|v| v.as_int()).unwrap_or(0);
            let fact = schema.fact_from_values("keep", &[Value::Int(i)])?;
            Ok(vec![(fact, Adjoints::constant(if i % 2 == 0 { 1.0 } else { -1.0 }))])
        })
        .unwrap();
        for i in 0..4 {
            let f = u.fact("word", &[Value::Int(i)]).unwrap();
            u.commit_initial_fact(f).unwrap();
        }
        let result = u.run().unwrap();
        assert_eq!(result.committed.len(), 2);
        assert_eq!(result.pruned.len(), 2);
        assert!(result.retracted.is_empty());
        assert_eq!(u.dump_state().lines().filter(|l| l.starts_with("keep")).count(), 2);
    }

    #[test]
    fn generator_errors_abort_the_run() {
        let mut u = Uberts::new(UbertsConfig::default());
        u.define_relation("word", &["i"]).unwrap();
        let r = u.add_rule_text("word(i)").unwrap();
        u.add_generator(r, |_: &Match, _: &State, _: &Schema| -> UbertsResult<Vec<(Fact, Adjoints)>> {
            Err(RuleError::Parse {
                input: "x".into(),
                message: "boom".into(),
            }
            .into())
        })
        .unwrap();
        let f = u.fact("word", &[Value::Int(0)]).unwrap();
        let err = u.commit_initial_fact(f).unwrap_err();
        assert!(matches!(err, UbertsError::Run(RunError::Generator { .. })));
    }

    #[test]
    fn generator_errors_inside_a_run_leave_it_done() {
        let mut u = Uberts::new(UbertsConfig::default());
        u.define_relation("word", &["i"]).unwrap();
        u.define_relation("tag", &["i"]).unwrap();
        let r = u.add_rule_text("word(i) => tag(i)").unwrap();
        u.add_generator(r, RuleGenerator::constant("tag", 1.0)).unwrap();
        let r = u.add_rule_text("tag(i)").unwrap();
        u.add_generator(r, |_: &Match, _: &State, _: &Schema| -> UbertsResult<Vec<(Fact, Adjoints)>> {
            Err(RuleError::Parse {
                input: "tag".into(),
                message: "boom".into(),
            }
            .into())
        })
        .unwrap();
        for i in 0..2 {
            let f = u.fact("word", &[Value::Int(i)]).unwrap();
            u.commit_initial_fact(f).unwrap();
        }
        assert_eq!(u.agenda().len(), 2);

        let err = u.run().unwrap_err();
        assert!(matches!(err, UbertsError::Run(RunError::Generator { .. })));
        assert_eq!(u.status(), RunStatus::Done);
        assert_eq!(u.dump_state(), "tag(0)\nword(0)\nword(1)\n");
        assert_eq!(u.dump_agenda(), "1.0000\ttag(1)\n");
        assert!(matches!(
            u.run().unwrap_err(),
            UbertsError::Run(RunError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn seeding_a_pending_fact_takes_it_off_the_agenda() {
        let mut u = chain();
        let f = edge(&u, 1, 2);
        u.commit_initial_fact(f).unwrap();
        let path = u.fact("path", &[Value::Int(1), Value::Int(2)]).unwrap();
        assert!(u.agenda().contains(&path));

        u.commit_initial_fact(path.clone()).unwrap();
        assert!(u.state().contains(&path));
        assert!(!u.agenda().contains(&path));
        let result = u.run().unwrap();
        assert!(result.committed.is_empty());
        assert_eq!(u.dump_state(), "edge(1, 2)\npath(1, 2)\n");
    }

    #[test]
    fn duplicate_fact_errors_name_the_fact() {
        let mut u = chain();
        let f = edge(&u, 1, 2);
        u.commit_initial_fact(f.clone()).unwrap();
        let err = u.commit_initial_fact(f).unwrap_err();
        assert!(matches!(err, UbertsError::State(StateError::DuplicateFact { .. })));
        assert_eq!(err.to_string(), "duplicate fact: edge(1, 2) is already committed");
    }

    #[test]
    fn unknown_rule_id() {
        let mut u = Uberts::new(UbertsConfig::default());
        let err = u
            .add_generator(RuleId(3), RuleGenerator::constant("g", 1.0))
            .unwrap_err();
        assert!(matches!(err, UbertsError::Rule(RuleError::UnknownRule { id: 3 })));
    }

    #[test]
    fn dumps_are_sorted() {
        let mut u = chain();
        for (a, b) in [(3, 4), (1, 2)] {
            let f = edge(&u, a, b);
            u.commit_initial_fact(f).unwrap();
        }
        assert_eq!(u.dump_agenda(), "1.0000\tpath(1, 2)\n1.0000\tpath(3, 4)\n");
        assert_eq!(u.dump_state(), "edge(1, 2)\nedge(3, 4)\n");
    }
}
