//! Resolving rules against a schema.
//!
//! Compilation turns relation names into ids, constants into interned nodes
//! and variable names into dense indices, and records for every variable the
//! `(term, position)` where it first occurs. That site is how a match reads
//! a variable's value back.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::term::{Rule, Term, TermArg};
use crate::error::{RuleError, UbertsResult};
use crate::fact::{ArgPos, Fact, RelationId};
use crate::node::NodeId;
use crate::schema::Schema;

/// Handle returned when a rule is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

/// What fills an argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Node(NodeId),
    Var(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTerm {
    pub relation: RelationId,
    /// Constrained positions only: the head appears when the term is primed.
    pub args: Vec<(ArgPos, Slot)>,
}

/// Right-hand side ready to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RhsTemplate {
    pub relation: RelationId,
    pub head: Option<Slot>,
    pub args: Vec<Slot>,
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: RuleId,
    pub rule: Rule,
    pub terms: Vec<CompiledTerm>,
    pub vars: Vec<String>,
    /// First `(term, position)` of every variable, indexed like `vars`.
    pub var_sites: Vec<(usize, ArgPos)>,
    pub rhs: Option<RhsTemplate>,
}

impl CompiledRule {
    pub fn compile(id: RuleId, rule: Rule, schema: &Schema) -> UbertsResult<Self> {
        rule.check_bound()?;
        let mut var_index: HashMap<String, usize> = HashMap::new();
        let mut vars = Vec::new();
        let mut var_sites = Vec::new();
        let mut terms = Vec::with_capacity(rule.lhs.len());

        for (ti, term) in rule.lhs.iter().enumerate() {
            let rel = schema.relation_by_name(&term.relation)?;
            check_arity(term, rel.arity())?;
            let mut args = Vec::new();
            for (pos, arg) in positions(term) {
                let slot = match arg {
                    TermArg::Const(v) => {
                        let ty = rel.type_at(pos).expect("position checked against arity");
                        Slot::Node(schema.intern_node(ty, v.clone()))
                    }
                    TermArg::Var(name) => {
                        let i = *var_index.entry(name.clone()).or_insert_with(|| {
                            vars.push(name.clone());
                            var_sites.push((ti, pos));
                            vars.len() - 1
                        });
                        Slot::Var(i)
                    }
                };
                args.push((pos, slot));
            }
            terms.push(CompiledTerm {
                relation: rel.id,
                args,
            });
        }

        let rhs = match &rule.rhs {
            None => None,
            Some(term) => {
                let rel = schema.relation_by_name(&term.relation)?;
                check_arity(term, rel.arity())?;
                if term.head.is_none() && !rel.witness_head {
                    return Err(RuleError::Parse {
                        input: rule.to_string(),
                        message: format!(
                            "relation '{}' has an explicit head type; write the right-hand side \
                             as a primed term",
                            rel.name
                        ),
                    }
                    .into());
                }
                let resolve = |pos: ArgPos, arg: &TermArg| -> Slot {
                    match arg {
                        TermArg::Const(v) => {
                            let ty = rel.type_at(pos).expect("position checked against arity");
                            Slot::Node(schema.intern_node(ty, v.clone()))
                        }
                        // check_bound guarantees every rhs variable is indexed
                        TermArg::Var(name) => Slot::Var(var_index[name]),
                    }
                };
                Some(RhsTemplate {
                    relation: rel.id,
                    head: term.head.as_ref().map(|h| resolve(ArgPos::Head, h)),
                    args: term
                        .args
                        .iter()
                        .enumerate()
                        .map(|(i, a)| resolve(ArgPos::Tail(i), a))
                        .collect(),
                })
            }
        };

        Ok(Self {
            id,
            rule,
            terms,
            vars,
            var_sites,
            rhs,
        })
    }

    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v == name)
    }

    /// Value of variable `var` given the facts bound to each LHS term.
    pub fn var_value(&self, var: usize, facts: &[Fact]) -> Option<NodeId> {
        let (term, pos) = *self.var_sites.get(var)?;
        facts.get(term)?.arg(pos)
    }

    /// Build the right-hand side fact for one match. `None` for triggers.
    pub fn instantiate(&self, facts: &[Fact], schema: &Schema) -> UbertsResult<Option<Fact>> {
        let Some(rhs) = &self.rhs else {
            return Ok(None);
        };
        let node = |slot: &Slot| -> NodeId {
            match slot {
                Slot::Node(n) => *n,
                Slot::Var(v) => self
                    .var_value(*v, facts)
                    .expect("every variable is bound in a complete match"),
            }
        };
        let tail: Vec<NodeId> = rhs.args.iter().map(node).collect();
        let fact = match &rhs.head {
            Some(h) => schema.make_fact_with_head(rhs.relation, node(h), &tail)?,
            None => schema.make_fact(rhs.relation, &tail)?,
        };
        Ok(Some(fact))
    }
}

fn check_arity(term: &Term, expected: usize) -> UbertsResult<()> {
    if term.args.len() != expected {
        return Err(RuleError::TermArity {
            term: term.to_string(),
            relation: term.relation.clone(),
            expected,
            actual: term.args.len(),
        }
        .into());
    }
    Ok(())
}

fn positions(term: &Term) -> impl Iterator<Item = (ArgPos, &TermArg)> + '_ {
    term.head
        .iter()
        .map(|h| (ArgPos::Head, h))
        .chain(term.args.iter().enumerate().map(|(i, a)| (ArgPos::Tail(i), a)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UbertsError;
    use crate::node::Value;

    fn schema() -> Schema {
        let s = Schema::new();
        s.define_relation_by_names("r1", &["t", "t"]).unwrap();
        s.define_relation_by_names("r2", &["t", "t"]).unwrap();
        s.define_relation_by_names("r3", &["t", "t", "t", "t"]).unwrap();
        s
    }

    #[test]
    fn variables_get_first_sites() {
        let s = schema();
        let rule = Rule::parse("r2(a,b) & r1(c,a) => r3(a,b,c,c)").unwrap();
        let c = CompiledRule::compile(RuleId(0), rule, &s).unwrap();
        assert_eq!(c.vars, vec!["a", "b", "c"]);
        assert_eq!(c.var_sites[0], (0, ArgPos::Tail(0)));
        assert_eq!(c.var_sites[2], (1, ArgPos::Tail(0)));
        assert_eq!(c.terms[1].args[1], (ArgPos::Tail(1), Slot::Var(0)));
    }

    #[test]
    fn constants_are_interned_with_position_type() {
        let s = schema();
        let rule = Rule::parse("r1(x, 5) => r2(x, x)").unwrap();
        let c = CompiledRule::compile(RuleId(0), rule, &s).unwrap();
        let t = s.node_type("t").unwrap();
        let five = s.lookup_node(t, &Value::Int(5)).unwrap();
        assert_eq!(c.terms[0].args[1], (ArgPos::Tail(1), Slot::Node(five)));
    }

    #[test]
    fn arity_and_relation_are_checked() {
        let s = schema();
        let err = CompiledRule::compile(RuleId(0), Rule::parse("r1(x) => r2(x, x)").unwrap(), &s).unwrap_err();
        assert!(matches!(err, UbertsError::Rule(RuleError::TermArity { expected: 2, actual: 1, .. })));
        assert!(CompiledRule::compile(RuleId(0), Rule::parse("nope(x)").unwrap(), &s).is_err());
    }

    #[test]
    fn instantiate_builds_the_rhs() {
        let s = schema();
        let rule = Rule::parse("r2(a,b) & r1(c,d) => r3(a,b,c,d)").unwrap();
        let c = CompiledRule::compile(RuleId(0), rule, &s).unwrap();
        let f2 = s.fact_from_values("r2", &[Value::Int(1), Value::Int(2)]).unwrap();
        let f1 = s.fact_from_values("r1", &[Value::Int(3), Value::Int(4)]).unwrap();
        let out = c.instantiate(&[f2, f1], &s).unwrap().unwrap();
        assert_eq!(s.display_fact(&out), "r3(1, 2, 3, 4)");
    }
}
