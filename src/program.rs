//! Program text: relations, rules, global factors and initial facts.
//!
//! ```text
//! # one sentence
//! def word i w
//! def tag i w
//! rule word(i, w) => tag(i, w) @ 0.5
//! atmost1 tag(i, w):i
//! x word 0 The
//! x word 1 dog
//! ```
//!
//! - `def rel t1 t2 ...` defines a witness-headed relation; `def rel' h t1 ...`
//!   one whose head has node type `h`.
//! - `rule <rule> [@ score]` adds a rule whose right-hand side, if any, is
//!   proposed with a constant score (default 1).
//! - `atmost1 <key>`, `atleast1 <key>` and `numargs <key> [refine=<var>]`
//!   add global factors; `<key>` is written `rel(a, b, c):a[:b]`.
//! - `x rel v1 v2 ...` (or `x rel' h v1 ...`) is an initial fact.
//!
//! Initial facts are committed after every rule and factor is registered,
//! wherever they appear in the text.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::UbertsConfig;
use crate::engine::Uberts;
use crate::error::{ConfigError, RuleError, SchemaError, UbertsResult};
use crate::fact::Fact;
use crate::factor::{AtLeastOne, AtMostOne, GroupKey, NumArgs};
use crate::node::Value;
use crate::rule::term::{split_top, strip_comment};
use crate::rule::{Rule, Term, TermArg};
use crate::schema::Schema;
use crate::score::WeightTable;
use crate::transition::RuleGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    AtMostOne,
    AtLeastOne,
    NumArgs,
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKind::AtMostOne => write!(f, "atmost1"),
            FactorKind::AtLeastOne => write!(f, "atleast1"),
            FactorKind::NumArgs => write!(f, "numargs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Def {
        relation: String,
        head: Option<String>,
        types: Vec<String>,
    },
    Fact {
        relation: String,
        head: Option<Value>,
        values: Vec<Value>,
    },
    Rule {
        rule: Rule,
        score: f64,
    },
    Factor {
        kind: FactorKind,
        key: String,
        refine: Option<String>,
    },
}

/// A parsed program, with the line number of every statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<(usize, Statement)>,
}

impl Program {
    pub fn load(path: &Path) -> UbertsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> UbertsResult<Self> {
        let mut statements = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let statement = parse_statement(line).map_err(|message| RuleError::Parse {
                input: raw.trim().to_string(),
                message: format!("line {}: {message}", n + 1),
            })?;
            statements.push((n + 1, statement));
        }
        Ok(Self { statements })
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.statements.iter().filter_map(|(_, s)| match s {
            Statement::Rule { rule, .. } => Some(rule),
            _ => None,
        })
    }

    /// A fresh engine with everything in the program registered and the
    /// initial facts committed.
    pub fn build(&self, config: UbertsConfig) -> UbertsResult<Uberts> {
        self.build_with_schema(Arc::new(Schema::new()), config)
    }

    pub fn build_with_schema(&self, schema: Arc<Schema>, config: UbertsConfig) -> UbertsResult<Uberts> {
        let dimension = config.weight_dimension;
        let cap = config.num_args_cap;
        let mut engine = Uberts::with_schema(schema, config);
        let mut facts = Vec::new();
        for (line, statement) in &self.statements {
            match statement {
                Statement::Def {
                    relation,
                    head,
                    types,
                } => {
                    let schema = engine.schema();
                    let types: Vec<_> = types.iter().map(|t| schema.define_node_type(t)).collect();
                    match head {
                        Some(h) => {
                            let head = schema.define_node_type(h);
                            schema.define_relation_with_head(relation, &types, head)?;
                        }
                        None => {
                            schema.define_relation(relation, &types)?;
                        }
                    }
                }
                Statement::Rule { rule, score } => {
                    let has_rhs = rule.rhs.is_some();
                    let id = engine.add_rule(rule.clone())?;
                    if has_rhs {
                        engine.add_generator(id, RuleGenerator::constant(format!("line {line}"), *score))?;
                    }
                }
                Statement::Factor { kind, key, refine } => {
                    let group = GroupKey::parse(key, engine.schema())?;
                    let term = key_term(key)?;
                    match kind {
                        FactorKind::AtMostOne => {
                            engine.add_global_factor(AtMostOne::new(group))?;
                        }
                        FactorKind::AtLeastOne => {
                            engine.add_global_factor(AtLeastOne::new(group))?;
                        }
                        FactorKind::NumArgs => {
                            let table = Arc::new(WeightTable::new(format!("num_args/{}", term.relation), dimension));
                            let mut factor = NumArgs::new(group, table, cap);
                            if let Some(var) = refine {
                                factor = factor.with_refinement(var_position(&term, var, key)?);
                            }
                            let id = engine.add_rule(Rule::trigger(vec![term]))?;
                            engine.attach_global_factor(id, factor)?;
                        }
                    }
                }
                Statement::Fact {
                    relation,
                    head,
                    values,
                } => facts.push(make_fact(engine.schema(), relation, head.as_ref(), values)?),
            }
        }
        for fact in facts {
            engine.commit_initial_fact(fact)?;
        }
        Ok(engine)
    }
}

fn parse_statement(line: &str) -> Result<Statement, String> {
    let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match keyword {
        "def" => {
            let mut words = rest.split_whitespace();
            let name = words.next().ok_or("def needs a relation name")?;
            let mut types: Vec<String> = words.map(str::to_string).collect();
            match name.strip_suffix('\'') {
                Some(relation) => {
                    if types.is_empty() {
                        return Err(format!("def {name} needs a head type"));
                    }
                    let head = types.remove(0);
                    Ok(Statement::Def {
                        relation: relation.to_string(),
                        head: Some(head),
                        types,
                    })
                }
                None => Ok(Statement::Def {
                    relation: name.to_string(),
                    head: None,
                    types,
                }),
            }
        }
        "x" => {
            let mut words = rest.split_whitespace();
            let name = words.next().ok_or("x needs a relation name")?;
            let mut values: Vec<Value> = words.map(parse_value).collect();
            let (relation, head) = match name.strip_suffix('\'') {
                Some(relation) => {
                    if values.is_empty() {
                        return Err(format!("x {name} needs a head value"));
                    }
                    (relation, Some(values.remove(0)))
                }
                None => (name, None),
            };
            Ok(Statement::Fact {
                relation: relation.to_string(),
                head,
                values,
            })
        }
        "rule" => {
            let parts = split_top(rest, "@");
            let (text, score) = match parts.as_slice() {
                [text] => (*text, 1.0),
                [text, score] => {
                    let score = score
                        .trim()
                        .parse::<f64>()
                        .map_err(|e| format!("bad score '{}': {e}", score.trim()))?;
                    (*text, score)
                }
                _ => return Err("more than one '@'".to_string()),
            };
            let rule = Rule::parse(text).map_err(|e| e.to_string())?;
            Ok(Statement::Rule { rule, score })
        }
        "atmost1" | "atleast1" | "numargs" => {
            let kind = match keyword {
                "atmost1" => FactorKind::AtMostOne,
                "atleast1" => FactorKind::AtLeastOne,
                _ => FactorKind::NumArgs,
            };
            let (key, refine) = match rest.rsplit_once("refine=") {
                Some((key, var)) if kind == FactorKind::NumArgs => (key.trim(), Some(var.trim().to_string())),
                Some(_) => return Err(format!("{kind} takes no refinement")),
                None => (rest, None),
            };
            if key.is_empty() {
                return Err(format!("{kind} needs a key like rel(a, b):a"));
            }
            Ok(Statement::Factor {
                kind,
                key: key.to_string(),
                refine,
            })
        }
        other => Err(format!("unknown statement '{other}'")),
    }
}

fn parse_value(token: &str) -> Value {
    match token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(s) => Value::str(s),
        None => Value::parse(token),
    }
}

fn key_term(key: &str) -> UbertsResult<Term> {
    let term_text = key.split(':').next().unwrap_or_default();
    Term::parse(term_text)
}

fn var_position(term: &Term, var: &str, key: &str) -> UbertsResult<usize> {
    term.args
        .iter()
        .position(|a| matches!(a, TermArg::Var(v) if v == var))
        .ok_or_else(|| {
            RuleError::Parse {
                input: key.to_string(),
                message: format!("refinement variable '{var}' is not an argument of {term}"),
            }
            .into()
        })
}

fn make_fact(schema: &Schema, relation: &str, head: Option<&Value>, values: &[Value]) -> UbertsResult<Fact> {
    let Some(head) = head else {
        return schema.fact_from_values(relation, values);
    };
    let rel = schema.relation_by_name(relation)?;
    if values.len() != rel.arity() {
        return Err(SchemaError::ArityMismatch {
            relation: relation.to_string(),
            expected: rel.arity(),
            actual: values.len(),
        }
        .into());
    }
    let tail: Vec<_> = rel
        .arg_types
        .iter()
        .zip(values)
        .map(|(t, v)| schema.intern_node(*t, v.clone()))
        .collect();
    let head = schema.intern_node(rel.head_type, head.clone());
    schema.make_fact_with_head(rel.id, head, &tail)
}
