//! Rule syntax: terms, rules and their text form.
//!
//! ```text
//! foo(x, y) & bar(y, z) => baz(x, z)   # comment
//! event'(e, t) & role(e, "agent") => agent(t)
//! ```
//!
//! A term is `relation(arg, ...)`; a primed term `relation'(h, arg, ...)`
//! additionally binds the fact's head to `h`. Arguments are variables
//! (identifiers), `_` (a fresh variable per occurrence), integers or quoted
//! strings. A rule without `=>` is a bare trigger: it matches but proposes
//! nothing by itself, and is used to hang global factors on.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RuleError, UbertsResult};
use crate::node::Value;

// ---------------------------------------------------------------------------
// Term arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermArg {
    Var(String),
    Const(Value),
}

impl TermArg {
    pub fn var(name: &str) -> Self {
        TermArg::Var(name.to_string())
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            TermArg::Var(v) => Some(v),
            TermArg::Const(_) => None,
        }
    }

    fn parse(token: &str, fresh: &mut usize) -> Result<Self, String> {
        let token = token.trim();
        if token.is_empty() {
            return Err("empty argument".to_string());
        }
        if token == "_" {
            *fresh += 1;
            return Ok(TermArg::Var(format!("_{fresh}")));
        }
        if let Some(inner) = token.strip_prefix('"') {
            let inner = inner
                .strip_suffix('"')
                .ok_or_else(|| format!("unterminated string {token}"))?;
            return Ok(TermArg::Const(Value::str(inner)));
        }
        if let Ok(i) = token.parse::<i64>() {
            return Ok(TermArg::Const(Value::Int(i)));
        }
        if token
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Ok(TermArg::Var(token.to_string()));
        }
        Err(format!("bad argument '{token}'"))
    }
}

impl fmt::Display for TermArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermArg::Var(v) => write!(f, "{v}"),
            TermArg::Const(Value::Str(s)) => write!(f, "\"{s}\""),
            TermArg::Const(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// One `relation(args)` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub relation: String,
    /// Set for primed terms: what the fact's head must bind to.
    pub head: Option<TermArg>,
    pub args: Vec<TermArg>,
}

impl Term {
    pub fn new(relation: &str, args: Vec<TermArg>) -> Self {
        Self {
            relation: relation.to_string(),
            head: None,
            args,
        }
    }

    /// Shorthand for a term whose arguments are all variables.
    pub fn vars(relation: &str, vars: &[&str]) -> Self {
        Self::new(relation, vars.iter().map(|v| TermArg::var(v)).collect())
    }

    pub fn with_head(mut self, head: TermArg) -> Self {
        self.head = Some(head);
        self
    }

    /// Variables mentioned anywhere in the term, head included.
    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.head
            .iter()
            .chain(self.args.iter())
            .filter_map(TermArg::as_var)
    }

    pub fn parse(text: &str) -> UbertsResult<Self> {
        let mut fresh = 0;
        Self::parse_with(text, &mut fresh).map_err(|message| {
            RuleError::Parse {
                input: text.trim().to_string(),
                message,
            }
            .into()
        })
    }

    fn parse_with(text: &str, fresh: &mut usize) -> Result<Self, String> {
        let text = text.trim();
        let open = text
            .find('(')
            .ok_or_else(|| format!("expected '(' in term '{text}'"))?;
        let inner = text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| format!("expected ')' at the end of term '{text}'"))?;
        let name = text[..open].trim();
        let (name, primed) = match name.strip_suffix('\'') {
            Some(n) => (n.trim(), true),
            None => (name, false),
        };
        if name.is_empty() {
            return Err(format!("missing relation name in '{text}'"));
        }
        let mut args = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top(inner, ",")
                .into_iter()
                .map(|a| TermArg::parse(a, fresh))
                .collect::<Result<Vec<_>, _>>()?
        };
        let head = if primed {
            if args.is_empty() {
                return Err(format!("primed term '{text}' needs a head argument"));
            }
            Some(args.remove(0))
        } else {
            None
        };
        Ok(Term {
            relation: name.to_string(),
            head,
            args,
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relation)?;
        let mut parts: Vec<String> = Vec::with_capacity(self.args.len() + 1);
        if let Some(h) = &self.head {
            write!(f, "'")?;
            parts.push(h.to_string());
        }
        parts.extend(self.args.iter().map(ToString::to_string));
        write!(f, "({})", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// `lhs[0] & lhs[1] & ... => rhs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub lhs: Vec<Term>,
    pub rhs: Option<Term>,
}

impl Rule {
    pub fn new(lhs: Vec<Term>, rhs: Term) -> Self {
        Self { lhs, rhs: Some(rhs) }
    }

    /// A rule that only matches.
    pub fn trigger(lhs: Vec<Term>) -> Self {
        Self { lhs, rhs: None }
    }

    pub fn parse(text: &str) -> UbertsResult<Self> {
        let err = |message: String| RuleError::Parse {
            input: text.trim().to_string(),
            message,
        };
        let body = strip_comment(text).trim();
        if body.is_empty() {
            return Err(err("empty rule".to_string()).into());
        }
        let sides = split_top(body, "=>");
        let (lhs_text, rhs_text) = match sides.as_slice() {
            [lhs] => (*lhs, None),
            [lhs, rhs] => (*lhs, Some(*rhs)),
            _ => return Err(err("more than one '=>'".to_string()).into()),
        };
        let mut fresh = 0;
        let lhs = split_top(lhs_text, "&")
            .into_iter()
            .map(|t| Term::parse_with(t, &mut fresh))
            .collect::<Result<Vec<_>, _>>()
            .map_err(err)?;
        if lhs.is_empty() {
            return Err(err("left-hand side has no terms".to_string()).into());
        }
        let rhs = match rhs_text {
            Some(r) => Some(Term::parse_with(r, &mut fresh).map_err(err)?),
            None => None,
        };
        let rule = Rule { lhs, rhs };
        rule.check_bound()?;
        Ok(rule)
    }

    /// Every right-hand side variable must occur on the left.
    pub fn check_bound(&self) -> UbertsResult<()> {
        let Some(rhs) = &self.rhs else {
            return Ok(());
        };
        let bound: BTreeSet<&str> = self.lhs.iter().flat_map(Term::variables).collect();
        if let Some(v) = rhs.variables().find(|v| !bound.contains(v)) {
            return Err(RuleError::UnboundRhsVariable {
                rule: self.to_string(),
                variable: v.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs: Vec<String> = self.lhs.iter().map(ToString::to_string).collect();
        write!(f, "{}", lhs.join(" & "))?;
        if let Some(rhs) = &self.rhs {
            write!(f, " => {rhs}")?;
        }
        Ok(())
    }
}

/// Cut a trailing `# comment`, ignoring `#` inside quotes.
pub(crate) fn strip_comment(text: &str) -> &str {
    let mut in_quote = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '"' => in_quote = !in_quote,
            '#' if !in_quote => return &text[..i],
            _ => {}
        }
    }
    text
}

/// Split on `sep` outside parentheses and quotes.
pub(crate) fn split_top<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        let ch = rest.chars().next().unwrap_or(' ');
        match ch {
            '"' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            _ if !in_quote && depth == 0 && rest.starts_with(sep) => {
                parts.push(&text[start..i]);
                i += sep.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += ch.len_utf8();
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UbertsError;

    #[test]
    fn parse_simple_rule() {
        let r = Rule::parse("foo(x,y) & bar(y,z) => baz(x,z)").unwrap();
        assert_eq!(r.lhs.len(), 2);
        assert_eq!(r.lhs[1], Term::vars("bar", &["y", "z"]));
        assert_eq!(r.rhs, Some(Term::vars("baz", &["x", "z"])));
        assert_eq!(r.to_string(), "foo(x, y) & bar(y, z) => baz(x, z)");
    }

    #[test]
    fn parse_constants_primes_and_comments() {
        let r = Rule::parse(r#"event'(e, t) & role(e, "a#b", 3) => agent(t)  # note"#).unwrap();
        assert_eq!(r.lhs[0].head, Some(TermArg::var("e")));
        assert_eq!(r.lhs[0].args, vec![TermArg::var("t")]);
        assert_eq!(
            r.lhs[1].args,
            vec![
                TermArg::var("e"),
                TermArg::Const(Value::str("a#b")),
                TermArg::Const(Value::Int(3)),
            ]
        );
    }

    #[test]
    fn wildcards_are_distinct_variables() {
        let r = Rule::trigger(vec![Term::parse("pair(_, _)").unwrap()]);
        let vars: Vec<&str> = r.lhs[0].variables().collect();
        assert_eq!(vars.len(), 2);
        assert_ne!(vars[0], vars[1]);
    }

    #[test]
    fn trigger_without_rhs() {
        let r = Rule::parse("argument(t, f, s, k)").unwrap();
        assert!(r.rhs.is_none());
    }

    #[test]
    fn unbound_rhs_variable_is_rejected() {
        let err = Rule::parse("foo(x) => bar(x, y)").unwrap_err();
        assert!(matches!(
            err,
            UbertsError::Rule(RuleError::UnboundRhsVariable { ref variable, .. }) if variable == "y"
        ));
    }

    #[test]
    fn malformed_rules_are_parse_errors() {
        for bad in ["", "foo(x", "foo(x) => bar(x) => baz(x)", "(x)", "foo(x y)", "foo'()"] {
            let err = Rule::parse(bad).unwrap_err();
            assert!(matches!(err, UbertsError::Rule(RuleError::Parse { .. })), "{bad}");
        }
    }
}
