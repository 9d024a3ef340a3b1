//! Rich diagnostic error types for the uberts engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`UbertsError`] wraps them all so
//! callers can propagate any of them with `?`.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the uberts engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum UbertsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agenda(#[from] AgendaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for uberts operations.
pub type UbertsResult<T> = std::result::Result<T, UbertsError>;

// ---------------------------------------------------------------------------
// Schema errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error(
        "schema mismatch for relation '{relation}': argument {position} expects \
         <{expected}>, got <{actual}>"
    )]
    #[diagnostic(
        code(uberts::schema::mismatch),
        help(
            "Every tail node must be interned with the node type declared for its \
             argument position. Look the node up with the relation's argument type."
        )
    )]
    SchemaMismatch {
        relation: String,
        position: String,
        expected: String,
        actual: String,
    },

    #[error("relation '{relation}' takes {expected} arguments, got {actual}")]
    #[diagnostic(
        code(uberts::schema::arity),
        help("Check the relation definition (`def {relation} <type> ...`).")
    )]
    ArityMismatch {
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown relation: {name}")]
    #[diagnostic(
        code(uberts::schema::unknown_relation),
        help("Define the relation with `define_relation` before using it.")
    )]
    UnknownRelation { name: String },

    #[error("unknown node type: {name}")]
    #[diagnostic(
        code(uberts::schema::unknown_node_type),
        help("Define the node type with `define_node_type` before using it.")
    )]
    UnknownNodeType { name: String },

    #[error("relation '{name}' is already defined")]
    #[diagnostic(
        code(uberts::schema::duplicate_relation),
        help("Relations are immutable once registered. Pick a different name.")
    )]
    DuplicateRelation { name: String },
}

// ---------------------------------------------------------------------------
// State errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("duplicate fact: {fact} is already committed")]
    #[diagnostic(
        code(uberts::state::duplicate_fact),
        help(
            "Committing a fact twice would corrupt the state indices. \
             Check `State::contains` before committing."
        )
    )]
    DuplicateFact { fact: String },
}

// ---------------------------------------------------------------------------
// Agenda errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AgendaError {
    #[error("fact {fact} is already on the agenda")]
    #[diagnostic(
        code(uberts::agenda::already_present),
        help(
            "To change the score of a pending fact, remove it first and push it \
             again with the new score."
        )
    )]
    AlreadyPresent { fact: String },

    #[error("fact {fact} is not on the agenda")]
    #[diagnostic(
        code(uberts::agenda::not_present),
        help("The fact was never pushed, or was already popped, committed or pruned.")
    )]
    NotPresent { fact: String },

    #[error("the agenda is empty")]
    #[diagnostic(
        code(uberts::agenda::empty),
        help("Check `Agenda::is_empty` before popping.")
    )]
    Empty,
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule parse error in '{input}': {message}")]
    #[diagnostic(
        code(uberts::rule::parse),
        help(
            "Rules look like `foo(x,y) & bar(y,z) => baz(x,z)`. Constants are \
             quoted strings or integers, and `rel'(e, ...)` binds the fact itself to `e`."
        )
    )]
    Parse { input: String, message: String },

    #[error("variable '{variable}' in the right-hand side of '{rule}' is not bound on the left")]
    #[diagnostic(
        code(uberts::rule::unbound_rhs),
        help("Every right-hand side variable must appear in some left-hand side term.")
    )]
    UnboundRhsVariable { rule: String, variable: String },

    #[error("term {term} has {actual} arguments but relation '{relation}' takes {expected}")]
    #[diagnostic(
        code(uberts::rule::term_arity),
        help("Check the relation definition against the rule text.")
    )]
    TermArity {
        term: String,
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "global factor '{factor}' wants to own score term '{term}' of relation \
         '{relation}', which is already owned by '{owner}'"
    )]
    #[diagnostic(
        code(uberts::rule::conflicting_global_factor),
        help(
            "At most one global factor may own a named score term per relation. \
             Merge the two factors or give the new one a different term name."
        )
    )]
    ConflictingGlobalFactor {
        factor: String,
        owner: String,
        relation: String,
        term: String,
    },

    #[error("unknown rule id {id}")]
    #[diagnostic(
        code(uberts::rule::unknown_rule),
        help("Use the RuleId returned by `add_rule`.")
    )]
    UnknownRule { id: usize },
}

// ---------------------------------------------------------------------------
// Run errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("transition generator for rule '{rule}' failed: {message}")]
    #[diagnostic(
        code(uberts::run::generator),
        help(
            "The run was aborted and the agenda and state were left as they were \
             for inspection. Generators are never retried."
        )
    )]
    Generator { rule: String, message: String },

    #[error("global factor '{factor}' failed: {message}")]
    #[diagnostic(
        code(uberts::run::factor),
        help("The run was aborted and the agenda and state were left as they were.")
    )]
    Factor { factor: String, message: String },

    #[error("feature extraction failed for {fact}: {message}")]
    #[diagnostic(
        code(uberts::run::features),
        help("Feature extractors are external collaborators; check their inputs.")
    )]
    Features { fact: String, message: String },

    #[error("engine cannot {action} while {status}")]
    #[diagnostic(
        code(uberts::run::invalid_transition),
        help("Call `reset()` to return a finished engine to the idle state.")
    )]
    InvalidTransition { action: String, status: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(uberts::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    #[diagnostic(
        code(uberts::config::parse),
        help("See `UbertsConfig` for the accepted keys.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write {path}")]
    #[diagnostic(
        code(uberts::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
