//! Rules: syntax, compilation against a schema, and the join trie.

pub mod compile;
pub mod term;
pub mod trie;

pub use compile::{CompiledRule, RuleId};
pub use term::{Rule, Term, TermArg};
pub use trie::{Bindings, Match, PatternTrie, TrieStats};
