// tally — cost-bounded scripting language
//
// Library root. The front end (lexer, parser) produces an immutable AST; the
// eleven semantic passes fill side tables; the evaluator walks the tree.

pub mod annot;
pub mod arch;
pub mod ast;
pub mod bans;
pub mod builtins;
pub mod check;
pub mod constraint;
pub mod cost;
pub mod costing;
pub mod diag;
pub mod eval;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod plugin;
pub mod resolve;
pub mod scan;
pub mod session;
pub mod subst;
pub mod symbols;
pub mod transport;
pub mod typeck;
pub mod types;
pub mod typexpr;
pub mod value;

#[cfg(test)]
mod test_support;
