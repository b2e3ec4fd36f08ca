//! Abstract syntax tree for Kyra source. See spec.md §6 for the grammar
//! sketch and §4.5 for the statement forms it allows in practice — `return`
//! and `leave` carry their own shapes beyond the plain `IDENT '(' args ')'`
//! call form.

use crate::error::Span;

/// A fully parsed Kyra source file, before label resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// `key: value` pairs from `strings = { ... }`, in declaration order —
    /// that order defines TEXT indices.
    pub strings: Vec<(String, String)>,
    /// `globals = [ ... ]`, if present. Absent means no `globals`/`entries`
    /// declaration was written at all (legacy `entry(i, off)` statements
    /// are used instead).
    pub globals: Option<Vec<GlobalEntry>>,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalEntry {
    Name(String),
    Number(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Label { name: String, span: Span },
    Call(Call),
    Return { expr: Arg, drop: Option<i64>, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
    pub span: Span,
}

/// One call argument. `Ident` is deliberately untyped at parse time — it
/// might name `acc`, a label/global/func target, or a string key; the
/// lowerer disambiguates once it has the symbol tables built.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(i64),
    Ident(String),
    Call(Call),
}
