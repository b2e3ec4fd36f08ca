//! # EMC2 / Kyra
//!
//! A lossless assembler/disassembler pair for EMC2 conversation scripts and
//! their Kyra human-readable source form. See spec.md for the format this
//! crate targets.
//!
//! ## Pipeline
//!
//! Decompiling runs container parsing, then the disassembler's passes
//! (executed-PC discovery, label construction, structural hiding, text-key
//! inference, sugar folding). Compiling runs the inverse: pragma scan,
//! structured-control desugar, lexer, parser, lowerer, container join.
//!
//! ## Example
//!
//! ```rust,no_run
//! use emc2_kyra::{compile::compile, decompile::decompile};
//!
//! let bytes = std::fs::read("script.emc").unwrap();
//! let source = decompile(&bytes).unwrap();
//! let recompiled = compile(&source).unwrap();
//! assert_eq!(bytes, recompiled);
//! ```

pub mod compile;
pub mod container;
pub mod decompile;
pub mod desugar;
pub mod disasm;
pub mod error;
pub mod instr;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod pragma;
pub mod program;
pub mod word;
