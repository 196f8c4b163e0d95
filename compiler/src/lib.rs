// hgc — HLS Graph Compiler
//
// Library root. Frontend (lexer, parser, resolve), lowering into the program
// graph, and DOT emission.

pub mod ast;
pub mod deref;
pub mod diag;
pub mod dot;
pub mod emit;
pub mod factor;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod lower;
pub mod options;
pub mod parser;
pub mod pipeline;
pub mod pragma;
pub mod resolve;
pub mod types;
pub mod vars;
