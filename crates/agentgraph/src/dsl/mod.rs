//! The graph description language: JSON decode, validation, state-schema
//! inference, a CEL-subset expression compiler, and the compile step that
//! turns a description into the IR the engine executes.

pub mod ast;
pub mod cel;
pub mod codegen;
pub mod compiler;
pub mod parser;
pub mod schema_infer;
pub mod validator;

pub use ast::GraphDescription;
pub use cel::{compile as compile_expr, Expr, ExprError};
pub use compiler::{compile, CompileError, CompiledGraphDef};
pub use parser::{parse, ParseError, ParseMode};
pub use schema_infer::{infer_schema, SchemaError};
pub use validator::{validate, ValidationError};
