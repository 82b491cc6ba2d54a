//! Single-pass compiler pipeline. Stages, in order:
//! - `source` yields the input file line by line.
//! - `pool` interns identifiers and stores string literals.
//! - `tokenizer` turns lines into tokens on demand.
//! - `parser` pulls tokens and builds the arena-backed `ast`.
//! - `codegen` lowers the tree into x86-64 AT&T assembly.
//! - `error` centralises fatal errors and non-fatal diagnostics.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod location;
pub mod parser;
pub mod pool;
pub mod source;
pub mod tokenizer;
pub mod ty;

use std::fs;
use std::path::Path;

use snafu::ResultExt;
use tracing::{debug, info, warn};

pub use config::{Config, FramePolicy};
pub use error::{CompileError, CompileResult, Diagnostic, Severity};

use error::WriteOutputSnafu;
use pool::{IdentPool, StringPool};
use source::SourceLines;
use tokenizer::Lexer;

/// Run the whole pipeline over an already opened source.
fn compile_source(source: SourceLines, config: &Config) -> CompileResult<String> {
  let mut idents = IdentPool::new(config.ident_block_size);
  let mut strings = StringPool::new(config.string_block_size);
  let mut lexer = Lexer::new(source);

  info!("parsing");
  let ast = parser::parse(&mut lexer, &mut idents, &mut strings)?;
  debug!("ast:\n{}", ast.dump(&idents));

  info!("generating");
  let generated = codegen::generate(&ast, &idents, config)?;

  let mut diagnostics = lexer.diagnostics().to_vec();
  diagnostics.extend(generated.diagnostics);
  if diagnostics.iter().any(Diagnostic::is_error) {
    return Err(CompileError::Rejected { diagnostics });
  }
  for diagnostic in &diagnostics {
    warn!("{diagnostic}");
  }
  Ok(generated.asm)
}

/// Compile in-memory source text into AT&T assembly.
pub fn generate_assembly(file_name: &str, text: &str, config: &Config) -> CompileResult<String> {
  compile_source(SourceLines::from_source(file_name, text), config)
}

/// Compile `source_path` and write the listing to `output_path`. The output
/// file is only created once generation has succeeded.
pub fn compile_file(source_path: &Path, output_path: &Path, config: &Config) -> CompileResult<()> {
  info!(source = %source_path.display(), "compiling");
  let source = SourceLines::open(source_path)?;
  let asm = compile_source(source, config)?;
  fs::write(output_path, asm).context(WriteOutputSnafu { path: output_path })?;
  info!(output = %output_path.display(), "done");
  Ok(())
}
