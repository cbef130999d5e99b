//! WebAssembly emission for analyzed Quill modules.
//!
//! The generator reads the trees and the shared symbol table the analyzer
//! produced and writes one standalone binary per module. Encoding is done
//! in-crate ([`writer`], [`binary`], [`instructions`]) so every byte of the
//! output is under this crate's control.

pub mod binary;
mod codegen;
pub mod instructions;
pub mod writer;

pub use codegen::{CodegenError, WasmCodegen};
pub use writer::{ReadError, Reader, Writer};

use quill_analyzer::{CompileOptions, SymbolTable, analyze_modules};
use quill_syntax::{Diagnostics, Module, Span, Stage};

/// Generate a binary for every analyzed module.
///
/// Modules that already carry errors are skipped. A module whose generation
/// fails, or records any error, is left without a buffer.
pub fn compile_modules(
    modules: &mut [Module],
    table: &SymbolTable,
    diagnostics: &mut Diagnostics,
    options: &CompileOptions,
) {
    for module in modules.iter_mut() {
        let Module { name, result, .. } = module;
        let name = name.as_str();
        result.buffer = None;
        result.success = false;
        let Some(ast) = result.ast.as_mut() else {
            continue;
        };
        if diagnostics.has_errors_for(name) {
            log::debug!("skipping generation for `{name}`: analysis reported errors");
            continue;
        }

        let generated = WasmCodegen::new(name, table, options, diagnostics)
            .and_then(|mut codegen| codegen.compile(ast));
        match generated {
            Ok(bytes) if !diagnostics.has_errors_for(name) => {
                log::debug!("module `{name}`: {} byte(s)", bytes.len());
                result.buffer = Some(bytes);
                result.success = true;
            }
            Ok(_) => {}
            Err(CodegenError::Error {
                message,
                line,
                column,
                length,
            }) => {
                diagnostics.error(Stage::Codegen, name, Span::new(line, column, length), message);
            }
        }
    }
}

/// Analyze and generate a whole compilation, returning every diagnostic
pub fn compile_all(modules: &mut [Module], options: &CompileOptions) -> Diagnostics {
    let mut table = SymbolTable::new();
    let mut diagnostics = Diagnostics::new();
    analyze_modules(modules, &mut table, &mut diagnostics, options);
    compile_modules(modules, &table, &mut diagnostics, options);
    diagnostics
}
