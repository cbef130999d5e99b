//! Semantic analysis for the Quill backend.
//!
//! A compilation shares one [`SymbolTable`] whose root scope holds the
//! builtin intrinsics. Each module's tree is hoisted, linked against its
//! siblings, then scoped, typed and checked in place; [`analyze_modules`]
//! runs those phases with the required barriers between modules.

mod analyzer;
pub mod builtins;
pub mod layout;
pub mod literal;
pub mod resolve;
pub mod signatures;
pub mod symbols;

pub use analyzer::{Analyzer, ImportOrder, analyze_modules, import_order};
pub use symbols::{FuncId, Function, Scope, StructId, Struct, Symbol, SymbolTable, VarId, Variable};

/// Knobs shared by the analyzer and the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Deepest struct/array nesting that layout will flatten
    pub max_layout_depth: usize,
    /// Minimum number of 64 KiB pages in the emitted memory
    pub memory_pages: u32,
    /// Emit the custom `name` section
    pub emit_names: bool,
    /// Function promoted to the start section when its signature allows
    pub start_function: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_layout_depth: 16,
            memory_pages: 1,
            emit_names: true,
            start_function: "main".to_string(),
        }
    }
}
