//! Quill backend driver.
//!
//! Reads one JSON syntax tree per module (as a front end serializes
//! [`TreeNode`]), analyzes the modules together and emits one WebAssembly
//! binary each, or links and runs them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use quill_analyzer::{CompileOptions, SymbolTable, analyze_modules, import_order};
use quill_codegen_wasm::compile_all;
use quill_syntax::{Diagnostics, Module, NodeKind, Severity, TreeNode};
use wasmtime::{Engine, Linker, Store, Val};


#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill backend - analyze syntax trees and emit WebAssembly")]
#[command(version)]
struct Cli {
    /// Log more (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every tree to `<module>.wasm`
    Build {
        /// JSON syntax trees, one per module
        #[arg(value_name = "TREE", required = true)]
        trees: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Analyze the trees and report diagnostics without emitting anything
    Check {
        #[arg(value_name = "TREE", required = true)]
        trees: Vec<PathBuf>,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Compile, link the modules in import order and run them
    Run {
        #[arg(value_name = "TREE", required = true)]
        trees: Vec<PathBuf>,

        /// Exported function to call after instantiation
        #[arg(long, value_name = "FUNCTION")]
        invoke: Option<String>,

        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct OptionArgs {
    /// Deepest struct/array nesting to flatten
    #[arg(long, default_value_t = 16)]
    max_depth: usize,

    /// Minimum number of 64 KiB memory pages
    #[arg(long, default_value_t = 1)]
    memory_pages: u32,

    /// Do not emit the `name` custom section
    #[arg(long)]
    no_names: bool,
}

impl OptionArgs {
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            max_layout_depth: self.max_depth,
            memory_pages: self.memory_pages,
            emit_names: !self.no_names,
            ..CompileOptions::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read `{}`: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot write `{}`: {source}", path.display())]
    Write { path: PathBuf, source: std::io::Error },
    #[error("`{}` is not a syntax tree: {source}", path.display())]
    Tree { path: PathBuf, source: serde_json::Error },
    #[error("module `{0}` is given twice")]
    DuplicateModule(String),
    #[error("compilation failed with {0} error(s)")]
    Compilation(usize),
    #[error("modules import each other in a cycle: {0}")]
    ImportCycle(String),
    #[error("no module exports a function named `{0}`")]
    MissingExport(String),
    #[error("`{0}` takes parameters and cannot be invoked from the command line")]
    NotInvocable(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<wasmtime::Error> for CliError {
    fn from(err: wasmtime::Error) -> Self {
        CliError::Runtime(format!("{err:#}"))
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Build {
            trees,
            output,
            options,
        } => cmd_build(&trees, &output, &options.compile_options()),
        Commands::Check { trees, options } => cmd_check(&trees, &options.compile_options()),
        Commands::Run {
            trees,
            invoke,
            options,
        } => cmd_run(&trees, invoke.as_deref(), &options.compile_options()),
    }
}

// ── Loading ─────────────────────────────────────────────────

/// Module name of a tree: the `Program` node's name, else the file stem
fn module_name(tree: &TreeNode, path: &Path) -> String {
    if tree.kind == NodeKind::Program && !tree.token.lexeme.is_empty() {
        return tree.token.lexeme.clone();
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

fn load_modules(paths: &[PathBuf]) -> Result<Vec<Module>, CliError> {
    let mut names = HashSet::new();
    let mut modules = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.clone(),
            source,
        })?;
        let tree: TreeNode = serde_json::from_str(&text).map_err(|source| CliError::Tree {
            path: path.clone(),
            source,
        })?;
        let name = module_name(&tree, path);
        if !names.insert(name.clone()) {
            return Err(CliError::DuplicateModule(name));
        }
        log::debug!("loaded `{name}` from {}", path.display());
        modules.push(Module::from_tree(name, &tree));
    }
    Ok(modules)
}

/// Print every diagnostic and return the number of errors
fn report(diagnostics: &Diagnostics) -> usize {
    for diagnostic in diagnostics.iter() {
        eprintln!("{diagnostic}");
    }
    diagnostics.errors().count()
}

fn compile(paths: &[PathBuf], options: &CompileOptions) -> Result<Vec<Module>, CliError> {
    let mut modules = load_modules(paths)?;
    let diagnostics = compile_all(&mut modules, options);
    match report(&diagnostics) {
        0 => Ok(modules),
        errors => Err(CliError::Compilation(errors)),
    }
}

// ── Commands ────────────────────────────────────────────────

fn cmd_build(paths: &[PathBuf], output: &Path, options: &CompileOptions) -> Result<(), CliError> {
    let modules = compile(paths, options)?;
    fs::create_dir_all(output).map_err(|source| CliError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    for module in &modules {
        let Some(bytes) = module.result.buffer.as_deref() else {
            continue;
        };
        let path = output.join(format!("{}.wasm", module.name));
        fs::write(&path, bytes).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;
        println!("Compiled {} -> {} ({} bytes)", module.name, path.display(), bytes.len());
    }
    Ok(())
}

fn cmd_check(paths: &[PathBuf], options: &CompileOptions) -> Result<(), CliError> {
    let mut modules = load_modules(paths)?;
    let mut table = SymbolTable::new();
    let mut diagnostics = Diagnostics::new();
    analyze_modules(&mut modules, &mut table, &mut diagnostics, options);

    let errors = report(&diagnostics);
    let warnings = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    println!(
        "{} module(s) checked: {} error(s), {} warning(s)",
        modules.len(),
        errors,
        warnings
    );
    match errors {
        0 => Ok(()),
        n => Err(CliError::Compilation(n)),
    }
}

fn cmd_run(paths: &[PathBuf], invoke: Option<&str>, options: &CompileOptions) -> Result<(), CliError> {
    let modules = compile(paths, options)?;
    let order = link_order(&modules)?;

    let engine = Engine::default();
    let mut store = Store::new(&engine, ());
    let mut linker = Linker::new(&engine);
    let mut instances = Vec::with_capacity(order.len());
    for index in order {
        let module = &modules[index];
        let Some(bytes) = module.result.buffer.as_deref() else {
            continue;
        };
        let compiled = wasmtime::Module::new(&engine, bytes)?;
        // start functions run here
        let instance = linker.instantiate(&mut store, &compiled)?;
        linker.instance(&mut store, &module.name, instance)?;
        log::debug!("instantiated `{}`", module.name);
        instances.push(instance);
    }

    let Some(name) = invoke else {
        return Ok(());
    };
    // the last module linked wins, so an entry module shadows its imports
    let func = instances
        .iter()
        .rev()
        .find_map(|instance| instance.get_func(&mut store, name))
        .ok_or_else(|| CliError::MissingExport(name.to_string()))?;
    let ty = func.ty(&store);
    if ty.params().len() > 0 {
        return Err(CliError::NotInvocable(name.to_string()));
    }
    let mut results = vec![Val::I32(0); ty.results().len()];
    func.call(&mut store, &[], &mut results)?;
    for value in &results {
        println!("{}", format_val(value));
    }
    Ok(())
}

/// Modules ordered so that every module comes after the ones it imports.
/// Instantiation cannot break a cycle, so any cycle is an error here.
fn link_order(modules: &[Module]) -> Result<Vec<usize>, CliError> {
    let order = import_order(modules);
    if !order.cyclic.is_empty() {
        let names: Vec<&str> = order.cyclic.iter().map(|&i| modules[i].name.as_str()).collect();
        return Err(CliError::ImportCycle(names.join(", ")));
    }
    Ok(order.ordered)
}

fn format_val(value: &Val) -> String {
    match value {
        Val::I32(v) => v.to_string(),
        Val::I64(v) => v.to_string(),
        Val::F32(bits) => f32::from_bits(*bits).to_string(),
        Val::F64(bits) => f64::from_bits(*bits).to_string(),
        other => format!("{other:?}"),
    }
}
