use quill_syntax::build::*;
use quill_syntax::{Ast, DataType, Diagnostics, Module, NodeId, NodeKind, Severity, Stage, TreeNode};

use crate::signatures::{BinaryOperator, resolve_binary};
use crate::symbols::Symbol;
use crate::{Analyzer, CompileOptions, SymbolTable, analyze_modules, resolve};

struct Compiled {
    modules: Vec<Module>,
    table: SymbolTable,
    diagnostics: Diagnostics,
}

impl Compiled {
    fn ast(&self, module: &str) -> &Ast {
        self.modules
            .iter()
            .find(|m| m.name == module)
            .and_then(|m| m.result.ast.as_ref())
            .expect("module has a tree")
    }

    fn nodes(&self, module: &str, kind: NodeKind) -> Vec<NodeId> {
        let ast = self.ast(module);
        ast.preorder().into_iter().filter(|&id| ast.kind(id) == kind).collect()
    }

    fn errors(&self) -> Vec<String> {
        self.diagnostics.errors().map(|d| d.message.clone()).collect()
    }
}

fn compile(trees: Vec<(&str, TreeNode)>) -> Compiled {
    compile_with(trees, &CompileOptions::default())
}

fn compile_with(trees: Vec<(&str, TreeNode)>, options: &CompileOptions) -> Compiled {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut modules: Vec<Module> = trees
        .iter()
        .map(|(name, tree)| Module::from_tree(*name, tree))
        .collect();
    let mut table = SymbolTable::new();
    let mut diagnostics = Diagnostics::new();
    analyze_modules(&mut modules, &mut table, &mut diagnostics, options);
    Compiled {
        modules,
        table,
        diagnostics,
    }
}

fn single(items: Vec<TreeNode>) -> Compiled {
    compile(vec![("main", program("main", items))])
}

fn assert_single_error(compiled: &Compiled, fragment: &str) {
    let errors = compiled.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains(fragment), "{errors:?}");
}

// ── Scenario ────────────────────────────────────────────────

#[test]
fn increment_global_type_checks_cleanly() {
    let compiled = single(vec![
        global("int", "x", Some(int("5"))),
        function(
            "bump",
            "int",
            vec![],
            vec![
                assign(ident("x"), binary("+", ident("x"), int("1"))),
                ret(ident("x")),
            ],
        ),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
    let ast = compiled.ast("main");
    for add in compiled.nodes("main", NodeKind::BinaryOp) {
        assert_eq!(ast[add].data_type, Some(DataType::Int));
    }
    for id in ast.preorder() {
        assert!(ast[id].scope.is_some(), "{:?} has no scope", ast.kind(id));
        assert!(ast[id].data_type.is_some(), "{:?} has no type", ast.kind(id));
    }
}

#[test]
fn annotation_is_idempotent() {
    let mut compiled = single(vec![
        structure("Pair", vec![field("int", "a"), field("long", "b")]),
        global("int", "x", Some(int("5"))),
        function(
            "f",
            "long",
            vec![param("Pair", "p")],
            vec![
                var("int", "y", Some(binary("*", ident("x"), int("2")))),
                if_(binary("<", ident("y"), int("3")), vec![assign(ident("x"), ident("y"))]),
                ret(access(ident("p"), "b")),
            ],
        ),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
    let snapshot = |ast: &Ast| -> Vec<_> {
        ast.preorder()
            .into_iter()
            .map(|id| (ast[id].scope, ast[id].data_type.clone()))
            .collect()
    };
    let before = snapshot(compiled.ast("main"));

    let options = CompileOptions::default();
    let Compiled {
        modules,
        table,
        diagnostics,
    } = &mut compiled;
    let module = &mut modules[0];
    let ast = module.result.ast.as_mut().unwrap();
    let mut analyzer = Analyzer::new(&module.name, ast, table, diagnostics, &options);
    analyzer.assign_scopes();
    analyzer.assign_types();

    assert_eq!(snapshot(compiled.ast("main")), before);
    assert!(compiled.diagnostics.is_empty());
}

// ── Types ───────────────────────────────────────────────────

fn operator_case(op: BinaryOperator, left: &DataType, right: &DataType) -> Compiled {
    let expr = if op.takes_type_operand() {
        binary(op.lexeme(), ident("a"), ty(&right.to_string()))
    } else {
        binary(op.lexeme(), ident("a"), ident("b"))
    };
    single(vec![function(
        "apply",
        "void",
        vec![param(&left.to_string(), "a"), param(&right.to_string(), "b")],
        vec![expr],
    )])
}

#[test]
fn every_operator_pair_matches_its_signature_table() {
    for op in BinaryOperator::ALL {
        for left in DataType::SCALARS {
            for right in DataType::SCALARS {
                let compiled = operator_case(op, &left, &right);
                let node = compiled.nodes("main", NodeKind::BinaryOp)[0];
                let actual = compiled.ast("main")[node].data_type.clone();
                let type_errors = compiled
                    .diagnostics
                    .errors()
                    .filter(|d| d.stage == Stage::Type)
                    .count();
                match resolve_binary(op, &left, &right) {
                    Some(expected) => {
                        assert_eq!(actual, Some(expected), "{left} {} {right}", op.lexeme());
                        assert_eq!(type_errors, 0, "{left} {} {right}", op.lexeme());
                    }
                    None => {
                        assert_eq!(actual, Some(DataType::Invalid), "{left} {} {right}", op.lexeme());
                        assert_eq!(type_errors, 2, "{left} {} {right}", op.lexeme());
                    }
                }
            }
        }
    }
}

#[test]
fn invalid_operands_do_not_cascade() {
    let compiled = single(vec![function(
        "f",
        "int",
        vec![],
        vec![ret(binary("+", ident("nope"), int("1")))],
    )]);
    assert_single_error(&compiled, "`nope` is not declared");
}

#[test]
fn oversized_literal_is_invalid() {
    let compiled = single(vec![global("int", "x", Some(int("4294967296")))]);
    assert_single_error(&compiled, "does not fit in int");
    let literal = compiled.nodes("main", NodeKind::Literal)[0];
    assert_eq!(compiled.ast("main")[literal].data_type, Some(DataType::Invalid));
}

#[test]
fn negated_literals_stop_at_the_signed_minimum() {
    let compiled = single(vec![
        global("int", "low", Some(unary("-", int("2147483648")))),
        global("long", "lowest", Some(unary("-", int("9223372036854775808l")))),
        global("int", "hex", Some(unary("-", int("0x80000000")))),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());

    let compiled = single(vec![function(
        "f",
        "int",
        vec![],
        vec![ret(unary("-", int("4294967295")))],
    )]);
    assert_single_error(&compiled, "literal `-4294967295` does not fit in int");
    let negation = compiled.nodes("main", NodeKind::UnaryOp)[0];
    assert_eq!(compiled.ast("main")[negation].data_type, Some(DataType::Invalid));

    let compiled = single(vec![global(
        "long",
        "wrapped",
        Some(unary("-", int("9223372036854775809l"))),
    )]);
    assert_single_error(&compiled, "does not fit in long");
}

#[test]
fn signed_literal_text_is_malformed() {
    let compiled = single(vec![global("int", "x", Some(int("+5")))]);
    assert_single_error(&compiled, "malformed numeric literal `+5`");
}

#[test]
fn suffixes_pick_literal_types() {
    let compiled = single(vec![
        global("uint", "a", Some(int("0xFFu"))),
        global("long", "b", Some(int("0b101l"))),
        global("ulong", "c", Some(int("7ul"))),
        global("float", "d", Some(float("1.5f"))),
        global("double", "e", Some(unary("-", float("2.0")))),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
}

#[test]
fn global_initializer_must_be_constant() {
    let compiled = single(vec![
        global("int", "a", Some(int("1"))),
        global("int", "b", Some(binary("+", ident("a"), int("1")))),
    ]);
    assert_single_error(&compiled, "must be a constant");
}

#[test]
fn no_implicit_widening_on_assignment() {
    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![var("long", "wide", Some(int("1")))],
    )]);
    assert_single_error(&compiled, "cannot initialize `wide` of type `long`");
}

#[test]
fn explicit_conversions() {
    let compiled = single(vec![function(
        "f",
        "double",
        vec![param("int", "i")],
        vec![
            var("float", "bits", Some(bitcast(ident("i"), "float"))),
            ret(convert(ident("bits"), "double")),
        ],
    )]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
}

#[test]
fn booleans_convert_to_and_from_numbers() {
    for target in DataType::SCALARS {
        let compiled = single(vec![function(
            "f",
            &target.to_string(),
            vec![],
            vec![ret(convert(boolean(true), &target.to_string()))],
        )]);
        assert!(compiled.diagnostics.is_empty(), "bool as {target}: {:?}", compiled.errors());
    }
    for source in DataType::SCALARS {
        let compiled = single(vec![function(
            "f",
            "bool",
            vec![param(&source.to_string(), "x")],
            vec![ret(convert(ident("x"), "bool"))],
        )]);
        assert!(compiled.diagnostics.is_empty(), "{source} as bool: {:?}", compiled.errors());
    }
}

// ── Declarations and scopes ─────────────────────────────────

#[test]
fn duplicate_declarations_are_reported() {
    let compiled = single(vec![
        global("int", "x", None),
        global("long", "x", None),
    ]);
    assert_single_error(&compiled, "`x` already found");

    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![var("int", "y", None), var("int", "y", None)],
    )]);
    assert_single_error(&compiled, "`y` already found");
}

#[test]
fn inner_blocks_shadow_outer_names() {
    let compiled = single(vec![
        global("int", "x", None),
        function(
            "f",
            "long",
            vec![],
            vec![var("long", "x", Some(int("2l"))), ret(ident("x"))],
        ),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
}

#[test]
fn locals_are_not_visible_before_their_declaration() {
    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![assign(ident("later"), int("1")), var("int", "later", None)],
    )]);
    assert_single_error(&compiled, "`later` is not declared");
}

#[test]
fn functions_and_structs_are_hoisted() {
    let compiled = single(vec![
        function(
            "first",
            "int",
            vec![],
            vec![var("Late", "l", None), ret(call_path("second", vec![access(ident("l"), "v")]))],
        ),
        function("second", "int", vec![param("int", "v")], vec![ret(ident("v"))]),
        structure("Late", vec![field("int", "v")]),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
}

#[test]
fn unknown_struct_type() {
    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![var("Ghost", "g", None)],
    )]);
    assert_single_error(&compiled, "no struct named `Ghost`");
}

#[test]
fn assigning_to_constants_is_rejected() {
    let compiled = single(vec![
        global("int", "limit", Some(int("10"))),
        function(
            "f",
            "void",
            vec![],
            vec![assign(ident("limit"), int("11"))],
        ),
    ]);
    assert!(compiled.diagnostics.is_empty());

    let compiled = single(vec![
        constant(global("int", "limit", Some(int("10")))),
        function(
            "f",
            "void",
            vec![],
            vec![assign(ident("limit"), int("11"))],
        ),
    ]);
    assert_single_error(&compiled, "cannot assign to constant `limit`");
}

// ── Layout ──────────────────────────────────────────────────

#[test]
fn mapped_struct_array_leaves_are_addressable() {
    let compiled = single(vec![
        structure("Point", vec![field("int", "x"), field("int", "y")]),
        map("Point[2]", "pts", Some(64)),
        function(
            "f",
            "void",
            vec![],
            vec![assign(access(index(ident("pts"), int("1")), "y"), int("7"))],
        ),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
    let target = compiled.nodes("main", NodeKind::Access)[0];
    let var = resolve::variable(&compiled.table, compiled.ast("main"), target).unwrap();
    let v = compiled.table.variable(var);
    assert!(v.mapped && v.global);
    assert_eq!((v.offset, v.size), (64 + 8 + 4, 4));
    assert_eq!(compiled.table.qualified_name(var, false), "pts.1.y");
}

#[test]
fn mapped_variables_follow_each_other() {
    let compiled = single(vec![
        map("long", "a", None),
        map("int[3]", "b", None),
        map("bool", "c", None),
        map("int", "pinned", Some(1024)),
        map("int", "d", None),
    ]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
    let program = compiled.table.find_module("main").unwrap();
    let offset = |name: &str| match compiled.table.member(program, name) {
        Some(Symbol::Variable(v)) => compiled.table.variable(v).offset,
        other => panic!("{name}: {other:?}"),
    };
    assert_eq!(
        [offset("a"), offset("b"), offset("c"), offset("pinned"), offset("d")],
        [0, 8, 20, 1024, 1028]
    );
}

#[test]
fn self_containing_struct_is_a_layout_error() {
    let options = CompileOptions {
        max_layout_depth: 4,
        ..CompileOptions::default()
    };
    let compiled = compile_with(
        vec![(
            "main",
            program(
                "main",
                vec![
                    structure("Node", vec![field("Node", "next")]),
                    global("Node", "head", None),
                ],
            ),
        )],
        &options,
    );
    let layout_errors: Vec<_> = compiled
        .diagnostics
        .errors()
        .filter(|d| d.stage == Stage::Layout)
        .collect();
    assert_eq!(layout_errors.len(), 1, "{:?}", compiled.errors());
}

#[test]
fn constant_index_out_of_range() {
    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![
            var("int[2]", "pair", None),
            assign(index(ident("pair"), int("2")), int("0")),
        ],
    )]);
    assert_single_error(&compiled, "index 2 is out of range");
}

#[test]
fn dynamic_index_requires_mapped_array() {
    let compiled = single(vec![
        map("int[8]", "table", None),
        function(
            "f",
            "int",
            vec![param("int", "i")],
            vec![
                var("int[8]", "local", None),
                assign(index(ident("local"), ident("i")), int("1")),
                ret(index(ident("table"), ident("i"))),
            ],
        ),
    ]);
    assert_single_error(&compiled, "can only be indexed by a constant");
}

// ── Statements ──────────────────────────────────────────────

#[test]
fn call_arity_and_argument_types() {
    let compiled = single(vec![
        function(
            "add",
            "long",
            vec![param("int", "a"), param("long", "b")],
            vec![ret(binary("+", convert(ident("a"), "long"), ident("b")))],
        ),
        function(
            "f",
            "void",
            vec![],
            vec![
                call_path("add", vec![int("1")]),
                call_path("add", vec![int("1"), int("2")]),
            ],
        ),
    ]);
    let errors = compiled.errors();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors[0].contains("expects 2 argument(s) but 1 were given"));
    assert!(errors[1].contains("the 2nd parameter of `add` expects `long` but got `int`"));
}

#[test]
fn returns_match_the_enclosing_function() {
    let compiled = single(vec![
        function("v", "void", vec![], vec![ret(int("1"))]),
        function("i", "int", vec![], vec![ret_void()]),
        function("l", "long", vec![], vec![ret(int("1"))]),
    ]);
    let errors = compiled.errors();
    assert_eq!(errors.len(), 3, "{errors:?}");
}

#[test]
fn control_flow_placement() {
    let compiled = single(vec![function(
        "f",
        "void",
        vec![],
        vec![
            brk(),
            else_(vec![]),
            while_(int("1"), vec![cont()]),
            if_(boolean(true), vec![]),
            else_if(boolean(false), vec![]),
            else_(vec![]),
        ],
    )]);
    let errors = compiled.errors();
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("outside of a loop")));
    assert!(errors.iter().any(|e| e.contains("without a preceding `if`")));
    assert!(errors.iter().any(|e| e.contains("condition must be `bool`")));
}

#[test]
fn builtins_resolve_from_every_module() {
    let compiled = single(vec![function(
        "f",
        "double",
        vec![param("int", "addr")],
        vec![
            call_path("int.store", vec![ident("addr"), call_path("memory.size", vec![])]),
            ret(call_path("double.sqrt", vec![call_path("double.load", vec![ident("addr")])])),
        ],
    )]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
}

// ── Linking ─────────────────────────────────────────────────

fn library() -> TreeNode {
    program(
        "lib",
        vec![
            exported(structure("Vec2", vec![field("float", "x"), field("float", "y")])),
            exported(global("int", "counter", Some(int("1")))),
            global("int", "hidden", Some(int("2"))),
            exported(function(
                "square",
                "int",
                vec![param("int", "v")],
                vec![ret(binary("*", ident("v"), ident("v")))],
            )),
        ],
    )
}

#[test]
fn import_order_puts_sources_first_and_cycles_last() {
    let modules: Vec<Module> = [
        program("c", vec![import("b", Vec::new())]),
        program("x", vec![import("y", Vec::new()), import("missing", Vec::new())]),
        program("b", vec![import("a", Vec::new())]),
        program("y", vec![import("x", Vec::new())]),
        program("a", Vec::new()),
    ]
    .iter()
    .map(|tree| Module::from_tree(tree.token.lexeme.clone(), tree))
    .collect();

    let order = crate::import_order(&modules);
    assert_eq!(order.ordered, vec![4, 2, 0]);
    assert_eq!(order.cyclic, vec![1, 3]);
}

#[test]
fn importing_an_unexported_symbol_reports_once() {
    let app = program(
        "app",
        vec![import(
            "lib",
            vec![import_item("counter", None), import_item("hidden", None)],
        )],
    );
    // the importer comes first: hoisting finishes before any linking
    let compiled = compile(vec![("app", app), ("lib", library())]);
    assert_single_error(&compiled, "`hidden` is not exported by module `lib`");

    let app_scope = compiled.table.find_module("app").unwrap();
    let Some(Symbol::Variable(counter)) = compiled.table.lookup(app_scope, "counter") else {
        panic!("counter should be imported");
    };
    let v = compiled.table.variable(counter);
    assert_eq!(v.data_type, DataType::Int);
    assert_eq!(v.import.as_deref(), Some("lib"));
}

#[test]
fn missing_modules_and_symbols() {
    let app = program(
        "app",
        vec![
            import("nowhere", vec![]),
            import("lib", vec![import_item("cube", None)]),
        ],
    );
    let compiled = compile(vec![("app", app), ("lib", library())]);
    let errors = compiled.errors();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors[0].contains("no module named `nowhere`"));
    assert!(errors[1].contains("no symbol named `cube`"));
}

#[test]
fn namespace_imports_expose_exported_symbols() {
    let app = program(
        "app",
        vec![
            import("lib", vec![]),
            function(
                "run",
                "float",
                vec![],
                vec![
                    var("lib.Vec2", "v", None),
                    assign(ident("counter_copy"), call_path("lib.square", vec![ident("lib_counter")])),
                    ret(access(ident("v"), "y")),
                ],
            ),
            global("int", "counter_copy", None),
            global("int", "lib_counter", None),
        ],
    );
    let compiled = compile(vec![("lib", library()), ("app", app)]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());

    let app_scope = compiled.table.find_module("app").unwrap();
    let Some(Symbol::Scope(ns)) = compiled.table.member(app_scope, "lib") else {
        panic!("namespace missing");
    };
    assert!(compiled.table.member(ns, "hidden").is_none());
    assert!(compiled.table.member(ns, "counter").is_some());
}

#[test]
fn aliased_imports_keep_their_original_name() {
    let app = program(
        "app",
        vec![
            import("lib", vec![import_item("square", Some("sq"))]),
            function("run", "int", vec![], vec![ret(call_path("sq", vec![int("3")]))]),
        ],
    );
    let compiled = compile(vec![("lib", library()), ("app", app)]);
    assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.errors());
    let call = compiled.nodes("app", NodeKind::FunctionCall)[0];
    let func = resolve::function(&compiled.table, compiled.ast("app"), call).unwrap();
    let f = compiled.table.function(func);
    assert_eq!(f.name, "sq");
    assert_eq!(f.alias.as_deref(), Some("square"));
    assert_eq!(f.import.as_deref(), Some("lib"));
}

#[test]
fn diagnostics_carry_module_and_position() {
    let app = program(
        "app",
        vec![function(
            "f",
            "void",
            vec![],
            vec![assign(ident("ghost").at(3, 5), int("1"))],
        )],
    );
    let compiled = compile(vec![("app", app)]);
    let diagnostic = compiled.diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.stage, Stage::Scope);
    assert_eq!((diagnostic.module.as_str(), diagnostic.row, diagnostic.column), ("app", 3, 5));
    assert_eq!(diagnostic.length, 5);
    assert_eq!(
        diagnostic.to_string(),
        "app:3:5: error[scope]: `ghost` is not declared"
    );
}
