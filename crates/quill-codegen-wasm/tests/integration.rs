use quill_analyzer::CompileOptions;
use quill_codegen_wasm::compile_all;
use quill_syntax::build::*;
use quill_syntax::{Module, TreeNode};
use wasmtime::{Engine, Instance, Linker, Store, Val};

fn compile(trees: Vec<(&str, TreeNode)>) -> Vec<Module> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut modules: Vec<Module> = trees
        .iter()
        .map(|(name, tree)| Module::from_tree(*name, tree))
        .collect();
    let diagnostics = compile_all(&mut modules, &CompileOptions::default());
    assert!(!diagnostics.has_errors(), "{diagnostics:?}");
    for module in &modules {
        let bytes = module.result.buffer.as_deref().expect("module compiled");
        wasmparser::Validator::new()
            .validate_all(bytes)
            .expect("invalid wasm");
    }
    modules
}

fn instantiate(items: Vec<TreeNode>) -> (Store<()>, Instance) {
    let modules = compile(vec![("main", program("main", items))]);
    let bytes = modules[0].result.buffer.as_deref().expect("main compiled");
    let engine = Engine::default();
    let module = wasmtime::Module::new(&engine, bytes).expect("wasmtime accepts the module");
    let mut store = Store::new(&engine, ());
    let instance = Instance::new(&mut store, &module, &[]).expect("instantiation");
    (store, instance)
}

fn global_i32(store: &mut Store<()>, instance: &Instance, name: &str) -> i32 {
    let global = instance.get_global(&mut *store, name).expect("exported global");
    match global.get(&mut *store) {
        Val::I32(value) => value,
        other => panic!("`{name}` is {other:?}"),
    }
}

#[test]
fn factorial_with_a_while_loop() {
    let (mut store, instance) = instantiate(vec![exported(function(
        "fact",
        "long",
        vec![param("int", "n")],
        vec![
            var("long", "acc", Some(int("1L"))),
            var("int", "i", Some(int("2"))),
            while_(
                binary("<=", ident("i"), ident("n")),
                vec![
                    assign(ident("acc"), binary("*", ident("acc"), convert(ident("i"), "long"))),
                    assign(ident("i"), binary("+", ident("i"), int("1"))),
                ],
            ),
            ret(ident("acc")),
        ],
    ))]);
    let fact = instance
        .get_typed_func::<i32, i64>(&mut store, "fact")
        .expect("fact export");
    assert_eq!(fact.call(&mut store, 0).expect("call"), 1);
    assert_eq!(fact.call(&mut store, 5).expect("call"), 120);
    assert_eq!(fact.call(&mut store, 20).expect("call"), 2_432_902_008_176_640_000);
}

#[test]
fn break_and_continue_skip_and_stop() {
    // sum of odd numbers below the first multiple of 7 above `from`
    let (mut store, instance) = instantiate(vec![exported(function(
        "odd_sum",
        "int",
        vec![param("int", "from")],
        vec![
            var("int", "i", Some(ident("from"))),
            var("int", "sum", None),
            while_(
                boolean(true),
                vec![
                    assign(ident("i"), binary("+", ident("i"), int("1"))),
                    if_(binary("==", binary("%", ident("i"), int("7")), int("0")), vec![brk()]),
                    if_(binary("==", binary("%", ident("i"), int("2")), int("0")), vec![cont()]),
                    assign(ident("sum"), binary("+", ident("sum"), ident("i"))),
                ],
            ),
            ret(ident("sum")),
        ],
    ))]);
    let odd_sum = instance
        .get_typed_func::<i32, i32>(&mut store, "odd_sum")
        .expect("odd_sum export");
    // 1 + 3 + 5
    assert_eq!(odd_sum.call(&mut store, 0).expect("call"), 9);
    // 9 + 11 + 13
    assert_eq!(odd_sum.call(&mut store, 7).expect("call"), 33);
}

#[test]
fn if_chain_picks_one_arm() {
    let (mut store, instance) = instantiate(vec![exported(function(
        "grade",
        "int",
        vec![param("int", "score")],
        vec![
            var("int", "g", None),
            if_(binary(">=", ident("score"), int("90")), vec![assign(ident("g"), int("4"))]),
            else_if(binary(">=", ident("score"), int("75")), vec![assign(ident("g"), int("3"))]),
            else_if(binary(">=", ident("score"), int("50")), vec![assign(ident("g"), int("2"))]),
            else_(vec![assign(ident("g"), int("1"))]),
            ret(binary("*", ident("g"), int("10"))),
        ],
    ))]);
    let grade = instance
        .get_typed_func::<i32, i32>(&mut store, "grade")
        .expect("grade export");
    let results: Vec<i32> = [95, 80, 50, 10]
        .into_iter()
        .map(|s| grade.call(&mut store, s).expect("call"))
        .collect();
    assert_eq!(results, [40, 30, 20, 10]);
}

#[test]
fn mapped_arrays_live_in_exported_memory() {
    let (mut store, instance) = instantiate(vec![
        map("int[8]", "table", Some(16)),
        exported(function(
            "fill",
            "int",
            vec![param("int", "n")],
            vec![
                var("int", "i", None),
                var("int", "sum", None),
                while_(
                    binary("<", ident("i"), ident("n")),
                    vec![
                        assign(index(ident("table"), ident("i")), binary("*", ident("i"), ident("i"))),
                        assign(ident("sum"), binary("+", ident("sum"), index(ident("table"), ident("i")))),
                        assign(ident("i"), binary("+", ident("i"), int("1"))),
                    ],
                ),
                ret(ident("sum")),
            ],
        )),
    ]);
    let fill = instance
        .get_typed_func::<i32, i32>(&mut store, "fill")
        .expect("fill export");
    assert_eq!(fill.call(&mut store, 4).expect("call"), 14);

    let memory = instance.get_memory(&mut store, "memory").expect("memory export");
    let data = memory.data(&store);
    let third = i32::from_le_bytes([data[24], data[25], data[26], data[27]]);
    assert_eq!(third, 4);
    assert_eq!(&data[..16], &[0; 16]);
}

#[test]
fn structs_copy_leaf_by_leaf() {
    let (mut store, instance) = instantiate(vec![
        structure("Point", vec![field("int", "x"), field("int", "y")]),
        map("Point[2]", "saved", None),
        function(
            "dot",
            "int",
            vec![param("Point", "a"), param("Point", "b")],
            vec![ret(binary(
                "+",
                binary("*", access(ident("a"), "x"), access(ident("b"), "x")),
                binary("*", access(ident("a"), "y"), access(ident("b"), "y")),
            ))],
        ),
        exported(function(
            "roundtrip",
            "int",
            vec![param("int", "x"), param("int", "y"), param("int", "slot")],
            vec![
                var("Point", "p", None),
                assign(access(ident("p"), "x"), ident("x")),
                assign(access(ident("p"), "y"), ident("y")),
                assign(index(ident("saved"), ident("slot")), ident("p")),
                var("Point", "q", Some(index(ident("saved"), ident("slot")))),
                ret(call(ident("dot"), vec![ident("p"), ident("q")])),
            ],
        )),
    ]);
    let roundtrip = instance
        .get_typed_func::<(i32, i32, i32), i32>(&mut store, "roundtrip")
        .expect("roundtrip export");
    assert_eq!(roundtrip.call(&mut store, (3, 4, 1)).expect("call"), 25);

    let memory = instance.get_memory(&mut store, "memory").expect("memory export");
    let data = memory.data(&store);
    // saved[1] sits 8 bytes in
    assert_eq!(&data[8..16], &[3, 0, 0, 0, 4, 0, 0, 0]);
}

#[test]
fn conversions_and_bitcasts() {
    let (mut store, instance) = instantiate(vec![
        exported(function(
            "halve",
            "int",
            vec![param("int", "v")],
            vec![ret(convert(binary("/", convert(ident("v"), "double"), float("2.0")), "int"))],
        )),
        exported(function(
            "widen",
            "long",
            vec![param("uint", "v")],
            vec![ret(convert(ident("v"), "long"))],
        )),
        exported(function(
            "bits",
            "int",
            vec![param("float", "v")],
            vec![ret(bitcast(ident("v"), "int"))],
        )),
        exported(function(
            "negate",
            "double",
            vec![param("double", "v")],
            vec![ret(unary("-", ident("v")))],
        )),
    ]);
    let halve = instance.get_typed_func::<i32, i32>(&mut store, "halve").expect("halve");
    assert_eq!(halve.call(&mut store, 7).expect("call"), 3);
    assert_eq!(halve.call(&mut store, -7).expect("call"), -3);

    let widen = instance.get_typed_func::<i32, i64>(&mut store, "widen").expect("widen");
    assert_eq!(widen.call(&mut store, -1).expect("call"), 0xFFFF_FFFF);

    let bits = instance.get_typed_func::<f32, i32>(&mut store, "bits").expect("bits");
    assert_eq!(bits.call(&mut store, 1.0).expect("call"), 0x3F80_0000);

    let negate = instance.get_typed_func::<f64, f64>(&mut store, "negate").expect("negate");
    assert_eq!(negate.call(&mut store, 2.5).expect("call"), -2.5);
}

#[test]
fn booleans_convert_as_zero_or_one() {
    let (mut store, instance) = instantiate(vec![
        exported(function("one", "int", vec![], vec![ret(convert(boolean(true), "int"))])),
        exported(function(
            "count",
            "long",
            vec![param("bool", "b")],
            vec![ret(convert(ident("b"), "long"))],
        )),
        exported(function(
            "ratio",
            "double",
            vec![param("bool", "b")],
            vec![ret(convert(ident("b"), "double"))],
        )),
        exported(function(
            "truthy",
            "bool",
            vec![param("float", "v")],
            vec![ret(convert(ident("v"), "bool"))],
        )),
        exported(function(
            "nonzero",
            "bool",
            vec![param("ulong", "v")],
            vec![ret(convert(ident("v"), "bool"))],
        )),
        exported(function(
            "lowest",
            "int",
            vec![],
            vec![ret(unary("-", int("2147483648")))],
        )),
    ]);
    let one = instance.get_typed_func::<(), i32>(&mut store, "one").expect("one");
    assert_eq!(one.call(&mut store, ()).expect("call"), 1);

    let count = instance.get_typed_func::<i32, i64>(&mut store, "count").expect("count");
    assert_eq!(count.call(&mut store, 1).expect("call"), 1);
    assert_eq!(count.call(&mut store, 0).expect("call"), 0);

    let ratio = instance.get_typed_func::<i32, f64>(&mut store, "ratio").expect("ratio");
    assert_eq!(ratio.call(&mut store, 1).expect("call"), 1.0);

    let truthy = instance.get_typed_func::<f32, i32>(&mut store, "truthy").expect("truthy");
    assert_eq!(truthy.call(&mut store, 0.0).expect("call"), 0);
    assert_eq!(truthy.call(&mut store, -0.0).expect("call"), 0);
    assert_eq!(truthy.call(&mut store, 0.25).expect("call"), 1);

    let nonzero = instance.get_typed_func::<i64, i32>(&mut store, "nonzero").expect("nonzero");
    assert_eq!(nonzero.call(&mut store, 0).expect("call"), 0);
    assert_eq!(nonzero.call(&mut store, 1 << 40).expect("call"), 1);

    let lowest = instance.get_typed_func::<(), i32>(&mut store, "lowest").expect("lowest");
    assert_eq!(lowest.call(&mut store, ()).expect("call"), i32::MIN);
}

#[test]
fn mapped_variables_of_imported_struct_types() {
    let geo = program(
        "geo",
        vec![exported(structure("P", vec![field("int", "x"), field("int", "y")]))],
    );
    let app = program(
        "app",
        vec![
            import("geo", Vec::new()),
            map("int", "first", None),
            map("geo.P", "p", None),
            map("int", "last", None),
            exported(function(
                "save",
                "void",
                vec![],
                vec![
                    assign(access(ident("p"), "y"), int("7")),
                    assign(ident("last"), int("9")),
                ],
            )),
        ],
    );
    let modules = compile(vec![("app", app), ("geo", geo)]);
    let bytes = modules[0].result.buffer.as_deref().expect("app compiled");

    let engine = Engine::default();
    let module = wasmtime::Module::new(&engine, bytes).expect("app module");
    let mut store = Store::new(&engine, ());
    let instance = Instance::new(&mut store, &module, &[]).expect("instantiation");
    let save = instance.get_typed_func::<(), ()>(&mut store, "save").expect("save export");
    save.call(&mut store, ()).expect("call");

    let memory = instance.get_memory(&mut store, "memory").expect("memory export");
    let word = |data: &[u8], at: usize| i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let data = memory.data(&store);
    // first at 0, p.x at 4, p.y at 8, last at 12
    assert_eq!(word(data, 8), 7);
    assert_eq!(word(data, 12), 9);
}

#[test]
fn intrinsics_lower_to_native_instructions() {
    let (mut store, instance) = instantiate(vec![
        exported(function(
            "leading",
            "int",
            vec![param("int", "v")],
            vec![ret(call_path("int.clz", vec![ident("v")]))],
        )),
        exported(function(
            "root",
            "double",
            vec![param("double", "v")],
            vec![ret(call_path("double.sqrt", vec![ident("v")]))],
        )),
        exported(function(
            "bytes",
            "int",
            vec![],
            vec![
                call_path("int.store8", vec![int("100"), int("255")]),
                ret(binary(
                    "+",
                    call_path("int.load8", vec![int("100")]),
                    convert(call_path("uint.load8", vec![int("100")]), "int"),
                )),
            ],
        )),
        exported(function(
            "grow",
            "int",
            vec![],
            vec![
                var("int", "before", Some(call_path("memory.grow", vec![int("2")]))),
                ret(binary("+", binary("*", ident("before"), int("10")), call_path("memory.size", vec![]))),
            ],
        )),
    ]);
    let leading = instance.get_typed_func::<i32, i32>(&mut store, "leading").expect("leading");
    assert_eq!(leading.call(&mut store, 1).expect("call"), 31);

    let root = instance.get_typed_func::<f64, f64>(&mut store, "root").expect("root");
    assert_eq!(root.call(&mut store, 16.0).expect("call"), 4.0);

    // -1 sign-extended plus 255 zero-extended
    let bytes = instance.get_typed_func::<(), i32>(&mut store, "bytes").expect("bytes");
    assert_eq!(bytes.call(&mut store, ()).expect("call"), 254);

    let grow = instance.get_typed_func::<(), i32>(&mut store, "grow").expect("grow");
    assert_eq!(grow.call(&mut store, ()).expect("call"), 13);
}

#[test]
fn logical_operators_do_not_evaluate_the_right_side_needlessly() {
    let (mut store, instance) = instantiate(vec![
        global("int", "zero", Some(int("0"))),
        function(
            "boom",
            "bool",
            vec![],
            vec![ret(binary("==", binary("/", int("1"), ident("zero")), int("0")))],
        ),
        exported(function(
            "either",
            "bool",
            vec![param("bool", "a")],
            vec![ret(binary("||", ident("a"), call(ident("boom"), vec![])))],
        )),
        exported(function(
            "both",
            "bool",
            vec![param("bool", "a")],
            vec![ret(binary("&&", ident("a"), call(ident("boom"), vec![])))],
        )),
    ]);
    let either = instance.get_typed_func::<i32, i32>(&mut store, "either").expect("either");
    let both = instance.get_typed_func::<i32, i32>(&mut store, "both").expect("both");
    assert_eq!(either.call(&mut store, 1).expect("call"), 1);
    assert_eq!(both.call(&mut store, 0).expect("call"), 0);
    // evaluating the right side traps on the division
    assert!(either.call(&mut store, 0).is_err());
}

#[test]
fn falling_off_a_value_function_traps() {
    let (mut store, instance) = instantiate(vec![exported(function(
        "maybe",
        "int",
        vec![param("bool", "c")],
        vec![if_(ident("c"), vec![ret(int("1"))])],
    ))]);
    let maybe = instance.get_typed_func::<i32, i32>(&mut store, "maybe").expect("maybe");
    assert_eq!(maybe.call(&mut store, 1).expect("call"), 1);
    assert!(maybe.call(&mut store, 0).is_err());
}

#[test]
fn start_function_runs_on_instantiation() {
    let (mut store, instance) = instantiate(vec![
        exported(global("int", "ready", None)),
        function("main", "void", vec![], vec![assign(ident("ready"), int("42"))]),
    ]);
    assert_eq!(global_i32(&mut store, &instance, "ready"), 42);
}

#[test]
fn modules_link_through_their_imports() {
    let modules = compile(vec![
        (
            "app",
            program(
                "app",
                vec![
                    import("lib", vec![import_item("square", None), import_item("counter", None)]),
                    import_as("lib", "l"),
                    exported(function(
                        "run",
                        "int",
                        vec![],
                        vec![
                            assign(ident("counter"), binary("+", ident("counter"), int("1"))),
                            ret(binary(
                                "+",
                                call(ident("square"), vec![ident("counter")]),
                                call_path("l.square", vec![int("2")]),
                            )),
                        ],
                    )),
                ],
            ),
        ),
        (
            "lib",
            program(
                "lib",
                vec![
                    exported(function(
                        "square",
                        "int",
                        vec![param("int", "x")],
                        vec![ret(binary("*", ident("x"), ident("x")))],
                    )),
                    exported(global("int", "counter", Some(int("3")))),
                ],
            ),
        ),
    ]);
    let buffer = |name: &str| {
        modules
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.result.buffer.clone())
            .expect("compiled")
    };

    let engine = Engine::default();
    let mut store = Store::new(&engine, ());
    let mut linker = Linker::new(&engine);
    let lib = wasmtime::Module::new(&engine, buffer("lib")).expect("lib module");
    let lib = linker.instantiate(&mut store, &lib).expect("lib instance");
    linker.instance(&mut store, "lib", lib).expect("register lib");
    let app = wasmtime::Module::new(&engine, buffer("app")).expect("app module");
    let app = linker.instantiate(&mut store, &app).expect("app instance");

    let run = app.get_typed_func::<(), i32>(&mut store, "run").expect("run export");
    assert_eq!(run.call(&mut store, ()).expect("call"), 20);
    // the global is shared, not copied
    assert_eq!(global_i32(&mut store, &lib, "counter"), 4);
}
