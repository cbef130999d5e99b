use quill_syntax::build::*;
use quill_syntax::{Ast, Module, NodeKind, TokenKind, TreeNode};

/// The shape a front end emits: omitted fields fall back to their defaults.
const FRONT_END_TREE: &str = r#"{
    "kind": "Program",
    "token": { "kind": "Identifier", "lexeme": "demo" },
    "children": [
        {
            "kind": "Function",
            "token": { "kind": "Identifier", "lexeme": "answer", "span": { "line": 3, "column": 5 } },
            "children": [
                { "kind": "Type", "token": { "kind": "Identifier", "lexeme": "int" } },
                { "kind": "Parameters" },
                {
                    "kind": "Block",
                    "children": [
                        {
                            "kind": "Return",
                            "token": { "kind": "Keyword", "lexeme": "return" },
                            "children": [
                                { "kind": "Literal", "token": { "kind": "Integer", "lexeme": "42" } }
                            ]
                        }
                    ]
                }
            ]
        }
    ]
}"#;

#[test]
fn front_end_json_matches_the_builders() {
    let parsed: TreeNode = serde_json::from_str(FRONT_END_TREE).expect("valid tree");
    let built = program(
        "demo",
        vec![function("answer", "int", vec![], vec![ret(int("42"))])],
    );

    assert_eq!(parsed.kind, built.kind);
    assert_eq!(parsed.children.len(), 1);
    let function = &parsed.children[0];
    assert_eq!(function.token.span.line, 3);
    assert_eq!(function.token.span.column, 5);
    assert_eq!(function.token.span.length, 0);
    assert_eq!(function.children[1].token.kind, TokenKind::None);
    assert_eq!(function.children[1].valid, None);

    // spans aside, the structure is identical
    let parsed = Ast::from_tree(&parsed);
    let built = Ast::from_tree(&built);
    let kinds = |ast: &Ast| -> Vec<(NodeKind, String)> {
        ast.preorder()
            .into_iter()
            .map(|id| (ast.kind(id), ast.lexeme(id).to_string()))
            .collect()
    };
    assert_eq!(kinds(&parsed), kinds(&built));
}

#[test]
fn unknown_node_kinds_are_rejected() {
    let result = serde_json::from_str::<TreeNode>(r#"{ "kind": "Lambda" }"#);
    assert!(result.is_err());
}

#[test]
fn arena_is_numbered_in_preorder() {
    let tree = program(
        "demo",
        vec![
            exported(global("int", "count", Some(int("1")))),
            function("f", "void", vec![param("int", "x")], vec![ret_void()]),
        ],
    );
    let module = Module::from_tree("demo", &tree);
    let ast = module.result.ast.expect("tree converted");

    let preorder = ast.preorder();
    let order: Vec<NodeKind> = preorder.iter().map(|&id| ast.kind(id)).collect();
    let ids: Vec<usize> = preorder.iter().map(|id| id.0 as usize).collect();
    assert_eq!(ids, (0..ast.len()).collect::<Vec<_>>());
    assert_eq!(order[0], NodeKind::Program);
    assert_eq!(order[1], NodeKind::Global);

    let global = ast.child(ast.root(), 0).expect("global");
    let def = ast.child_of_kind(global, NodeKind::VariableDef).expect("definition");
    assert_eq!(ast.lexeme(def), "count");
    assert!(ast.has_child(def, NodeKind::Export));
    assert_eq!(ast.parent(def), Some(global));
    let init = ast.first_expression(def).expect("initializer");
    assert_eq!(ast.kind(init), NodeKind::Literal);
}
