//! Builtin intrinsic functions, declared once in the root scope before any
//! module is analyzed. Each lowers to a single native instruction.

use quill_syntax::DataType;

use crate::symbols::SymbolTable;

/// One intrinsic, addressed by its dotted path `namespace.name`
#[derive(Debug, Clone, PartialEq)]
pub struct Builtin {
    pub namespace: &'static str,
    pub name: &'static str,
    pub params: Vec<DataType>,
    pub returns: DataType,
}

impl Builtin {
    pub fn path(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

const INTEGER_NAMESPACES: [(&str, DataType); 4] = [
    ("int", DataType::Int),
    ("uint", DataType::UInt),
    ("long", DataType::Long),
    ("ulong", DataType::ULong),
];

const FLOAT_NAMESPACES: [(&str, DataType); 2] = [("float", DataType::Float), ("double", DataType::Double)];

/// The full intrinsic catalogue in declaration order
pub fn catalogue() -> Vec<Builtin> {
    let mut out = Vec::new();
    let mut add = |namespace: &'static str, name: &'static str, params: Vec<DataType>, returns: DataType| {
        out.push(Builtin {
            namespace,
            name,
            params,
            returns,
        });
    };

    for (ns, ty) in INTEGER_NAMESPACES {
        let wide = ty.primitive_size() == 8;
        add(ns, "load", vec![DataType::Int], ty.clone());
        add(ns, "load8", vec![DataType::Int], ty.clone());
        add(ns, "load16", vec![DataType::Int], ty.clone());
        if wide {
            add(ns, "load32", vec![DataType::Int], ty.clone());
        }
        add(ns, "store", vec![DataType::Int, ty.clone()], DataType::Void);
        add(ns, "store8", vec![DataType::Int, ty.clone()], DataType::Void);
        add(ns, "store16", vec![DataType::Int, ty.clone()], DataType::Void);
        if wide {
            add(ns, "store32", vec![DataType::Int, ty.clone()], DataType::Void);
        }
        for unary in ["clz", "ctz", "popcnt"] {
            add(ns, unary, vec![ty.clone()], ty.clone());
        }
        for binary in ["rotl", "rotr"] {
            add(ns, binary, vec![ty.clone(), ty.clone()], ty.clone());
        }
    }

    for (ns, ty) in FLOAT_NAMESPACES {
        add(ns, "load", vec![DataType::Int], ty.clone());
        add(ns, "store", vec![DataType::Int, ty.clone()], DataType::Void);
        for unary in ["abs", "ceil", "floor", "trunc", "nearest", "sqrt"] {
            add(ns, unary, vec![ty.clone()], ty.clone());
        }
        for binary in ["min", "max", "copysign"] {
            add(ns, binary, vec![ty.clone(), ty.clone()], ty.clone());
        }
    }

    add("memory", "size", vec![], DataType::Int);
    add("memory", "grow", vec![DataType::Int], DataType::Int);
    out
}

/// Declare every intrinsic in the root scope, one namespace scope per
/// type name plus `memory`.
pub(crate) fn seed(table: &mut SymbolTable) {
    let root = table.root();
    for builtin in catalogue() {
        let namespace = match table.scope(root).children.get(builtin.namespace) {
            Some(&ns) => ns,
            None => table.add_named_scope(root, builtin.namespace),
        };
        let func = table.add_function(namespace, builtin.name, builtin.returns.clone());
        let body = table.function(func).body_scope;
        let mut params = Vec::with_capacity(builtin.params.len());
        for (i, ty) in builtin.params.iter().enumerate() {
            let param = table.add_variable(body, &format!("p{i}"), ty.clone());
            table.variable_mut(param).size = ty.primitive_size();
            params.push(param);
        }
        let f = table.function_mut(func);
        f.params = params;
        f.builtin = true;
    }
    log::debug!("seeded {} builtin intrinsics", catalogue().len());
}

/// Whether a dotted path names an intrinsic
pub fn is_intrinsic(path: &str) -> bool {
    catalogue().iter().any(|b| b.path() == path)
}
