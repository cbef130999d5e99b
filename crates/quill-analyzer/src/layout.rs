//! Struct and array decomposition.
//!
//! The target VM only has scalar locals/globals plus one linear memory, so
//! a composite variable is flattened into a child scope of primitive leaves.
//! Leaves inherit the owner's flags and carry absolute byte offsets; arrays
//! get one element per index (`"0"`..`"N-1"`) at `base + i * element_size`,
//! structs one variable per field at the running sum of preceding sizes.

use quill_syntax::{DataType, ScopeId};

use crate::symbols::{SymbolTable, VarId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("type `{ty}` nests deeper than the maximum layout depth of {max}")]
    TooDeep { ty: DataType, max: usize },
    #[error("type `{ty}` does not fit in the 32-bit address space")]
    OutOfAddressSpace { ty: DataType },
}

/// Byte size of `ty`, resolving struct names from `scope`. Unknown structs,
/// `void` and `Invalid` contribute 0.
pub fn size_of(
    table: &SymbolTable,
    scope: ScopeId,
    ty: &DataType,
    max_depth: usize,
) -> Result<u32, LayoutError> {
    size_at(table, scope, ty, 0, max_depth).map_err(|err| match err {
        LayoutError::TooDeep { max, .. } => LayoutError::TooDeep { ty: ty.clone(), max },
        LayoutError::OutOfAddressSpace { .. } => LayoutError::OutOfAddressSpace { ty: ty.clone() },
    })
}

fn size_at(
    table: &SymbolTable,
    scope: ScopeId,
    ty: &DataType,
    depth: usize,
    max_depth: usize,
) -> Result<u32, LayoutError> {
    if ty.is_composite() && depth >= max_depth {
        return Err(LayoutError::TooDeep {
            ty: ty.clone(),
            max: max_depth,
        });
    }
    let too_large = || LayoutError::OutOfAddressSpace { ty: ty.clone() };
    match ty {
        DataType::Array(element, len) => {
            let element_size = size_at(table, scope, element, depth + 1, max_depth)?;
            element_size.checked_mul(*len).ok_or_else(too_large)
        }
        DataType::Struct(name) => {
            let Some(st) = table.resolve_struct(scope, name) else {
                return Ok(0);
            };
            let st = table.structure(st);
            let mut total = 0u32;
            for &field in &st.fields {
                let field_ty = &table.variable(field).data_type;
                let field_size = size_at(table, st.template, field_ty, depth + 1, max_depth)?;
                total = total.checked_add(field_size).ok_or_else(too_large)?;
            }
            Ok(total)
        }
        other => Ok(other.primitive_size()),
    }
}

/// Compute `var`'s size and, for composites, flatten it into a layout
/// scope. Idempotent: an existing layout is kept as is.
pub fn lay_out(table: &mut SymbolTable, var: VarId, max_depth: usize) -> Result<(), LayoutError> {
    let scope = table.variable(var).scope;
    lay_out_in(table, var, scope, max_depth)
}

/// [`lay_out`] with struct names resolved from `type_scope` instead of the
/// variable's own scope (import clones resolve in their origin module).
///
/// Every byte of the variable must be addressable: `offset + size` may not
/// pass `u32::MAX`.
pub fn lay_out_in(
    table: &mut SymbolTable,
    var: VarId,
    type_scope: ScopeId,
    max_depth: usize,
) -> Result<(), LayoutError> {
    let ty = table.variable(var).data_type.clone();
    let size = size_of(table, type_scope, &ty, max_depth)?;
    if table.variable(var).offset.checked_add(size).is_none() {
        return Err(LayoutError::OutOfAddressSpace { ty });
    }
    table.variable_mut(var).size = size;
    if table.layout_scope(var).is_some() {
        return Ok(());
    }
    flatten(table, var, type_scope, 0, max_depth)
}

/// `type_scope` is where `var`'s type name resolves: the declaring scope
/// for top-level variables, the struct's template scope for fields.
fn flatten(
    table: &mut SymbolTable,
    var: VarId,
    type_scope: ScopeId,
    depth: usize,
    max_depth: usize,
) -> Result<(), LayoutError> {
    let ty = table.variable(var).data_type.clone();
    if !ty.is_composite() || depth >= max_depth {
        return Ok(());
    }
    let (owner_scope, name, base) = {
        let v = table.variable(var);
        (v.scope, v.name.clone(), v.offset)
    };
    let too_large = || LayoutError::OutOfAddressSpace { ty: ty.clone() };

    match &ty {
        DataType::Array(element, len) => {
            let element_size = size_at(table, type_scope, element, depth + 1, max_depth)?;
            let layout = table.add_named_scope(owner_scope, &name);
            table.scope_mut(layout).layout_of = Some(var);
            for i in 0..*len {
                let offset = i
                    .checked_mul(element_size)
                    .and_then(|rel| base.checked_add(rel))
                    .ok_or_else(too_large)?;
                let child = table.add_variable(layout, &i.to_string(), (**element).clone());
                inherit(table, var, child, offset, element_size);
                flatten(table, child, type_scope, depth + 1, max_depth)?;
            }
        }
        DataType::Struct(struct_name) => {
            let Some(st) = table.resolve_struct(type_scope, struct_name) else {
                return Ok(());
            };
            let template = table.structure(st).template;
            let fields: Vec<(String, DataType)> = table
                .structure(st)
                .fields
                .iter()
                .map(|&f| {
                    let f = table.variable(f);
                    (f.name.clone(), f.data_type.clone())
                })
                .collect();
            let layout = table.add_named_scope(owner_scope, &name);
            table.scope_mut(layout).layout_of = Some(var);
            let mut offset = base;
            for (field_name, field_ty) in fields {
                let field_size = size_at(table, template, &field_ty, depth + 1, max_depth)?;
                let child = table.add_variable(layout, &field_name, field_ty);
                inherit(table, var, child, offset, field_size);
                flatten(table, child, template, depth + 1, max_depth)?;
                offset = offset.checked_add(field_size).ok_or_else(too_large)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn inherit(table: &mut SymbolTable, owner: VarId, child: VarId, offset: u32, size: u32) {
    let o = table.variable(owner).clone();
    let c = table.variable_mut(child);
    c.global = o.global;
    c.constant = o.constant;
    c.export = o.export;
    c.mapped = o.mapped;
    c.import = o.import;
    c.offset = offset;
    c.size = size;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_struct(table: &mut SymbolTable, scope: ScopeId) {
        let st = table.add_struct(scope, "S");
        let template = table.structure(st).template;
        let a = table.add_variable(template, "a", DataType::Int);
        let b = table.add_variable(template, "b", DataType::Long);
        table.structure_mut(st).fields = vec![a, b];
    }

    #[test]
    fn struct_flattens_to_offset_leaves() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        point_struct(&mut table, m);
        let s = table.add_variable(m, "s", DataType::Struct("S".into()));
        table.variable_mut(s).offset = 100;
        lay_out(&mut table, s, 16).unwrap();

        assert_eq!(table.variable(s).size, 12);
        let leaves = table.leaves(s);
        let summary: Vec<(String, u32, u32)> = leaves
            .iter()
            .map(|&l| {
                let v = table.variable(l);
                (table.qualified_name(l, false), v.size, v.offset)
            })
            .collect();
        assert_eq!(
            summary,
            vec![("s.a".to_string(), 4, 100), ("s.b".to_string(), 8, 104)]
        );
    }

    #[test]
    fn array_of_structs_strides_by_struct_size() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        point_struct(&mut table, m);
        let arr = table.add_variable(m, "arr", DataType::parse("S[3]").unwrap());
        lay_out(&mut table, arr, 16).unwrap();

        assert_eq!(table.variable(arr).size, 36);
        let offsets: Vec<u32> = table
            .leaves(arr)
            .iter()
            .map(|&l| table.variable(l).offset)
            .collect();
        assert_eq!(offsets, vec![0, 4, 12, 16, 24, 28]);
        let names: Vec<String> = table
            .leaves(arr)
            .iter()
            .map(|&l| table.qualified_name(l, false))
            .collect();
        assert_eq!(names[5], "arr.2.b");
    }

    #[test]
    fn leaves_inherit_flags() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        let v = table.add_variable(m, "buf", DataType::parse("int[2]").unwrap());
        {
            let v = table.variable_mut(v);
            v.mapped = true;
            v.constant = true;
            v.offset = 8;
        }
        lay_out(&mut table, v, 16).unwrap();
        for leaf in table.leaves(v) {
            let leaf = table.variable(leaf);
            assert!(leaf.mapped && leaf.constant);
        }
    }

    #[test]
    fn self_containing_struct_exceeds_depth() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        let st = table.add_struct(m, "Loop");
        let template = table.structure(st).template;
        let inner = table.add_variable(template, "inner", DataType::Struct("Loop".into()));
        table.structure_mut(st).fields = vec![inner];
        let v = table.add_variable(m, "l", DataType::Struct("Loop".into()));
        assert!(matches!(lay_out(&mut table, v, 8), Err(LayoutError::TooDeep { .. })));
    }

    #[test]
    fn mapping_at_the_top_of_memory_does_not_fit() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        let v = table.add_variable(m, "buf", DataType::parse("int[2]").unwrap());
        table.variable_mut(v).offset = u32::MAX;
        assert_eq!(
            lay_out(&mut table, v, 16),
            Err(LayoutError::OutOfAddressSpace {
                ty: DataType::parse("int[2]").unwrap()
            })
        );
        assert!(table.layout_scope(v).is_none());

        // the last addressable word still fits
        let w = table.add_variable(m, "word", DataType::Int);
        table.variable_mut(w).offset = u32::MAX - 4;
        lay_out(&mut table, w, 16).unwrap();
        assert_eq!(table.variable(w).size, 4);
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        let ty = DataType::parse("long[1073741824]").unwrap();
        assert!(matches!(
            size_of(&table, m, &ty, 16),
            Err(LayoutError::OutOfAddressSpace { ty: t }) if t == ty
        ));
    }

    #[test]
    fn relayout_is_a_no_op() {
        let mut table = SymbolTable::new();
        let m = table.module_scope("m");
        let v = table.add_variable(m, "pair", DataType::parse("long[2]").unwrap());
        lay_out(&mut table, v, 16).unwrap();
        let first = table.leaves(v);
        lay_out(&mut table, v, 16).unwrap();
        assert_eq!(table.leaves(v), first);
    }
}
