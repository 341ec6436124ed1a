//! Struct layout walking.
//!
//! Decomposes an aggregate argument type into the ordered set of
//! pointer-bearing fields reachable from it, with cumulative byte offsets
//! and the access-index path needed to address each field from the struct
//! base. Nested struct fields are walked recursively; array and scalar
//! fields contribute nothing.

use inkwell::targets::TargetData;
use inkwell::types::{AnyTypeEnum, BasicTypeEnum, StructType};

/// One pointer-bearing field of a staged struct argument.
pub struct PointerInfo<'ctx> {
    /// Byte offset of the field from the struct base.
    pub offset: u64,
    /// The field's pointee type. Recorded for diagnostics; the rewriter
    /// currently marshals every pointer field as float data regardless.
    pub pointee: AnyTypeEnum<'ctx>,
    /// Access-index path from the struct base, without the leading
    /// dereference index the rewriter prepends when building addresses.
    pub indices: Vec<u32>,
}

/// ABI allocation size of a struct under the module's data layout,
/// in bytes.
pub fn alloc_size(target_data: &TargetData, struct_type: StructType<'_>) -> u64 {
    target_data.get_abi_size(&struct_type)
}

pub fn walk_struct<'ctx>(
    target_data: &TargetData,
    struct_type: StructType<'ctx>,
) -> Vec<PointerInfo<'ctx>> {
    let mut found = Vec::new();
    walk_fields(target_data, struct_type, 0, &mut Vec::new(), &mut found);
    found
}

fn walk_fields<'ctx>(
    target_data: &TargetData,
    struct_type: StructType<'ctx>,
    base_offset: u64,
    path: &mut Vec<u32>,
    found: &mut Vec<PointerInfo<'ctx>>,
) {
    for (i, field) in struct_type.get_field_types().into_iter().enumerate() {
        let index = i as u32;
        let offset = base_offset
            + target_data
                .offset_of_element(&struct_type, index)
                .unwrap_or(0);
        match field {
            BasicTypeEnum::PointerType(ptr) => {
                let mut indices = path.clone();
                indices.push(index);
                found.push(PointerInfo {
                    offset,
                    pointee: ptr.get_element_type(),
                    indices,
                });
            }
            BasicTypeEnum::StructType(inner) => {
                path.push(index);
                walk_fields(target_data, inner, offset, path, found);
                path.pop();
            }
            _ => {}
        }
    }
}
