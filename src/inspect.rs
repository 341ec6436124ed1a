//! Classification of staged argument values.
//!
//! Each staged value is inspected once and mapped to a closed set of
//! marshalling strategies; the rewriter then matches exhaustively, so a new
//! argument kind cannot be silently half-handled.

use inkwell::types::AnyTypeEnum;
use inkwell::values::{BasicValueEnum, FloatValue, IntValue, PointerValue, StructValue};

use crate::diagnostics::PatchError;

pub enum ArgClass<'ctx> {
    Int32(IntValue<'ctx>),
    Int64(IntValue<'ctx>),
    Float(FloatValue<'ctx>),
    /// A pointer whose pointee is floating point; passed through directly.
    FloatPtr(PointerValue<'ctx>),
    /// A pointer to anything else. Dropped rather than marshalled — a known
    /// limitation of the dispatch table, not an error.
    SkippedPtr(PointerValue<'ctx>),
    /// An aggregate passed by value; marshalled as raw bytes plus one extra
    /// setter call per pointer-bearing field.
    Struct(StructValue<'ctx>),
}

pub fn classify(value: BasicValueEnum<'_>) -> Result<ArgClass<'_>, PatchError> {
    match value {
        BasicValueEnum::IntValue(iv) => match iv.get_type().get_bit_width() {
            32 => Ok(ArgClass::Int32(iv)),
            64 => Ok(ArgClass::Int64(iv)),
            width => Err(PatchError::UnsupportedArgumentWidth(width)),
        },
        BasicValueEnum::FloatValue(fv) => Ok(ArgClass::Float(fv)),
        BasicValueEnum::PointerValue(pv) => {
            if let AnyTypeEnum::FloatType(_) = pv.get_type().get_element_type() {
                Ok(ArgClass::FloatPtr(pv))
            } else {
                Ok(ArgClass::SkippedPtr(pv))
            }
        }
        BasicValueEnum::StructValue(sv) => Ok(ArgClass::Struct(sv)),
        other => Err(PatchError::UnsupportedArgumentType(
            other.get_type().print_to_string().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;
    use inkwell::AddressSpace;

    #[test]
    fn classifies_supported_scalar_widths() {
        let context = Context::create();
        let i32_val = context.i32_type().const_int(7, false);
        assert!(matches!(classify(i32_val.into()), Ok(ArgClass::Int32(_))));
        let i64_val = context.i64_type().const_int(7, false);
        assert!(matches!(classify(i64_val.into()), Ok(ArgClass::Int64(_))));
        let f32_val = context.f32_type().const_float(1.5);
        assert!(matches!(classify(f32_val.into()), Ok(ArgClass::Float(_))));
    }

    #[test]
    fn rejects_odd_integer_widths() {
        let context = Context::create();
        let i16_val = context.i16_type().const_int(1, false);
        assert!(matches!(
            classify(i16_val.into()),
            Err(PatchError::UnsupportedArgumentWidth(16))
        ));
    }

    #[test]
    fn splits_pointers_by_pointee_kind() {
        let context = Context::create();
        let f32ptr = context.f32_type().ptr_type(AddressSpace::default());
        assert!(matches!(
            classify(f32ptr.const_null().into()),
            Ok(ArgClass::FloatPtr(_))
        ));
        let i32ptr = context.i32_type().ptr_type(AddressSpace::default());
        assert!(matches!(
            classify(i32ptr.const_null().into()),
            Ok(ArgClass::SkippedPtr(_))
        ));
    }

    #[test]
    fn structs_get_their_own_strategy() {
        let context = Context::create();
        let st = context.struct_type(
            &[context.i32_type().into(), context.f32_type().into()],
            false,
        );
        assert!(matches!(
            classify(st.get_undef().into()),
            Ok(ArgClass::Struct(_))
        ));
    }

    #[test]
    fn vectors_are_rejected_with_the_printed_type() {
        let context = Context::create();
        let vec = context.i32_type().vec_type(4).get_undef();
        match classify(vec.into()) {
            Err(PatchError::UnsupportedArgumentType(name)) => {
                assert!(name.contains("i32"), "unexpected type rendering: {}", name)
            }
            other => panic!("expected UnsupportedArgumentType, got {:?}", other.err()),
        }
    }
}
