//! Launch-sequence state: the per-scan context that accumulates one kernel
//! launch's name, declared parameter types, and staged argument values
//! across the scattered staging calls that precede the launch call.

use std::fmt;

use inkwell::builder::Builder;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{AnyValue, AsValueRef, BasicValueEnum, InstructionValue, PointerValue};

use crate::diagnostics::PatchError;

/// Callee name of the launch call in the input convention.
pub const LAUNCH_SYMBOL: &str = "cudaLaunch";
/// Callee name of the stage-argument call in the input convention.
pub const STAGE_SYMBOL: &str = "cudaSetupArgument";

/// Accumulated state for the launch sequence currently being scanned.
///
/// Owned by the function patcher and reused across launches within one
/// function scan; `reset` clears both staged sequences together once a
/// launch completes, so they can never go out of step.
#[derive(Default)]
pub struct LaunchCallInfo<'ctx> {
    pub kernel_name: String,
    /// Declared parameter types of the kernel. Diagnostic only; the
    /// marshalling decisions come from the staged values' own types.
    pub parameter_types: Vec<BasicTypeEnum<'ctx>>,
    staged_by_value: Vec<BasicValueEnum<'ctx>>,
    staged_as_address: Vec<PointerValue<'ctx>>,
}

impl<'ctx> LaunchCallInfo<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staged_len(&self) -> usize {
        self.staged_by_value.len()
    }

    /// The i-th staged argument as (loaded value, backing storage slot).
    pub fn staged(&self, position: usize) -> (BasicValueEnum<'ctx>, PointerValue<'ctx>) {
        (self.staged_by_value[position], self.staged_as_address[position])
    }

    fn push_staged(&mut self, value: BasicValueEnum<'ctx>, address: PointerValue<'ctx>) {
        self.staged_by_value.push(value);
        self.staged_as_address.push(address);
    }

    /// Clear the staged sequences after a completed launch. The kernel name
    /// is left in place; the next launch overwrites it.
    pub fn reset(&mut self) {
        self.staged_by_value.clear();
        self.staged_as_address.clear();
    }

    /// Resolve the kernel a launch call refers to and record its name and
    /// declared parameter list.
    ///
    /// The launch call's first operand is expected to be a constant
    /// expression casting the kernel function's address (or, when the cast
    /// folds away, the function itself).
    pub fn extract_launch(
        &mut self,
        module: &Module<'ctx>,
        call: InstructionValue<'ctx>,
    ) -> Result<(), PatchError> {
        let operand = call_operand(call, 0)
            .ok_or_else(|| PatchError::MalformedLaunch("launch call has no operands".into()))?;
        let target = match operand {
            BasicValueEnum::PointerValue(ptr) => ptr,
            other => {
                return Err(PatchError::MalformedLaunch(format!(
                    "launch target is not a pointer: {}",
                    other.print_to_string()
                )))
            }
        };
        let name = launch_target_name(target).ok_or_else(|| {
            PatchError::MalformedLaunch(format!(
                "launch target is not a cast of a named kernel function: {}",
                target.print_to_string()
            ))
        })?;
        let kernel = module.get_function(&name).ok_or_else(|| {
            PatchError::MalformedLaunch(format!("kernel `{}` is not declared in this module", name))
        })?;
        self.kernel_name = name;
        self.parameter_types = kernel.get_type().get_param_types();
        Ok(())
    }

    /// Reconstruct one staged argument from a staging call.
    ///
    /// The staging call's first operand is a cast instruction wrapping the
    /// argument's stack slot. A load of the slot's current value is
    /// inserted immediately before the staging call, and the (value, slot)
    /// pair is appended in staging order.
    pub fn stage_argument(
        &mut self,
        builder: &Builder<'ctx>,
        call: InstructionValue<'ctx>,
    ) -> Result<(), PatchError> {
        let operand = call_operand(call, 0).ok_or_else(|| {
            PatchError::MalformedStageArgument("staging call has no operands".into())
        })?;
        let cast = match operand {
            BasicValueEnum::PointerValue(ptr) => ptr,
            other => {
                return Err(PatchError::MalformedStageArgument(format!(
                    "first operand is not a pointer: {}",
                    other.print_to_string()
                )))
            }
        };
        let cast_inst = cast.as_instruction().ok_or_else(|| {
            PatchError::MalformedStageArgument(format!(
                "first operand of the staging call is not an instruction: {}",
                cast.print_to_string()
            ))
        })?;
        let slot = match cast_inst.get_operand(0).and_then(|operand| operand.left()) {
            Some(BasicValueEnum::PointerValue(ptr)) => ptr,
            _ => {
                return Err(PatchError::MalformedStageArgument(
                    "staged argument cast does not wrap a storage slot".into(),
                ))
            }
        };
        builder.position_before(&call);
        let loaded = builder.build_load(slot, "staged_arg")?;
        self.push_staged(loaded, slot);
        Ok(())
    }
}

impl fmt::Display for LaunchCallInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kernel_name)?;
        for (i, ty) in self.parameter_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty.print_to_string().to_string_lossy())?;
        }
        write!(f, ") with {} staged argument(s)", self.staged_by_value.len())
    }
}

/// Callee symbol of a direct call, if it has one. Indirect calls and
/// unnamed callees yield `None` and are left untouched by the patcher.
pub fn called_function_name(call: InstructionValue<'_>) -> Option<String> {
    let operands = call.get_num_operands();
    if operands == 0 {
        return None;
    }
    // The callee is the call instruction's trailing operand.
    let callee = call_operand(call, operands - 1)?;
    let BasicValueEnum::PointerValue(ptr) = callee else {
        return None;
    };
    let name = ptr.get_name().to_string_lossy().into_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn call_operand<'ctx>(call: InstructionValue<'ctx>, index: u32) -> Option<BasicValueEnum<'ctx>> {
    // Operands that are basic blocks (the `Either::Right` side) never
    // appear on the calls this pass inspects.
    call.get_operand(index).and_then(|operand| operand.left())
}

// Launch operands arrive as `bitcast (void (...)* @kernel to i8*)`; when the
// operand and parameter types already agree the cast folds away and the
// operand is the function itself, carrying its own name.
fn launch_target_name(target: PointerValue<'_>) -> Option<String> {
    let direct = target.get_name().to_string_lossy();
    if !direct.is_empty() {
        return Some(direct.into_owned());
    }
    constexpr_callee_name(target)
}

// inkwell only exposes operands on instructions, not on constant
// expressions, so the one peel goes through the C API: take operand 0 of
// the constant cast and read that value's name.
fn constexpr_callee_name(target: PointerValue<'_>) -> Option<String> {
    use llvm_sys::core::{LLVMGetOperand, LLVMGetValueKind, LLVMGetValueName2};
    use llvm_sys::LLVMValueKind;

    unsafe {
        let raw = target.as_value_ref();
        if LLVMGetValueKind(raw) != LLVMValueKind::LLVMConstantExprValueKind {
            return None;
        }
        let inner = LLVMGetOperand(raw, 0);
        if inner.is_null() {
            return None;
        }
        let mut len = 0usize;
        let name = LLVMGetValueName2(inner, &mut len);
        if name.is_null() || len == 0 {
            return None;
        }
        let bytes = std::slice::from_raw_parts(name as *const u8, len);
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}
