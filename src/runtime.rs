//! Fixed symbol table for the target runtime's kernel-dispatch API.
//!
//! Every entry point the rewriter emits calls against is enumerated here
//! with its pre-agreed external symbol and signature, so a symbol/signature
//! mismatch is a one-line fix in one place instead of a scattered set of
//! string-built names.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::FunctionType;
use inkwell::values::FunctionValue;
use inkwell::AddressSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFn {
    /// `configureKernel(kernelName: i8*, sourceText: i8*)`
    ConfigureKernel,
    /// `setKernelArgInt32(i32)`
    SetArgInt32,
    /// `setKernelArgInt64(i64)`
    SetArgInt64,
    /// `setKernelArgFloat(float)`
    SetArgFloat,
    /// `setKernelArgFloatStar(float*)`
    SetArgFloatPtr,
    /// `setKernelArgStruct(bytes: i8*, allocSize: i32)`
    SetArgStruct,
    /// `kernelGo()` — the no-argument launch trigger.
    LaunchKernel,
}

impl RuntimeFn {
    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeFn::ConfigureKernel => "configureKernel",
            RuntimeFn::SetArgInt32 => "_Z17setKernelArgInt32i",
            RuntimeFn::SetArgInt64 => "_Z17setKernelArgInt64l",
            RuntimeFn::SetArgFloat => "_Z17setKernelArgFloatf",
            RuntimeFn::SetArgFloatPtr => "_Z21setKernelArgFloatStarPf",
            RuntimeFn::SetArgStruct => "_Z18setKernelArgStructPci",
            RuntimeFn::LaunchKernel => "_Z8kernelGov",
        }
    }

    fn signature<'ctx>(self, context: &'ctx Context) -> FunctionType<'ctx> {
        let void = context.void_type();
        let i8ptr = context.i8_type().ptr_type(AddressSpace::default());
        match self {
            RuntimeFn::ConfigureKernel => void.fn_type(&[i8ptr.into(), i8ptr.into()], false),
            RuntimeFn::SetArgInt32 => void.fn_type(&[context.i32_type().into()], false),
            RuntimeFn::SetArgInt64 => void.fn_type(&[context.i64_type().into()], false),
            RuntimeFn::SetArgFloat => void.fn_type(&[context.f32_type().into()], false),
            RuntimeFn::SetArgFloatPtr => {
                let f32ptr = context.f32_type().ptr_type(AddressSpace::default());
                void.fn_type(&[f32ptr.into()], false)
            }
            RuntimeFn::SetArgStruct => {
                void.fn_type(&[i8ptr.into(), context.i32_type().into()], false)
            }
            RuntimeFn::LaunchKernel => void.fn_type(&[], false),
        }
    }

    /// Resolve this entry point's declaration in `module`, creating it on
    /// first use. Repeated calls return the one shared declaration.
    pub fn declare_in<'ctx>(
        self,
        context: &'ctx Context,
        module: &Module<'ctx>,
    ) -> FunctionValue<'ctx> {
        if let Some(existing) = module.get_function(self.symbol()) {
            return existing;
        }
        module.add_function(self.symbol(), self.signature(context), None)
    }
}
