//! The launch rewriter and the function/module patching driver.
//!
//! `HostPatcher` scans every instruction of every function in program
//! order, reconstructs each launch sequence through `LaunchCallInfo`, and
//! replaces it with an equivalent call sequence against the target
//! runtime's argument-marshalling API. Original staging/launch calls are
//! marked during the scan and replaced with a constant success value only
//! after the whole function has been walked.

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::TargetData;
use inkwell::types::{IntType, PointerType, StructType};
use inkwell::values::{
    FunctionValue, GlobalValue, InstructionOpcode, InstructionValue, IntValue, PointerValue,
};
use inkwell::AddressSpace;

use crate::diagnostics::{self, PatchError};
use crate::inspect::{classify, ArgClass};
use crate::launch::{called_function_name, LaunchCallInfo, LAUNCH_SYMBOL, STAGE_SYMBOL};
use crate::layout::{alloc_size, walk_struct};
use crate::runtime::RuntimeFn;

/// Well-known name of the module-level global holding the kernel source
/// text. Installed once per module; every configure call references it.
pub const KERNEL_SOURCE_GLOBAL: &str = "__opencl_sourcecode";

pub struct HostPatcher<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    target_data: TargetData,
    i32_t: IntType<'ctx>,
    i8ptr_t: PointerType<'ctx>,
    // String-constant globals by name, so a kernel launched twice shares
    // one name global instead of growing a new one per launch site.
    string_globals: RefCell<HashMap<String, GlobalValue<'ctx>>>,
    pub verbose: bool,
}

impl<'ctx> HostPatcher<'ctx> {
    pub fn new(context: &'ctx Context, module: Module<'ctx>, verbose: bool) -> Self {
        let layout = module.get_data_layout().as_str().to_string_lossy().into_owned();
        HostPatcher {
            context,
            builder: context.create_builder(),
            target_data: TargetData::create(&layout),
            i32_t: context.i32_type(),
            i8ptr_t: context.i8_type().ptr_type(AddressSpace::default()),
            string_globals: RefCell::new(HashMap::new()),
            module,
            verbose,
        }
    }

    /// Install the kernel source text under the well-known global name.
    /// Must run before any function is patched.
    pub fn install_kernel_source(&self, source_text: &str) {
        self.string_global(KERNEL_SOURCE_GLOBAL, source_text);
    }

    pub fn patch_module(&self) -> Result<(), PatchError> {
        // Setter declarations are appended while iterating; they have no
        // body, so visiting them afterwards is a no-op.
        let mut function = self.module.get_first_function();
        while let Some(current) = function {
            function = current.get_next_function();
            self.patch_function(current)?;
        }
        Ok(())
    }

    /// Scan one function, rewriting every launch sequence found in it.
    pub fn patch_function(&self, function: FunctionValue<'ctx>) -> Result<(), PatchError> {
        let mut info = LaunchCallInfo::new();
        let mut replace_with_zero: Vec<InstructionValue<'ctx>> = Vec::new();

        for block in function.get_basic_blocks() {
            let mut next = block.get_first_instruction();
            while let Some(inst) = next {
                next = inst.get_next_instruction();
                if inst.get_opcode() != InstructionOpcode::Call {
                    continue;
                }
                let Some(callee) = called_function_name(inst) else {
                    continue;
                };
                match callee.as_str() {
                    STAGE_SYMBOL => {
                        info.stage_argument(&self.builder, inst)?;
                        replace_with_zero.push(inst);
                    }
                    LAUNCH_SYMBOL => {
                        info.extract_launch(&self.module, inst)?;
                        if self.verbose {
                            diagnostics::note(&format!(
                                "patching launch of {} in `{}`",
                                info,
                                function.get_name().to_string_lossy()
                            ));
                        }
                        self.rewrite_launch(&mut info, inst)?;
                        replace_with_zero.push(inst);
                    }
                    _ => {}
                }
            }
        }

        // Deferred second phase: the original calls returned a status code,
        // so hand any remaining users a constant success value before
        // erasing each call.
        let zero = self.i32_t.const_int(0, false);
        for inst in replace_with_zero {
            if let Ok(result) = IntValue::try_from(inst) {
                result.replace_all_uses_with(zero);
            }
            inst.erase_from_basic_block();
        }
        Ok(())
    }

    /// Emit the replacement call sequence for one recognized launch,
    /// immediately before the original launch instruction.
    fn rewrite_launch(
        &self,
        info: &mut LaunchCallInfo<'ctx>,
        launch: InstructionValue<'ctx>,
    ) -> Result<(), PatchError> {
        self.builder.position_before(&launch);

        let name_global = self.string_global(&format!("s.{}", info.kernel_name), &info.kernel_name);
        let name_ptr =
            self.builder
                .build_pointer_cast(name_global.as_pointer_value(), self.i8ptr_t, "kernel_name")?;
        let source_global = self
            .module
            .get_global(KERNEL_SOURCE_GLOBAL)
            .ok_or(PatchError::MissingKernelSource)?;
        let source_ptr = self.builder.build_pointer_cast(
            source_global.as_pointer_value(),
            self.i8ptr_t,
            "cl_source",
        )?;

        let configure = RuntimeFn::ConfigureKernel.declare_in(self.context, &self.module);
        self.builder
            .build_call(configure, &[name_ptr.into(), source_ptr.into()], "")?;

        if self.verbose && info.parameter_types.len() != info.staged_len() {
            diagnostics::note(&format!(
                "kernel `{}` declares {} parameter(s) but {} were staged",
                info.kernel_name,
                info.parameter_types.len(),
                info.staged_len()
            ));
        }

        for position in 0..info.staged_len() {
            let (value, address) = info.staged(position);
            match classify(value)? {
                ArgClass::Int32(v) => {
                    let setter = RuntimeFn::SetArgInt32.declare_in(self.context, &self.module);
                    self.builder.build_call(setter, &[v.into()], "")?;
                }
                ArgClass::Int64(v) => {
                    let setter = RuntimeFn::SetArgInt64.declare_in(self.context, &self.module);
                    self.builder.build_call(setter, &[v.into()], "")?;
                }
                ArgClass::Float(v) => {
                    let setter = RuntimeFn::SetArgFloat.declare_in(self.context, &self.module);
                    self.builder.build_call(setter, &[v.into()], "")?;
                }
                ArgClass::FloatPtr(ptr) => {
                    let setter = RuntimeFn::SetArgFloatPtr.declare_in(self.context, &self.module);
                    self.builder.build_call(setter, &[ptr.into()], "")?;
                }
                ArgClass::SkippedPtr(ptr) => {
                    // Known limitation: no setter exists for non-float
                    // pointer data, and the argument is dropped.
                    if self.verbose {
                        diagnostics::note(&format!(
                            "skipping argument {} of `{}`: no setter for pointee of {}",
                            position,
                            info.kernel_name,
                            ptr.get_type().print_to_string()
                        ));
                    }
                }
                ArgClass::Struct(sv) => self.marshal_struct(sv.get_type(), address)?,
            }
        }

        let trigger = RuntimeFn::LaunchKernel.declare_in(self.context, &self.module);
        self.builder.build_call(trigger, &[], "")?;

        info.reset();
        Ok(())
    }

    /// Marshal a struct-typed argument: the whole allocation as raw bytes,
    /// then one float-pointer setter per pointer-bearing field.
    fn marshal_struct(
        &self,
        struct_type: StructType<'ctx>,
        address: PointerValue<'ctx>,
    ) -> Result<(), PatchError> {
        let size = alloc_size(&self.target_data, struct_type);
        let raw = self
            .builder
            .build_pointer_cast(address, self.i8ptr_t, "struct_bytes")?;
        let set_struct = RuntimeFn::SetArgStruct.declare_in(self.context, &self.module);
        self.builder.build_call(
            set_struct,
            &[raw.into(), self.i32_t.const_int(size, false).into()],
            "",
        )?;

        let set_float_ptr = RuntimeFn::SetArgFloatPtr.declare_in(self.context, &self.module);
        for field in walk_struct(&self.target_data, struct_type) {
            // Leading zero index dereferences the struct address itself;
            // the walker's path then selects the field.
            let mut indices = vec![self.i32_t.const_int(0, false)];
            indices.extend(
                field
                    .indices
                    .iter()
                    .map(|&i| self.i32_t.const_int(i as u64, false)),
            );
            let field_addr =
                unsafe { self.builder.build_in_bounds_gep(address, &indices, "field_ptr_addr") }?;
            let field_ptr = self.builder.build_load(field_addr, "field_ptr")?;
            // Every pointer field is passed to the float-pointer setter,
            // whatever the walker reported as its pointee (known limitation).
            self.builder.build_call(set_float_ptr, &[field_ptr.into()], "")?;
        }
        Ok(())
    }

    // Create-or-reuse a private constant holding `text` as a
    // null-terminated byte array.
    fn string_global(&self, name: &str, text: &str) -> GlobalValue<'ctx> {
        if let Some(existing) = self.string_globals.borrow().get(name) {
            return *existing;
        }
        let global = match self.module.get_global(name) {
            Some(existing) => existing,
            None => {
                let bytes = text.as_bytes();
                let array_ty = self.context.i8_type().array_type(bytes.len() as u32 + 1);
                let global = self.module.add_global(array_ty, None, name);
                global.set_initializer(&self.context.const_string(bytes, true));
                global.set_constant(true);
                global.set_linkage(Linkage::Private);
                global
            }
        };
        self.string_globals
            .borrow_mut()
            .insert(name.to_string(), global);
        global
    }
}
