//! LLVM backend for the Zinc bytecode
//!
//! Translates bytecode into LLVM IR one function at a time. Every Zinc
//! value is boxed into an i64 (floats by bitcast, strings and heap
//! references by ptrtoint); the operand stack becomes a spill array in
//! the function's entry frame. Basic blocks are pre-created at every
//! jump target, and the linear instruction walk repositions the builder
//! as it crosses block boundaries.
//!
//! Only compiled with the `llvm` cargo feature.

use std::collections::HashMap;
use std::path::Path;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::types::ArrayType;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, GlobalValue, IntValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate, OptimizationLevel};

use super::bytecode::{Function, Op, Program};

/// Operand stack depth per function frame
const STACK_SLOTS: u32 = 512;

/// Runtime functions the generated code links against
struct Runtime<'ctx> {
    printf: FunctionValue<'ctx>,
    malloc: FunctionValue<'ctx>,
    calloc: FunctionValue<'ctx>,
    free: FunctionValue<'ctx>,
    sqrt: FunctionValue<'ctx>,
    pow: FunctionValue<'ctx>,
    fmod: FunctionValue<'ctx>,
    rand: FunctionValue<'ctx>,
    srand: FunctionValue<'ctx>,
    time: FunctionValue<'ctx>,
    getchar: FunctionValue<'ctx>,
    fgets: FunctionValue<'ctx>,
    atoll: FunctionValue<'ctx>,
    atof: FunctionValue<'ctx>,
    strstr: FunctionValue<'ctx>,
    fopen: FunctionValue<'ctx>,
    fclose: FunctionValue<'ctx>,
    feof: FunctionValue<'ctx>,
    stdin: GlobalValue<'ctx>,
}

pub struct LlvmCodegen<'ctx> {
    context: &'ctx Context,
    module: LlvmModule<'ctx>,
    builder: Builder<'ctx>,
    runtime: Runtime<'ctx>,
    func_map: HashMap<String, FunctionValue<'ctx>>,
    // Per-function state
    locals: Vec<PointerValue<'ctx>>,
    stack: Option<PointerValue<'ctx>>,
    sp: Option<PointerValue<'ctx>>,
    stack_ty: Option<ArrayType<'ctx>>,
    block_map: HashMap<usize, BasicBlock<'ctx>>,
    terminated: bool,
    fresh: u32,
}

impl<'ctx> LlvmCodegen<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        let i32_ty = context.i32_type();
        let i64_ty = context.i64_type();
        let f64_ty = context.f64_type();
        let ptr_ty = context.ptr_type(AddressSpace::default());

        let runtime = Runtime {
            printf: module.add_function(
                "printf",
                i32_ty.fn_type(&[ptr_ty.into()], true),
                None,
            ),
            malloc: module.add_function(
                "malloc",
                ptr_ty.fn_type(&[i64_ty.into()], false),
                None,
            ),
            calloc: module.add_function(
                "calloc",
                ptr_ty.fn_type(&[i64_ty.into(), i64_ty.into()], false),
                None,
            ),
            free: module.add_function("free", context.void_type().fn_type(&[ptr_ty.into()], false), None),
            sqrt: module.add_function("sqrt", f64_ty.fn_type(&[f64_ty.into()], false), None),
            pow: module.add_function(
                "pow",
                f64_ty.fn_type(&[f64_ty.into(), f64_ty.into()], false),
                None,
            ),
            fmod: module.add_function(
                "fmod",
                f64_ty.fn_type(&[f64_ty.into(), f64_ty.into()], false),
                None,
            ),
            rand: module.add_function("rand", i32_ty.fn_type(&[], false), None),
            srand: module.add_function(
                "srand",
                context.void_type().fn_type(&[i32_ty.into()], false),
                None,
            ),
            time: module.add_function("time", i64_ty.fn_type(&[ptr_ty.into()], false), None),
            getchar: module.add_function("getchar", i32_ty.fn_type(&[], false), None),
            fgets: module.add_function(
                "fgets",
                ptr_ty.fn_type(&[ptr_ty.into(), i32_ty.into(), ptr_ty.into()], false),
                None,
            ),
            atoll: module.add_function("atoll", i64_ty.fn_type(&[ptr_ty.into()], false), None),
            atof: module.add_function("atof", f64_ty.fn_type(&[ptr_ty.into()], false), None),
            strstr: module.add_function(
                "strstr",
                ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false),
                None,
            ),
            fopen: module.add_function(
                "fopen",
                ptr_ty.fn_type(&[ptr_ty.into(), ptr_ty.into()], false),
                None,
            ),
            fclose: module.add_function("fclose", i32_ty.fn_type(&[ptr_ty.into()], false), None),
            feof: module.add_function("feof", i32_ty.fn_type(&[ptr_ty.into()], false), None),
            stdin: {
                let global = module.add_global(ptr_ty, None, "stdin");
                global.set_linkage(inkwell::module::Linkage::External);
                global
            },
        };

        Self {
            context,
            module,
            builder,
            runtime,
            func_map: HashMap::new(),
            locals: Vec::new(),
            stack: None,
            sp: None,
            stack_ty: None,
            block_map: HashMap::new(),
            terminated: false,
            fresh: 0,
        }
    }

    /// Compile a whole bytecode program into the module.
    pub fn compile_program(&mut self, program: &Program) {
        for func in &program.functions {
            self.declare_function(func);
        }
        for func in &program.functions {
            self.compile_function(func);
        }
    }

    fn declare_function(&mut self, func: &Function) {
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();

        let llvm_func = if func.is_main {
            self.module
                .add_function("main", i32_ty.fn_type(&[], false), None)
        } else {
            let params: Vec<_> = func.params.iter().map(|_| i64_ty.into()).collect();
            self.module.add_function(
                &format!("zn_{}", func.name),
                i64_ty.fn_type(&params, false),
                None,
            )
        };
        self.func_map.insert(func.name.clone(), llvm_func);
    }

    fn compile_function(&mut self, func: &Function) {
        let llvm_func = self.func_map[&func.name];
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();

        let entry = self.context.append_basic_block(llvm_func, "entry");
        self.builder.position_at_end(entry);
        self.block_map.clear();
        self.locals.clear();
        self.terminated = false;

        // Local slots, parameters first.
        for i in 0..func.locals {
            let alloca = self
                .builder
                .build_alloca(i64_ty, &format!("local_{}", i))
                .unwrap();
            self.builder
                .build_store(alloca, i64_ty.const_int(0, false))
                .unwrap();
            self.locals.push(alloca);
        }
        if !func.is_main {
            for (i, param) in llvm_func.get_param_iter().enumerate() {
                if i < self.locals.len() {
                    self.builder.build_store(self.locals[i], param).unwrap();
                }
            }
        }

        // The operand stack: a spill array plus a stack pointer.
        let stack_ty = i64_ty.array_type(STACK_SLOTS);
        let stack = self.builder.build_alloca(stack_ty, "stack").unwrap();
        let sp = self.builder.build_alloca(i32_ty, "sp").unwrap();
        self.builder
            .build_store(sp, i32_ty.const_int(0, false))
            .unwrap();
        self.stack = Some(stack);
        self.sp = Some(sp);
        self.stack_ty = Some(stack_ty);

        // Pre-create blocks at jump targets.
        for instr in &func.code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) = instr.op {
                if !self.block_map.contains_key(&t) {
                    let block = self
                        .context
                        .append_basic_block(llvm_func, &format!("L{}", t));
                    self.block_map.insert(t, block);
                }
            }
        }

        for (idx, instr) in func.code.iter().enumerate() {
            if let Some(&block) = self.block_map.get(&idx) {
                if !self.terminated {
                    self.builder.build_unconditional_branch(block).unwrap();
                }
                self.builder.position_at_end(block);
                self.terminated = false;
            } else if self.terminated {
                // Dead code after a return; keep emitting into a
                // detached block so the walk stays linear.
                let dead = self
                    .context
                    .append_basic_block(llvm_func, &format!("dead{}", idx));
                self.builder.position_at_end(dead);
                self.terminated = false;
            }
            self.compile_op(&instr.op, idx, func, llvm_func);
        }

        if !self.terminated {
            if func.is_main {
                self.builder
                    .build_return(Some(&i32_ty.const_int(0, false)))
                    .unwrap();
            } else {
                self.builder
                    .build_return(Some(&i64_ty.const_int(0, false)))
                    .unwrap();
            }
        }
    }

    // ============ Operand stack ============

    fn push(&self, value: IntValue<'ctx>) {
        let i32_ty = self.context.i32_type();
        let sp = self.sp.unwrap();
        let sp_val = self
            .builder
            .build_load(i32_ty, sp, "sp_val")
            .unwrap()
            .into_int_value();
        let slot = unsafe {
            self.builder
                .build_gep(
                    self.stack_ty.unwrap(),
                    self.stack.unwrap(),
                    &[i32_ty.const_int(0, false), sp_val],
                    "slot",
                )
                .unwrap()
        };
        self.builder.build_store(slot, value).unwrap();
        let new_sp = self
            .builder
            .build_int_add(sp_val, i32_ty.const_int(1, false), "sp_inc")
            .unwrap();
        self.builder.build_store(sp, new_sp).unwrap();
    }

    fn pop(&self) -> IntValue<'ctx> {
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();
        let sp = self.sp.unwrap();
        let sp_val = self
            .builder
            .build_load(i32_ty, sp, "sp_val")
            .unwrap()
            .into_int_value();
        let new_sp = self
            .builder
            .build_int_sub(sp_val, i32_ty.const_int(1, false), "sp_dec")
            .unwrap();
        self.builder.build_store(sp, new_sp).unwrap();
        let slot = unsafe {
            self.builder
                .build_gep(
                    self.stack_ty.unwrap(),
                    self.stack.unwrap(),
                    &[i32_ty.const_int(0, false), new_sp],
                    "slot",
                )
                .unwrap()
        };
        self.builder
            .build_load(i64_ty, slot, "popped")
            .unwrap()
            .into_int_value()
    }

    /// Duplicate the top of the stack, returning the value.
    fn peek(&self) -> IntValue<'ctx> {
        let value = self.pop();
        self.push(value);
        self.push(value);
        value
    }

    // ============ Conversions ============

    fn as_f64(&self, bits: IntValue<'ctx>) -> inkwell::values::FloatValue<'ctx> {
        self.builder
            .build_bit_cast(bits, self.context.f64_type(), "as_f64")
            .unwrap()
            .into_float_value()
    }

    fn from_f64(&self, value: inkwell::values::FloatValue<'ctx>) -> IntValue<'ctx> {
        self.builder
            .build_bit_cast(value, self.context.i64_type(), "as_i64")
            .unwrap()
            .into_int_value()
    }

    fn as_ptr(&self, value: IntValue<'ctx>) -> PointerValue<'ctx> {
        self.builder
            .build_int_to_ptr(value, self.context.ptr_type(AddressSpace::default()), "as_ptr")
            .unwrap()
    }

    fn from_ptr(&self, value: PointerValue<'ctx>) -> IntValue<'ctx> {
        self.builder
            .build_ptr_to_int(value, self.context.i64_type(), "as_int")
            .unwrap()
    }

    fn bool_to_i64(&self, value: IntValue<'ctx>) -> IntValue<'ctx> {
        self.builder
            .build_int_z_extend(value, self.context.i64_type(), "as_i64")
            .unwrap()
    }

    fn string_ptr(&mut self, value: &str) -> PointerValue<'ctx> {
        self.fresh += 1;
        self.builder
            .build_global_string_ptr(value, &format!(".str{}", self.fresh))
            .unwrap()
            .as_pointer_value()
    }

    fn call(
        &self,
        func: FunctionValue<'ctx>,
        args: &[BasicMetadataValueEnum<'ctx>],
    ) -> Option<inkwell::values::BasicValueEnum<'ctx>> {
        self.builder
            .build_call(func, args, "call")
            .unwrap()
            .try_as_basic_value()
            .left()
    }

    // ============ Instruction translation ============

    fn compile_op(
        &mut self,
        op: &Op,
        idx: usize,
        func: &Function,
        llvm_func: FunctionValue<'ctx>,
    ) {
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();
        let f64_ty = self.context.f64_type();

        match op {
            Op::PushInt(v) => self.push(i64_ty.const_int(*v as u64, true)),
            Op::PushFloat(v) => {
                let bits = self.from_f64(f64_ty.const_float(*v));
                self.push(bits);
            }
            Op::PushStr(s) => {
                let value = s.clone();
                let ptr = self.string_ptr(&value);
                let int = self.from_ptr(ptr);
                self.push(int);
            }
            Op::PushChar(c) => self.push(i64_ty.const_int(*c as u32 as u64, false)),
            Op::PushBool(b) => self.push(i64_ty.const_int(u64::from(*b), false)),
            Op::PushNull => self.push(i64_ty.const_int(0, false)),
            Op::Pop => {
                self.pop();
            }
            Op::Dup => {
                self.peek();
            }

            Op::LoadLocal(i) => {
                let value = self
                    .builder
                    .build_load(i64_ty, self.locals[*i as usize], "load")
                    .unwrap()
                    .into_int_value();
                self.push(value);
            }
            Op::StoreLocal(i) => {
                let value = self.pop();
                self.builder
                    .build_store(self.locals[*i as usize], value)
                    .unwrap();
            }
            // Zinc has no module-level variables; unresolved globals
            // only arise from passthrough names, which this backend
            // cannot bind.
            Op::LoadGlobal(_) => self.push(i64_ty.const_int(0, false)),
            Op::StoreGlobal(_) => {
                self.pop();
            }
            Op::AddrLocal(i) => {
                let int = self.from_ptr(self.locals[*i as usize]);
                self.push(int);
            }
            Op::AddrGlobal(_) => self.push(i64_ty.const_int(0, false)),

            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                let b = self.pop();
                let a = self.pop();
                let result = match op {
                    Op::Add => self.builder.build_int_add(a, b, "add"),
                    Op::Sub => self.builder.build_int_sub(a, b, "sub"),
                    Op::Mul => self.builder.build_int_mul(a, b, "mul"),
                    Op::Div => self.builder.build_int_signed_div(a, b, "div"),
                    _ => self.builder.build_int_signed_rem(a, b, "rem"),
                }
                .unwrap();
                self.push(result);
            }
            Op::Neg => {
                let a = self.pop();
                let result = self.builder.build_int_neg(a, "neg").unwrap();
                self.push(result);
            }
            Op::Pow => {
                let b = self.pop();
                let a = self.pop();
                let fa = self
                    .builder
                    .build_signed_int_to_float(a, f64_ty, "fa")
                    .unwrap();
                let fb = self
                    .builder
                    .build_signed_int_to_float(b, f64_ty, "fb")
                    .unwrap();
                let result = self
                    .call(self.runtime.pow, &[fa.into(), fb.into()])
                    .unwrap()
                    .into_float_value();
                let int = self
                    .builder
                    .build_float_to_signed_int(result, i64_ty, "pow_int")
                    .unwrap();
                self.push(int);
            }

            Op::FAdd | Op::FSub | Op::FMul | Op::FDiv => {
                let b = self.as_f64(self.pop());
                let a = self.as_f64(self.pop());
                let result = match op {
                    Op::FAdd => self.builder.build_float_add(a, b, "fadd"),
                    Op::FSub => self.builder.build_float_sub(a, b, "fsub"),
                    Op::FMul => self.builder.build_float_mul(a, b, "fmul"),
                    _ => self.builder.build_float_div(a, b, "fdiv"),
                }
                .unwrap();
                let bits = self.from_f64(result);
                self.push(bits);
            }
            Op::FMod => {
                let b = self.as_f64(self.pop());
                let a = self.as_f64(self.pop());
                let result = self
                    .call(self.runtime.fmod, &[a.into(), b.into()])
                    .unwrap()
                    .into_float_value();
                let bits = self.from_f64(result);
                self.push(bits);
            }
            Op::FNeg => {
                let a = self.as_f64(self.pop());
                let result = self.builder.build_float_neg(a, "fneg").unwrap();
                let bits = self.from_f64(result);
                self.push(bits);
            }
            Op::IntToFloat => {
                let a = self.pop();
                let f = self
                    .builder
                    .build_signed_int_to_float(a, f64_ty, "sitofp")
                    .unwrap();
                let bits = self.from_f64(f);
                self.push(bits);
            }

            Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => {
                let b = self.pop();
                let a = self.pop();
                let pred = match op {
                    Op::Eq => IntPredicate::EQ,
                    Op::Ne => IntPredicate::NE,
                    Op::Lt => IntPredicate::SLT,
                    Op::Le => IntPredicate::SLE,
                    Op::Gt => IntPredicate::SGT,
                    _ => IntPredicate::SGE,
                };
                let cmp = self.builder.build_int_compare(pred, a, b, "cmp").unwrap();
                let result = self.bool_to_i64(cmp);
                self.push(result);
            }
            Op::Not => {
                let a = self.pop();
                let cmp = self
                    .builder
                    .build_int_compare(IntPredicate::EQ, a, i64_ty.const_int(0, false), "not")
                    .unwrap();
                let result = self.bool_to_i64(cmp);
                self.push(result);
            }

            Op::Jump(t) => {
                let target = self.block_map[t];
                self.builder.build_unconditional_branch(target).unwrap();
                self.terminated = true;
            }
            Op::JumpIfFalse(t) | Op::JumpIfTrue(t) => {
                let cond = self.pop();
                let pred = if matches!(op, Op::JumpIfFalse(_)) {
                    IntPredicate::EQ
                } else {
                    IntPredicate::NE
                };
                let taken = self
                    .builder
                    .build_int_compare(pred, cond, i64_ty.const_int(0, false), "taken")
                    .unwrap();
                let target = self.block_map[t];
                let fall = self
                    .context
                    .append_basic_block(llvm_func, &format!("fall{}", idx));
                self.builder
                    .build_conditional_branch(taken, target, fall)
                    .unwrap();
                self.builder.position_at_end(fall);
            }

            Op::Call { name, argc } => self.compile_call(name, *argc),
            Op::Return | Op::Halt => {
                if func.is_main {
                    self.builder
                        .build_return(Some(&i32_ty.const_int(0, false)))
                        .unwrap();
                } else {
                    self.builder
                        .build_return(Some(&i64_ty.const_int(0, false)))
                        .unwrap();
                }
                self.terminated = true;
            }
            Op::ReturnValue => {
                let value = self.pop();
                if func.is_main {
                    let code = self
                        .builder
                        .build_int_truncate(value, i32_ty, "exit_code")
                        .unwrap();
                    self.builder.build_return(Some(&code)).unwrap();
                } else {
                    self.builder.build_return(Some(&value)).unwrap();
                }
                self.terminated = true;
            }

            Op::PrintInt | Op::PrintBool => {
                let value = self.pop();
                let fmt = self.string_ptr("%lld");
                let _ = self.call(self.runtime.printf, &[fmt.into(), value.into()]);
            }
            Op::PrintFloat => {
                let value = self.as_f64(self.pop());
                let fmt = self.string_ptr("%f");
                let _ = self.call(self.runtime.printf, &[fmt.into(), value.into()]);
            }
            Op::PrintStr => {
                let ptr = self.as_ptr(self.pop());
                let fmt = self.string_ptr("%s");
                let _ = self.call(self.runtime.printf, &[fmt.into(), ptr.into()]);
            }
            Op::PrintChar => {
                let value = self.pop();
                let c = self
                    .builder
                    .build_int_truncate(value, i32_ty, "char")
                    .unwrap();
                let fmt = self.string_ptr("%c");
                let _ = self.call(self.runtime.printf, &[fmt.into(), c.into()]);
            }
            Op::PrintNewline => {
                let fmt = self.string_ptr("\n");
                let _ = self.call(self.runtime.printf, &[fmt.into()]);
            }

            Op::ReadInt | Op::ReadFloat => {
                let buf_ty = self.context.i8_type().array_type(256);
                let buf = self.builder.build_alloca(buf_ty, "read_buf").unwrap();
                let stdin = self
                    .builder
                    .build_load(
                        self.context.ptr_type(AddressSpace::default()),
                        self.runtime.stdin.as_pointer_value(),
                        "stdin",
                    )
                    .unwrap();
                let _ = self.call(
                    self.runtime.fgets,
                    &[buf.into(), i32_ty.const_int(256, false).into(), stdin.into()],
                );
                if matches!(op, Op::ReadInt) {
                    let value = self
                        .call(self.runtime.atoll, &[buf.into()])
                        .unwrap()
                        .into_int_value();
                    self.push(value);
                } else {
                    let value = self
                        .call(self.runtime.atof, &[buf.into()])
                        .unwrap()
                        .into_float_value();
                    let bits = self.from_f64(value);
                    self.push(bits);
                }
            }
            Op::ReadStr => {
                let buf = self
                    .call(
                        self.runtime.malloc,
                        &[i64_ty.const_int(256, false).into()],
                    )
                    .unwrap()
                    .into_pointer_value();
                let stdin = self
                    .builder
                    .build_load(
                        self.context.ptr_type(AddressSpace::default()),
                        self.runtime.stdin.as_pointer_value(),
                        "stdin",
                    )
                    .unwrap();
                let _ = self.call(
                    self.runtime.fgets,
                    &[buf.into(), i32_ty.const_int(256, false).into(), stdin.into()],
                );
                let int = self.from_ptr(buf);
                self.push(int);
            }
            Op::ReadChar => {
                let c = self
                    .call(self.runtime.getchar, &[])
                    .unwrap()
                    .into_int_value();
                let wide = self
                    .builder
                    .build_int_s_extend(c, i64_ty, "char_wide")
                    .unwrap();
                self.push(wide);
            }

            Op::Sqrt => {
                let value = self.pop();
                let f = self
                    .builder
                    .build_signed_int_to_float(value, f64_ty, "sqrt_in")
                    .unwrap();
                let result = self
                    .call(self.runtime.sqrt, &[f.into()])
                    .unwrap()
                    .into_float_value();
                let int = self
                    .builder
                    .build_float_to_signed_int(result, i64_ty, "sqrt_out")
                    .unwrap();
                self.push(int);
            }
            Op::Abs => {
                let value = self.pop();
                let is_neg = self
                    .builder
                    .build_int_compare(
                        IntPredicate::SLT,
                        value,
                        i64_ty.const_int(0, false),
                        "is_neg",
                    )
                    .unwrap();
                let neg = self.builder.build_int_neg(value, "negated").unwrap();
                let result = self
                    .builder
                    .build_select(is_neg, neg, value, "abs")
                    .unwrap()
                    .into_int_value();
                self.push(result);
            }

            Op::NewArray => {
                // Length-tagged: slot 0 holds the length.
                let len = self.pop();
                let slots = self
                    .builder
                    .build_int_add(len, i64_ty.const_int(1, false), "slots")
                    .unwrap();
                let block = self
                    .call(
                        self.runtime.calloc,
                        &[slots.into(), i64_ty.const_int(8, false).into()],
                    )
                    .unwrap()
                    .into_pointer_value();
                self.builder.build_store(block, len).unwrap();
                let int = self.from_ptr(block);
                self.push(int);
            }
            Op::ArrayLit(n) => {
                let len = i64_ty.const_int(*n as u64, false);
                let block = self
                    .call(
                        self.runtime.malloc,
                        &[i64_ty.const_int((*n as u64 + 1) * 8, false).into()],
                    )
                    .unwrap()
                    .into_pointer_value();
                self.builder.build_store(block, len).unwrap();
                // Values were pushed in order; pop back-to-front.
                for i in (0..*n).rev() {
                    let value = self.pop();
                    let slot = unsafe {
                        self.builder
                            .build_gep(
                                i64_ty,
                                block,
                                &[i64_ty.const_int(i as u64 + 1, false)],
                                "elem",
                            )
                            .unwrap()
                    };
                    self.builder.build_store(slot, value).unwrap();
                }
                let int = self.from_ptr(block);
                self.push(int);
            }
            Op::ArrayGet => {
                let index = self.pop();
                let array = self.as_ptr(self.pop());
                let offset = self
                    .builder
                    .build_int_add(index, i64_ty.const_int(1, false), "offset")
                    .unwrap();
                let slot = unsafe {
                    self.builder
                        .build_gep(i64_ty, array, &[offset], "elem")
                        .unwrap()
                };
                let value = self
                    .builder
                    .build_load(i64_ty, slot, "elem_val")
                    .unwrap()
                    .into_int_value();
                self.push(value);
            }
            Op::ArraySet => {
                let value = self.pop();
                let index = self.pop();
                let array = self.as_ptr(self.pop());
                let offset = self
                    .builder
                    .build_int_add(index, i64_ty.const_int(1, false), "offset")
                    .unwrap();
                let slot = unsafe {
                    self.builder
                        .build_gep(i64_ty, array, &[offset], "elem")
                        .unwrap()
                };
                self.builder.build_store(slot, value).unwrap();
            }
            Op::ArrayLen => {
                let array = self.as_ptr(self.pop());
                let len = self
                    .builder
                    .build_load(i64_ty, array, "len")
                    .unwrap()
                    .into_int_value();
                self.push(len);
            }

            Op::NewStruct(n) => {
                let block = self
                    .call(
                        self.runtime.calloc,
                        &[
                            i64_ty.const_int(*n as u64, false).into(),
                            i64_ty.const_int(8, false).into(),
                        ],
                    )
                    .unwrap()
                    .into_pointer_value();
                let int = self.from_ptr(block);
                self.push(int);
            }
            Op::FieldGet(i) => {
                let object = self.as_ptr(self.pop());
                let slot = unsafe {
                    self.builder
                        .build_gep(i64_ty, object, &[i64_ty.const_int(*i as u64, false)], "field")
                        .unwrap()
                };
                let value = self
                    .builder
                    .build_load(i64_ty, slot, "field_val")
                    .unwrap()
                    .into_int_value();
                self.push(value);
            }
            Op::FieldSet(i) => {
                let value = self.pop();
                let object = self.as_ptr(self.pop());
                let slot = unsafe {
                    self.builder
                        .build_gep(i64_ty, object, &[i64_ty.const_int(*i as u64, false)], "field")
                        .unwrap()
                };
                self.builder.build_store(slot, value).unwrap();
            }

            Op::Alloc => {
                let count = self.pop();
                let bytes = self
                    .builder
                    .build_int_mul(count, i64_ty.const_int(8, false), "bytes")
                    .unwrap();
                let block = self
                    .call(self.runtime.malloc, &[bytes.into()])
                    .unwrap()
                    .into_pointer_value();
                let int = self.from_ptr(block);
                self.push(int);
            }
            Op::FreeMem => {
                let ptr = self.as_ptr(self.pop());
                let _ = self.call(self.runtime.free, &[ptr.into()]);
            }
            Op::LoadPtr => {
                let ptr = self.as_ptr(self.pop());
                let value = self
                    .builder
                    .build_load(i64_ty, ptr, "deref")
                    .unwrap()
                    .into_int_value();
                self.push(value);
            }
            Op::StorePtr => {
                let value = self.pop();
                let ptr = self.as_ptr(self.pop());
                self.builder.build_store(ptr, value).unwrap();
            }

            Op::Random => {
                let max = self.pop();
                let min = self.pop();
                // Re-seeded from the clock on every draw; the runtime
                // has no other initialization point.
                let null_ptr = self
                    .context
                    .ptr_type(AddressSpace::default())
                    .const_null();
                let now = self
                    .call(self.runtime.time, &[null_ptr.into()])
                    .unwrap()
                    .into_int_value();
                let seed = self
                    .builder
                    .build_int_truncate(now, i32_ty, "seed")
                    .unwrap();
                let _ = self.call(self.runtime.srand, &[seed.into()]);
                let raw = self
                    .call(self.runtime.rand, &[])
                    .unwrap()
                    .into_int_value();
                let wide = self
                    .builder
                    .build_int_s_extend(raw, i64_ty, "rand_wide")
                    .unwrap();
                let range = self.builder.build_int_sub(max, min, "range").unwrap();
                let range = self
                    .builder
                    .build_int_add(range, i64_ty.const_int(1, false), "range1")
                    .unwrap();
                let rem = self
                    .builder
                    .build_int_signed_rem(wide, range, "rand_mod")
                    .unwrap();
                let result = self.builder.build_int_add(min, rem, "rand_val").unwrap();
                self.push(result);
            }

            Op::Nop => {}
        }
    }

    fn compile_call(&mut self, name: &str, argc: u8) {
        let i64_ty = self.context.i64_type();

        if name.starts_with("__") && name.ends_with("__") {
            self.compile_builtin_call(name, argc);
            return;
        }

        if let Some(&callee) = self.func_map.get(name) {
            let mut args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.insert(0, self.pop().into());
            }
            let result = self
                .call(callee, &args)
                .map(|v| v.into_int_value())
                .unwrap_or_else(|| i64_ty.const_int(0, false));
            self.push(result);
        } else {
            // Unknown function: there is no downstream C compiler to
            // bind it, so the call collapses to zero.
            for _ in 0..argc {
                self.pop();
            }
            self.push(i64_ty.const_int(0, false));
        }
    }

    fn compile_builtin_call(&mut self, name: &str, argc: u8) {
        let i64_ty = self.context.i64_type();
        let i32_ty = self.context.i32_type();

        match name {
            "__strstr__" => {
                let needle = self.as_ptr(self.pop());
                let hay = self.as_ptr(self.pop());
                let found = self
                    .call(self.runtime.strstr, &[hay.into(), needle.into()])
                    .unwrap()
                    .into_pointer_value();
                let found_int = self.from_ptr(found);
                let non_null = self
                    .builder
                    .build_int_compare(
                        IntPredicate::NE,
                        found_int,
                        i64_ty.const_int(0, false),
                        "found",
                    )
                    .unwrap();
                let result = self.bool_to_i64(non_null);
                self.push(result);
            }
            "__open_file__" => {
                let mode = self.as_ptr(self.pop());
                let path = self.as_ptr(self.pop());
                let file = self
                    .call(self.runtime.fopen, &[path.into(), mode.into()])
                    .unwrap()
                    .into_pointer_value();
                let int = self.from_ptr(file);
                self.push(int);
            }
            "__close_file__" => {
                let file = self.as_ptr(self.pop());
                let _ = self.call(self.runtime.fclose, &[file.into()]);
                self.push(i64_ty.const_int(0, false));
            }
            "__has_line__" => {
                let file = self.as_ptr(self.pop());
                let eof = self
                    .call(self.runtime.feof, &[file.into()])
                    .unwrap()
                    .into_int_value();
                let more = self
                    .builder
                    .build_int_compare(IntPredicate::EQ, eof, i32_ty.const_int(0, false), "more")
                    .unwrap();
                let result = self.bool_to_i64(more);
                self.push(result);
            }
            "__read_line__" => {
                let target = self.as_ptr(self.pop());
                let file = self.as_ptr(self.pop());
                let line = self
                    .call(
                        self.runtime.fgets,
                        &[target.into(), i32_ty.const_int(256, false).into(), file.into()],
                    )
                    .unwrap()
                    .into_pointer_value();
                let int = self.from_ptr(line);
                self.push(int);
            }
            _ => {
                // Graphics builtins need raylib; the C path carries
                // them, this backend stubs them out.
                for _ in 0..argc {
                    self.pop();
                }
                self.push(i64_ty.const_int(0, false));
            }
        }
    }

    // ============ Output ============

    /// The LLVM IR as text (`--emit-llvm`).
    pub fn get_llvm_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn verify(&self) -> Result<(), String> {
        self.module.verify().map_err(|e| e.to_string())
    }

    pub fn optimize(&self, level: OptLevel) {
        let opt_level = match level {
            OptLevel::None => OptimizationLevel::None,
            OptLevel::Less => OptimizationLevel::Less,
            OptLevel::Default => OptimizationLevel::Default,
            OptLevel::Aggressive => OptimizationLevel::Aggressive,
        };

        Target::initialize_native(&InitializationConfig::default()).unwrap();
        let target_triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&target_triple).unwrap();
        let target_machine = target
            .create_target_machine(
                &target_triple,
                "generic",
                "",
                opt_level,
                RelocMode::Default,
                CodeModel::Default,
            )
            .unwrap();

        let passes = match level {
            OptLevel::None => "default<O0>",
            OptLevel::Less => "default<O1>",
            OptLevel::Default => "default<O2>",
            OptLevel::Aggressive => "default<O3>",
        };
        self.module
            .run_passes(passes, &target_machine, PassBuilderOptions::create())
            .unwrap();
    }

    pub fn write_object_file(&self, path: &Path) -> Result<(), String> {
        Target::initialize_native(&InitializationConfig::default()).map_err(|e| e.to_string())?;

        let target_triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&target_triple).map_err(|e| e.to_string())?;
        let target_machine = target
            .create_target_machine(
                &target_triple,
                "generic",
                "",
                OptimizationLevel::Default,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or("could not create target machine")?;

        target_machine
            .write_to_file(&self.module, FileType::Object, path)
            .map_err(|e| e.to_string())
    }

    pub fn write_llvm_ir(&self, path: &Path) -> Result<(), String> {
        self.module.print_to_file(path).map_err(|e| e.to_string())
    }
}

/// Optimization level (maps `-O 0..3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    Less,
    #[default]
    Default,
    Aggressive,
}

impl OptLevel {
    pub fn from_flag(level: u8) -> Self {
        match level {
            0 => OptLevel::None,
            1 => OptLevel::Less,
            2 => OptLevel::Default,
            _ => OptLevel::Aggressive,
        }
    }
}

/// Compile bytecode to a native executable: object file through a
/// target machine, then linked with the system `cc`.
pub fn compile_to_executable(
    program: &Program,
    output_path: &Path,
    opt_level: OptLevel,
) -> Result<(), String> {
    let context = Context::create();
    let mut codegen = LlvmCodegen::new(&context, "zinc_program");
    codegen.compile_program(program);
    codegen.verify()?;
    codegen.optimize(opt_level);

    let obj_path = output_path.with_extension("o");
    codegen.write_object_file(&obj_path)?;

    let status = std::process::Command::new("cc")
        .arg(&obj_path)
        .arg("-o")
        .arg(output_path)
        .arg("-lm")
        .status()
        .map_err(|e| format!("failed to run linker: {}", e))?;

    let _ = std::fs::remove_file(&obj_path);
    if !status.success() {
        return Err("linking failed".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::bytecode::Instr;

    #[test]
    fn test_compile_hello_program() {
        let program = Program {
            functions: vec![Function {
                name: "main".into(),
                params: vec![],
                locals: 0,
                code: vec![
                    Instr::new(Op::PushStr("hi".into()), 1),
                    Instr::new(Op::PrintStr, 1),
                    Instr::new(Op::PrintNewline, 1),
                    Instr::new(Op::PushInt(0), 1),
                    Instr::new(Op::ReturnValue, 1),
                ],
                is_main: true,
            }],
            structs: vec![],
        };

        let context = Context::create();
        let mut codegen = LlvmCodegen::new(&context, "test");
        codegen.compile_program(&program);
        assert!(codegen.verify().is_ok(), "{}", codegen.get_llvm_ir());
        let ir = codegen.get_llvm_ir();
        assert!(ir.contains("define i32 @main"));
        assert!(ir.contains("printf"));
    }
}
