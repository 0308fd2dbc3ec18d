//! AST to bytecode lowering
//!
//! One pass over the resolved AST per function. Control flow is emitted
//! with forward jumps patched once targets are known; a loop-frame stack
//! collects break/continue jumps (continue targets the loop's increment
//! sequence, not its condition). Arithmetic picks integer or float
//! opcodes from the statically tracked operand types and inserts
//! `IntToFloat` where the sides disagree.
//!
//! Raw-C statements cannot be expressed here: the passthrough escape
//! hatch exists only on the C path, so they are a lowering error.

use super::bytecode::{Function, Instr, Op, Program, StructLayout};
use crate::ast::{
    self, BaseType, BinOp, Expr, ExprKind, FileMode, GfxExpr, GfxStmt, InputType, Stmt, StmtKind,
    TypeSpec, UnOp,
};
use crate::error::LowerError;
use crate::resolve::Symbols;
use std::collections::HashMap;

/// Lower a resolved program to bytecode.
pub fn lower(program: &ast::Program, symbols: &Symbols) -> Result<Program, LowerError> {
    let mut out = Program::default();
    for def in &symbols.structs {
        out.structs.push(StructLayout {
            name: def.name.clone(),
            fields: def.fields.iter().map(|f| f.name.clone()).collect(),
        });
    }

    let mut lowerer = Lowerer {
        symbols,
        code: Vec::new(),
        locals: HashMap::new(),
        local_types: HashMap::new(),
        local_count: 0,
        loops: Vec::new(),
        last_file: None,
    };
    for func in &program.functions {
        out.functions.push(lowerer.lower_function(func)?);
    }
    Ok(out)
}

struct LoopFrame {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

struct Lowerer<'a> {
    symbols: &'a Symbols,
    code: Vec<Instr>,
    locals: HashMap<String, u16>,
    local_types: HashMap<String, TypeSpec>,
    local_count: u16,
    loops: Vec<LoopFrame>,
    last_file: Option<String>,
}

impl<'a> Lowerer<'a> {
    fn lower_function(&mut self, func: &ast::FnDef) -> Result<Function, LowerError> {
        self.code = Vec::new();
        self.locals = HashMap::new();
        self.local_types = HashMap::new();
        self.local_count = 0;
        self.loops = Vec::new();
        self.last_file = None;

        for param in &func.params {
            let slot = self.alloc_slot();
            self.locals.insert(param.name.clone(), slot);
            self.local_types.insert(param.name.clone(), param.ty.clone());
        }

        for stmt in &func.body {
            self.lower_stmt(stmt)?;
        }

        // Implicit return on fallthrough.
        let terminated = matches!(
            self.code.last().map(|i| &i.op),
            Some(Op::Return) | Some(Op::ReturnValue)
        );
        if !terminated {
            if func.is_main {
                self.emit(Op::PushInt(0), 0);
                self.emit(Op::ReturnValue, 0);
            } else {
                self.emit(Op::Return, 0);
            }
        }

        Ok(Function {
            name: func.name.clone(),
            params: func.params.iter().map(|p| p.name.clone()).collect(),
            locals: self.local_count,
            code: std::mem::take(&mut self.code),
            is_main: func.is_main,
        })
    }

    fn emit(&mut self, op: Op, line: u32) -> usize {
        self.code.push(Instr::new(op, line));
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    fn patch(&mut self, idx: usize, target: usize) {
        match &mut self.code[idx].op {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) => *t = target,
            other => unreachable!("patching a non-jump instruction {:?}", other),
        }
    }

    fn alloc_slot(&mut self) -> u16 {
        let slot = self.local_count;
        self.local_count += 1;
        slot
    }

    fn declare(&mut self, name: &str, ty: TypeSpec) -> u16 {
        let slot = self.alloc_slot();
        self.locals.insert(name.to_string(), slot);
        self.local_types.insert(name.to_string(), ty);
        slot
    }

    // ============ Types ============

    fn type_of(&self, expr: &Expr) -> Option<TypeSpec> {
        match &expr.kind {
            ExprKind::Ident { name, .. } => self.local_types.get(name).cloned(),
            ExprKind::Member { object, field } => {
                let obj = self.type_of(object)?;
                if let BaseType::Struct(struct_name) = &obj.base {
                    let def = self.symbols.struct_def(struct_name)?;
                    def.fields.iter().find(|f| &f.name == field).map(|f| f.ty.clone())
                } else {
                    None
                }
            }
            ExprKind::Index { array, .. } => {
                let mut ty = self.type_of(array)?;
                ty.is_array = false;
                ty.array_size = None;
                ty.is_pointer = false;
                Some(ty)
            }
            ExprKind::Deref(operand) => {
                let mut ty = self.type_of(operand)?;
                ty.is_pointer = false;
                Some(ty)
            }
            ExprKind::Call { name, .. } => self
                .symbols
                .functions
                .get(name)
                .and_then(|f| f.return_type.clone()),
            _ => None,
        }
    }

    fn is_float(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Float(_) => true,
            ExprKind::Binary { op, left, right } => match op {
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                    self.is_float(left) || self.is_float(right)
                }
                _ => false,
            },
            ExprKind::Unary { op, operand } => match op {
                UnOp::Neg | UnOp::Abs => self.is_float(operand),
                _ => false,
            },
            _ => match self.type_of(expr) {
                Some(ty) => ty.base == BaseType::Decimal && !ty.is_pointer && !ty.is_array,
                None => false,
            },
        }
    }

    fn print_op(&self, expr: &Expr) -> Op {
        if self.is_float(expr) {
            return Op::PrintFloat;
        }
        match &expr.kind {
            ExprKind::Str(_) => Op::PrintStr,
            ExprKind::CharLit(_) => Op::PrintChar,
            ExprKind::Bool(_) => Op::PrintBool,
            _ => match self.type_of(expr) {
                Some(ty) if !ty.is_pointer && !ty.is_array => match ty.base {
                    BaseType::Text => Op::PrintStr,
                    BaseType::Letter => Op::PrintChar,
                    BaseType::Boolean => Op::PrintBool,
                    _ => Op::PrintInt,
                },
                _ => Op::PrintInt,
            },
        }
    }

    fn field_index(&self, object: &Expr, field: &str, pos: crate::span::Position) -> Result<u32, LowerError> {
        let ty = self.type_of(object);
        let struct_name = match ty.as_ref().map(|t| &t.base) {
            Some(BaseType::Struct(name)) => name.clone(),
            _ => {
                return Err(LowerError::UnknownField {
                    field: field.to_string(),
                    pos,
                })
            }
        };
        let def = self
            .symbols
            .struct_def(&struct_name)
            .ok_or_else(|| LowerError::UnknownStruct {
                name: struct_name.clone(),
                pos,
            })?;
        def.fields
            .iter()
            .position(|f| f.name == field)
            .map(|i| i as u32)
            .ok_or_else(|| LowerError::UnknownField {
                field: field.to_string(),
                pos,
            })
    }

    // ============ Statements ============

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        let line = stmt.pos.line;
        match &stmt.kind {
            StmtKind::VarDecl { name, ty, init } => {
                let ty = ty.clone().unwrap_or_else(TypeSpec::number);

                if ty.is_array {
                    match init {
                        Some(Expr { kind: ExprKind::ArrayLit(elements), .. }) => {
                            for element in elements {
                                self.lower_expr(element)?;
                            }
                            self.emit(Op::ArrayLit(elements.len() as u32), line);
                        }
                        _ => match ty.array_size {
                            Some(size) => {
                                self.emit(Op::PushInt(size as i64), line);
                                self.emit(Op::NewArray, line);
                            }
                            None => {
                                self.emit(Op::PushNull, line);
                            }
                        },
                    }
                    let slot = self.declare(name, ty);
                    self.emit(Op::StoreLocal(slot), line);
                    return Ok(());
                }

                match init {
                    Some(init @ Expr { kind: ExprKind::StructInit(fields), .. }) => {
                        let struct_name = match &ty.base {
                            BaseType::Struct(n) => n.clone(),
                            _ => {
                                return Err(LowerError::UnknownStruct {
                                    name: name.clone(),
                                    pos: init.pos,
                                })
                            }
                        };
                        let def = self.symbols.struct_def(&struct_name).ok_or_else(|| {
                            LowerError::UnknownStruct {
                                name: struct_name.clone(),
                                pos: init.pos,
                            }
                        })?;
                        self.emit(Op::NewStruct(def.fields.len() as u32), line);
                        let field_defs = def.fields.clone();
                        for (field, value) in fields {
                            let idx = field_defs
                                .iter()
                                .position(|f| &f.name == field)
                                .ok_or_else(|| LowerError::UnknownField {
                                    field: field.clone(),
                                    pos: value.pos,
                                })? as u32;
                            self.emit(Op::Dup, line);
                            self.lower_expr(value)?;
                            self.emit(Op::FieldSet(idx), line);
                        }
                    }
                    Some(init) => {
                        self.lower_expr(init)?;
                        if ty.base == BaseType::Decimal && !ty.is_pointer && !self.is_float(init) {
                            self.emit(Op::IntToFloat, line);
                        }
                    }
                    None => match (&ty.base, ty.is_pointer) {
                        (_, true) => {
                            self.emit(Op::PushNull, line);
                        }
                        (BaseType::Decimal, _) => {
                            self.emit(Op::PushFloat(0.0), line);
                        }
                        (BaseType::Text, _) | (BaseType::File, _) => {
                            self.emit(Op::PushNull, line);
                        }
                        (BaseType::Letter, _) => {
                            self.emit(Op::PushChar('\0'), line);
                        }
                        (BaseType::Struct(struct_name), _) => {
                            let count = self
                                .symbols
                                .struct_def(struct_name)
                                .map(|d| d.fields.len() as u32)
                                .ok_or_else(|| LowerError::UnknownStruct {
                                    name: struct_name.clone(),
                                    pos: stmt.pos,
                                })?;
                            self.emit(Op::NewStruct(count), line);
                        }
                        _ => {
                            self.emit(Op::PushInt(0), line);
                        }
                    },
                }
                let slot = self.declare(name, ty);
                self.emit(Op::StoreLocal(slot), line);
                Ok(())
            }
            StmtKind::FileDecl { name, path, mode } => {
                match path {
                    Some(path) => {
                        self.lower_expr(path)?;
                        let mode = match mode {
                            FileMode::Read => "r",
                            FileMode::Write => "w",
                        };
                        self.emit(Op::PushStr(mode.to_string()), line);
                        self.emit(
                            Op::Call {
                                name: "__open_file__".to_string(),
                                argc: 2,
                            },
                            line,
                        );
                    }
                    None => {
                        self.emit(Op::PushNull, line);
                    }
                }
                let slot = self.declare(name, TypeSpec::base(BaseType::File));
                self.last_file = Some(name.clone());
                self.emit(Op::StoreLocal(slot), line);
                Ok(())
            }
            StmtKind::Assign { target, value } => self.lower_assign(target, value, line),
            StmtKind::Compound { op, target, value } => {
                // Desugar to `target = target op value`.
                let combined = Expr::new(
                    ExprKind::Binary {
                        op: *op,
                        left: Box::new(target.clone()),
                        right: Box::new(value.clone()),
                    },
                    stmt.pos,
                );
                self.lower_assign(target, &combined, line)
            }
            StmtKind::If {
                condition,
                then_body,
                else_ifs,
                else_body,
            } => {
                self.lower_expr(condition)?;
                let mut jump_next = self.emit(Op::JumpIfFalse(0), line);
                for s in then_body {
                    self.lower_stmt(s)?;
                }

                if else_ifs.is_empty() && else_body.is_empty() {
                    let here = self.here();
                    self.patch(jump_next, here);
                    return Ok(());
                }

                let mut end_jumps = vec![self.emit(Op::Jump(0), line)];
                for (cond, body) in else_ifs {
                    let here = self.here();
                    self.patch(jump_next, here);
                    self.lower_expr(cond)?;
                    jump_next = self.emit(Op::JumpIfFalse(0), line);
                    for s in body {
                        self.lower_stmt(s)?;
                    }
                    end_jumps.push(self.emit(Op::Jump(0), line));
                }

                let here = self.here();
                self.patch(jump_next, here);
                for s in else_body {
                    self.lower_stmt(s)?;
                }
                let end = self.here();
                for jump in end_jumps {
                    self.patch(jump, end);
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let cond_start = self.here();
                self.lower_expr(condition)?;
                let exit = self.emit(Op::JumpIfFalse(0), line);

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                for s in body {
                    self.lower_stmt(s)?;
                }
                let frame = self.loops.pop().expect("loop frame pushed above");

                for jump in frame.continue_jumps {
                    self.patch(jump, cond_start);
                }
                self.emit(Op::Jump(cond_start), line);
                let end = self.here();
                self.patch(exit, end);
                for jump in frame.break_jumps {
                    self.patch(jump, end);
                }
                Ok(())
            }
            StmtKind::For {
                var,
                start,
                end,
                descending,
                body,
            } => {
                self.lower_expr(start)?;
                let slot = self.declare(var, TypeSpec::number());
                self.emit(Op::StoreLocal(slot), line);

                let cond_start = self.here();
                self.emit(Op::LoadLocal(slot), line);
                self.lower_expr(end)?;
                self.emit(if *descending { Op::Ge } else { Op::Le }, line);
                let exit = self.emit(Op::JumpIfFalse(0), line);

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                for s in body {
                    self.lower_stmt(s)?;
                }
                let frame = self.loops.pop().expect("loop frame pushed above");

                let incr = self.here();
                for jump in frame.continue_jumps {
                    self.patch(jump, incr);
                }
                self.emit(Op::LoadLocal(slot), line);
                self.emit(Op::PushInt(1), line);
                self.emit(if *descending { Op::Sub } else { Op::Add }, line);
                self.emit(Op::StoreLocal(slot), line);
                self.emit(Op::Jump(cond_start), line);

                let end = self.here();
                self.patch(exit, end);
                for jump in frame.break_jumps {
                    self.patch(jump, end);
                }
                Ok(())
            }
            StmtKind::ForEach {
                var,
                ty,
                iterable,
                body,
            } => {
                let idx_slot = self.alloc_slot();
                self.emit(Op::PushInt(0), line);
                self.emit(Op::StoreLocal(idx_slot), line);

                self.lower_expr(iterable)?;
                let arr_slot = self.alloc_slot();
                self.emit(Op::StoreLocal(arr_slot), line);

                let elem_ty = ty
                    .clone()
                    .or_else(|| {
                        self.type_of(iterable).map(|mut t| {
                            t.is_array = false;
                            t.array_size = None;
                            t
                        })
                    })
                    .unwrap_or_else(TypeSpec::number);
                let var_slot = self.declare(var, elem_ty);

                let cond_start = self.here();
                self.emit(Op::LoadLocal(idx_slot), line);
                self.emit(Op::LoadLocal(arr_slot), line);
                self.emit(Op::ArrayLen, line);
                self.emit(Op::Lt, line);
                let exit = self.emit(Op::JumpIfFalse(0), line);

                self.emit(Op::LoadLocal(arr_slot), line);
                self.emit(Op::LoadLocal(idx_slot), line);
                self.emit(Op::ArrayGet, line);
                self.emit(Op::StoreLocal(var_slot), line);

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                for s in body {
                    self.lower_stmt(s)?;
                }
                let frame = self.loops.pop().expect("loop frame pushed above");

                let incr = self.here();
                for jump in frame.continue_jumps {
                    self.patch(jump, incr);
                }
                self.emit(Op::LoadLocal(idx_slot), line);
                self.emit(Op::PushInt(1), line);
                self.emit(Op::Add, line);
                self.emit(Op::StoreLocal(idx_slot), line);
                self.emit(Op::Jump(cond_start), line);

                let end = self.here();
                self.patch(exit, end);
                for jump in frame.break_jumps {
                    self.patch(jump, end);
                }
                Ok(())
            }
            StmtKind::Repeat { count, body } => {
                let counter = self.alloc_slot();
                self.emit(Op::PushInt(0), line);
                self.emit(Op::StoreLocal(counter), line);

                // Evaluate the limit once.
                self.lower_expr(count)?;
                let limit = self.alloc_slot();
                self.emit(Op::StoreLocal(limit), line);

                let cond_start = self.here();
                self.emit(Op::LoadLocal(counter), line);
                self.emit(Op::LoadLocal(limit), line);
                self.emit(Op::Lt, line);
                let exit = self.emit(Op::JumpIfFalse(0), line);

                self.loops.push(LoopFrame {
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });
                for s in body {
                    self.lower_stmt(s)?;
                }
                let frame = self.loops.pop().expect("loop frame pushed above");

                let incr = self.here();
                for jump in frame.continue_jumps {
                    self.patch(jump, incr);
                }
                self.emit(Op::LoadLocal(counter), line);
                self.emit(Op::PushInt(1), line);
                self.emit(Op::Add, line);
                self.emit(Op::StoreLocal(counter), line);
                self.emit(Op::Jump(cond_start), line);

                let end = self.here();
                self.patch(exit, end);
                for jump in frame.break_jumps {
                    self.patch(jump, end);
                }
                Ok(())
            }
            StmtKind::Return { value } => {
                match value {
                    Some(value) => {
                        self.lower_expr(value)?;
                        self.emit(Op::ReturnValue, line);
                    }
                    None => {
                        self.emit(Op::Return, line);
                    }
                }
                Ok(())
            }
            StmtKind::Break => {
                let jump = self.emit(Op::Jump(0), line);
                match self.loops.last_mut() {
                    Some(frame) => {
                        frame.break_jumps.push(jump);
                        Ok(())
                    }
                    None => Err(LowerError::BreakOutsideLoop { pos: stmt.pos }),
                }
            }
            StmtKind::Continue => {
                let jump = self.emit(Op::Jump(0), line);
                match self.loops.last_mut() {
                    Some(frame) => {
                        frame.continue_jumps.push(jump);
                        Ok(())
                    }
                    None => Err(LowerError::ContinueOutsideLoop { pos: stmt.pos }),
                }
            }
            StmtKind::Print { parts } => {
                for part in parts {
                    self.lower_expr(part)?;
                    let op = self.print_op(part);
                    self.emit(op, line);
                }
                self.emit(Op::PrintNewline, line);
                Ok(())
            }
            StmtKind::Input { target, ty } => {
                let op = match ty {
                    InputType::Number => Op::ReadInt,
                    InputType::Decimal => Op::ReadFloat,
                    InputType::Text => Op::ReadStr,
                    InputType::Letter => Op::ReadChar,
                };
                self.emit(op, line);
                match &target.kind {
                    ExprKind::Ident { name, .. } => match self.locals.get(name.as_str()).copied() {
                        Some(slot) => {
                            self.emit(Op::StoreLocal(slot), line);
                        }
                        None => {
                            self.emit(Op::StoreGlobal(name.clone()), line);
                        }
                    },
                    _ => {
                        self.emit(Op::Pop, line);
                    }
                }
                Ok(())
            }
            StmtKind::Free { pointer } => {
                self.lower_expr(pointer)?;
                self.emit(Op::FreeMem, line);
                Ok(())
            }
            StmtKind::CloseFile { file } => {
                self.lower_expr(file)?;
                self.emit(
                    Op::Call {
                        name: "__close_file__".to_string(),
                        argc: 1,
                    },
                    line,
                );
                self.emit(Op::Pop, line);
                Ok(())
            }
            StmtKind::Graphics(gfx) => {
                self.lower_graphics(gfx, line)?;
                Ok(())
            }
            StmtKind::RawC(_) => Err(LowerError::RawCUnsupported { pos: stmt.pos }),
            StmtKind::Expr(expr) => {
                self.lower_expr(expr)?;
                self.emit(Op::Pop, line);
                Ok(())
            }
        }
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr, line: u32) -> Result<(), LowerError> {
        match &target.kind {
            ExprKind::Ident { name, .. } => {
                self.lower_expr(value)?;
                let target_float = self
                    .local_types
                    .get(name.as_str())
                    .map(|t| t.base == BaseType::Decimal && !t.is_pointer && !t.is_array)
                    .unwrap_or(false);
                if target_float && !self.is_float(value) {
                    self.emit(Op::IntToFloat, line);
                }
                match self.locals.get(name.as_str()).copied() {
                    Some(slot) => {
                        self.emit(Op::StoreLocal(slot), line);
                    }
                    None => {
                        self.emit(Op::StoreGlobal(name.clone()), line);
                    }
                }
                Ok(())
            }
            ExprKind::Index { array, index } => {
                self.lower_array_index(array, index)?;
                self.lower_expr(value)?;
                self.emit(Op::ArraySet, line);
                Ok(())
            }
            ExprKind::Member { object, field } => {
                let idx = self.field_index(object, field, target.pos)?;
                self.lower_expr(object)?;
                self.lower_expr(value)?;
                self.emit(Op::FieldSet(idx), line);
                Ok(())
            }
            ExprKind::Deref(pointer) => {
                self.lower_expr(pointer)?;
                self.lower_expr(value)?;
                self.emit(Op::StorePtr, line);
                Ok(())
            }
            _ => {
                // Not a storable place; evaluate and discard.
                self.lower_expr(value)?;
                self.emit(Op::Pop, line);
                Ok(())
            }
        }
    }

    /// Leaves `[array, index]` on the stack; a literal -1 index becomes
    /// `length - 1`.
    fn lower_array_index(&mut self, array: &Expr, index: &Expr) -> Result<(), LowerError> {
        let line = array.pos.line;
        self.lower_expr(array)?;
        if matches!(index.kind, ExprKind::Int(-1)) {
            self.emit(Op::Dup, line);
            self.emit(Op::ArrayLen, line);
            self.emit(Op::PushInt(1), line);
            self.emit(Op::Sub, line);
        } else {
            self.lower_expr(index)?;
        }
        Ok(())
    }

    fn lower_graphics(&mut self, gfx: &GfxStmt, line: u32) -> Result<(), LowerError> {
        let call = |name: &str, argc: u8| Op::Call {
            name: name.to_string(),
            argc,
        };
        match gfx {
            GfxStmt::OpenWindow {
                width,
                height,
                title,
            } => {
                self.lower_expr(width)?;
                self.lower_expr(height)?;
                match title {
                    Some(title) => self.lower_expr(title)?,
                    None => {
                        self.emit(Op::PushStr("Zinc App".to_string()), line);
                    }
                }
                self.emit(call("__open_window__", 3), line);
            }
            GfxStmt::CloseWindow => {
                self.emit(call("__close_window__", 0), line);
            }
            GfxStmt::BeginDrawing => {
                self.emit(call("__begin_drawing__", 0), line);
            }
            GfxStmt::EndDrawing => {
                self.emit(call("__end_drawing__", 0), line);
            }
            GfxStmt::ClearScreen { color } => {
                self.emit(Op::PushStr(color.clone()), line);
                self.emit(call("__clear_screen__", 1), line);
            }
            GfxStmt::DrawRectangle {
                x,
                y,
                width,
                height,
                color,
            } => {
                self.lower_expr(x)?;
                self.lower_expr(y)?;
                self.lower_expr(width)?;
                self.lower_expr(height)?;
                self.emit(Op::PushStr(color.clone()), line);
                self.emit(call("__draw_rectangle__", 5), line);
            }
            GfxStmt::DrawText {
                text,
                x,
                y,
                size,
                color,
            } => {
                self.lower_expr(text)?;
                self.lower_expr(x)?;
                self.lower_expr(y)?;
                self.lower_expr(size)?;
                self.emit(Op::PushStr(color.clone()), line);
                self.emit(call("__draw_text__", 5), line);
            }
        }
        self.emit(Op::Pop, line);
        Ok(())
    }

    // ============ Expressions ============

    fn lower_expr(&mut self, expr: &Expr) -> Result<(), LowerError> {
        let line = expr.pos.line;
        match &expr.kind {
            ExprKind::Int(value) => {
                self.emit(Op::PushInt(*value), line);
            }
            ExprKind::Float(value) => {
                self.emit(Op::PushFloat(*value), line);
            }
            ExprKind::Str(value) => {
                self.emit(Op::PushStr(value.clone()), line);
            }
            ExprKind::CharLit(value) => {
                self.emit(Op::PushChar(*value), line);
            }
            ExprKind::Bool(value) => {
                self.emit(Op::PushBool(*value), line);
            }
            ExprKind::Null => {
                self.emit(Op::PushNull, line);
            }
            ExprKind::Ident { name, .. } => match self.locals.get(name.as_str()).copied() {
                Some(slot) => {
                    self.emit(Op::LoadLocal(slot), line);
                }
                None => {
                    self.emit(Op::LoadGlobal(name.clone()), line);
                }
            },
            ExprKind::Binary { op, left, right } => {
                self.lower_binary(*op, left, right, line)?;
            }
            ExprKind::Unary { op, operand } => {
                self.lower_expr(operand)?;
                let float = self.is_float(operand);
                match op {
                    UnOp::Neg => {
                        self.emit(if float { Op::FNeg } else { Op::Neg }, line);
                    }
                    UnOp::Not => {
                        self.emit(Op::Not, line);
                    }
                    UnOp::Sqrt => {
                        self.emit(Op::Sqrt, line);
                    }
                    UnOp::Abs => {
                        self.emit(Op::Abs, line);
                    }
                }
            }
            ExprKind::Call { name, args, .. } => {
                for arg in args {
                    self.lower_expr(arg)?;
                }
                self.emit(
                    Op::Call {
                        name: name.clone(),
                        argc: args.len() as u8,
                    },
                    line,
                );
            }
            ExprKind::Index { array, index } => {
                self.lower_array_index(array, index)?;
                self.emit(Op::ArrayGet, line);
            }
            ExprKind::Member { object, field } => {
                let idx = self.field_index(object, field, expr.pos)?;
                self.lower_expr(object)?;
                self.emit(Op::FieldGet(idx), line);
            }
            ExprKind::AddressOf(operand) => match &operand.kind {
                ExprKind::Ident { name, .. } => match self.locals.get(name.as_str()).copied() {
                    Some(slot) => {
                        self.emit(Op::AddrLocal(slot), line);
                    }
                    None => {
                        self.emit(Op::AddrGlobal(name.clone()), line);
                    }
                },
                _ => {
                    self.lower_expr(operand)?;
                }
            },
            ExprKind::Deref(operand) => {
                self.lower_expr(operand)?;
                self.emit(Op::LoadPtr, line);
            }
            ExprKind::ArrayLit(elements) => {
                for element in elements {
                    self.lower_expr(element)?;
                }
                self.emit(Op::ArrayLit(elements.len() as u32), line);
            }
            ExprKind::StructInit(_) => {
                // Only reachable as a declaration initializer, which is
                // handled in lower_stmt.
                self.emit(Op::PushNull, line);
            }
            ExprKind::Allocate { count, .. } => {
                self.lower_expr(count)?;
                self.emit(Op::Alloc, line);
            }
            ExprKind::Random { min, max } => {
                self.lower_expr(min)?;
                self.lower_expr(max)?;
                self.emit(Op::Random, line);
            }
            ExprKind::Length(array) => {
                self.lower_expr(array)?;
                self.emit(Op::ArrayLen, line);
            }
            ExprKind::HasLine(file) => {
                self.lower_expr(file)?;
                self.emit(
                    Op::Call {
                        name: "__has_line__".to_string(),
                        argc: 1,
                    },
                    line,
                );
            }
            ExprKind::ReadLine { file, target } => {
                self.lower_expr(file)?;
                self.lower_expr(target)?;
                self.emit(
                    Op::Call {
                        name: "__read_line__".to_string(),
                        argc: 2,
                    },
                    line,
                );
            }
            ExprKind::OpenFailed(file) => {
                match file {
                    Some(file) => self.lower_expr(file)?,
                    None => match self.last_file.clone() {
                        Some(name) => {
                            let slot = self.locals.get(name.as_str()).copied();
                            match slot {
                                Some(slot) => {
                                    self.emit(Op::LoadLocal(slot), line);
                                }
                                None => {
                                    self.emit(Op::PushNull, line);
                                }
                            }
                        }
                        None => {
                            self.emit(Op::PushNull, line);
                        }
                    },
                }
                self.emit(Op::PushNull, line);
                self.emit(Op::Eq, line);
            }
            ExprKind::StrContains { haystack, needle } => {
                self.lower_expr(haystack)?;
                self.lower_expr(needle)?;
                self.emit(
                    Op::Call {
                        name: "__strstr__".to_string(),
                        argc: 2,
                    },
                    line,
                );
            }
            ExprKind::Gfx(gfx) => {
                let name = match gfx {
                    GfxExpr::WindowShouldClose => "__window_should_close__",
                    GfxExpr::MouseX => "__mouse_x__",
                    GfxExpr::MouseY => "__mouse_y__",
                    GfxExpr::MousePressed => "__mouse_pressed__",
                };
                self.emit(
                    Op::Call {
                        name: name.to_string(),
                        argc: 0,
                    },
                    line,
                );
            }
        }
        Ok(())
    }

    fn lower_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        line: u32,
    ) -> Result<(), LowerError> {
        // Short-circuit logic.
        match op {
            BinOp::And => {
                self.lower_expr(left)?;
                self.emit(Op::Dup, line);
                let skip = self.emit(Op::JumpIfFalse(0), line);
                self.emit(Op::Pop, line);
                self.lower_expr(right)?;
                let here = self.here();
                self.patch(skip, here);
                return Ok(());
            }
            BinOp::Or => {
                self.lower_expr(left)?;
                self.emit(Op::Dup, line);
                let skip = self.emit(Op::JumpIfTrue(0), line);
                self.emit(Op::Pop, line);
                self.lower_expr(right)?;
                let here = self.here();
                self.patch(skip, here);
                return Ok(());
            }
            _ => {}
        }

        let lf = self.is_float(left);
        let rf = self.is_float(right);
        let float = lf || rf;

        self.lower_expr(left)?;
        if float && !lf {
            self.emit(Op::IntToFloat, line);
        }
        self.lower_expr(right)?;
        if float && !rf {
            self.emit(Op::IntToFloat, line);
        }

        let op = match op {
            BinOp::Add => {
                if float {
                    Op::FAdd
                } else {
                    Op::Add
                }
            }
            BinOp::Sub => {
                if float {
                    Op::FSub
                } else {
                    Op::Sub
                }
            }
            BinOp::Mul => {
                if float {
                    Op::FMul
                } else {
                    Op::Mul
                }
            }
            BinOp::Div => {
                if float {
                    Op::FDiv
                } else {
                    Op::Div
                }
            }
            BinOp::Mod => {
                if float {
                    Op::FMod
                } else {
                    Op::Mod
                }
            }
            BinOp::Pow => Op::Pow,
            BinOp::Eq => Op::Eq,
            BinOp::Ne => Op::Ne,
            BinOp::Lt => Op::Lt,
            BinOp::Le => Op::Le,
            BinOp::Gt => Op::Gt,
            BinOp::Ge => Op::Ge,
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        };
        self.emit(op, line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser;
    use crate::resolve;

    fn lowered(source: &str) -> Program {
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve::resolve(&mut program).unwrap();
        lower(&program, &symbols).unwrap()
    }

    fn lowered_main(body: &str) -> Function {
        let source = format!("to do the main thing:\n{}\nend\n", body);
        let program = lowered(&source);
        program.functions.into_iter().find(|f| f.is_main).unwrap()
    }

    fn ops(func: &Function) -> Vec<Op> {
        func.code.iter().map(|i| i.op.clone()).collect()
    }

    #[test]
    fn test_hello_world_bytecode() {
        let func = lowered_main("say \"Hello, World!\"");
        let ops = ops(&func);
        assert_eq!(
            ops,
            vec![
                Op::PushStr("Hello, World!".into()),
                Op::PrintStr,
                Op::PrintNewline,
                Op::PushInt(0),
                Op::ReturnValue,
            ]
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let func = lowered_main("there is a number called x which is 2 plus 3 times 4\nsay x");
        let ops = ops(&func);
        // 2, 3, 4, MUL, ADD
        assert_eq!(&ops[..5], &[
            Op::PushInt(2),
            Op::PushInt(3),
            Op::PushInt(4),
            Op::Mul,
            Op::Add,
        ]);
        assert!(ops.contains(&Op::PrintInt));
    }

    #[test]
    fn test_float_coercion() {
        let func = lowered_main("there is a decimal called d which is 1.5 plus 2");
        let ops = ops(&func);
        assert_eq!(&ops[..4], &[
            Op::PushFloat(1.5),
            Op::PushInt(2),
            Op::IntToFloat,
            Op::FAdd,
        ]);
    }

    #[test]
    fn test_decimal_print_op() {
        let func = lowered_main("there is a decimal called d which is 2.5\nsay d");
        assert!(ops(&func).contains(&Op::PrintFloat));
    }

    #[test]
    fn test_if_jumps_are_patched() {
        let func = lowered_main("if 1 equals 2 then\nsay 1\notherwise\nsay 2\nend");
        for (i, instr) in func.code.iter().enumerate() {
            match instr.op {
                Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) => {
                    assert!(t <= func.code.len(), "unpatched jump at {}", i);
                    assert!(t != 0 || i == 0, "jump at {} still targets 0", i);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_while_loop_shape() {
        let func = lowered_main(
            "there is a number called x which is 0\nwhile x is less than 3:\nincrease x\nend",
        );
        let ops = ops(&func);
        // The back-edge jumps to the condition start.
        let back = ops
            .iter()
            .filter_map(|op| match op {
                Op::Jump(t) => Some(*t),
                _ => None,
            })
            .next()
            .expect("while loop emits a back edge");
        assert!(matches!(ops[back], Op::LoadLocal(_)));
    }

    #[test]
    fn test_for_continue_targets_increment() {
        let func = lowered_main("for each number i from 1 to 3:\nskip to the next one\nend");
        // The continue jump must land on the increment (LoadLocal of the
        // induction variable), not back on the condition.
        let continue_target = func
            .code
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr.op {
                Op::Jump(t) if t > i => Some(t),
                _ => None,
            })
            .next()
            .expect("continue emits a forward jump");
        assert!(matches!(func.code[continue_target].op, Op::LoadLocal(_)));
        let after = &func.code[continue_target..continue_target + 4];
        assert!(matches!(after[1].op, Op::PushInt(1)));
        assert!(matches!(after[2].op, Op::Add));
    }

    #[test]
    fn test_break_outside_loop() {
        let source = "to do the main thing:\nstop the loop\nend\n";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve::resolve(&mut program).unwrap();
        assert!(matches!(
            lower(&program, &symbols),
            Err(LowerError::BreakOutsideLoop { .. })
        ));
    }

    #[test]
    fn test_raw_c_is_rejected() {
        let source = "to do the main thing:\nprintf(\"x\");\nend\n";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve::resolve(&mut program).unwrap();
        assert!(matches!(
            lower(&program, &symbols),
            Err(LowerError::RawCUnsupported { .. })
        ));
    }

    #[test]
    fn test_call_and_return() {
        let source = "\
to double it with a number called n and return a number:
    return n times 2
end

to do the main thing:
    say the result of double it with 21
end
";
        let program = lowered(source);
        let double = program.function("double_it").unwrap();
        assert_eq!(double.params, vec!["n".to_string()]);
        assert!(ops(double).contains(&Op::ReturnValue));

        let main = program.function("main").unwrap();
        assert!(ops(main).contains(&Op::Call {
            name: "double_it".into(),
            argc: 1
        }));
    }

    #[test]
    fn test_struct_field_by_index() {
        let source = "\
define a Person as having:
    text called name
    number called age
end

to do the main thing:
    there is a Person called bob
    set bob's age to 30
    say bob's age
end
";
        let program = lowered(source);
        assert_eq!(program.structs[0].fields, vec!["name", "age"]);
        let main = program.function("main").unwrap();
        let ops = ops(main);
        assert!(ops.contains(&Op::NewStruct(2)));
        assert!(ops.contains(&Op::FieldSet(1)));
        assert!(ops.contains(&Op::FieldGet(1)));
    }

    #[test]
    fn test_short_circuit_and() {
        let func = lowered_main("if 1 equals 1 and 2 equals 2 then\nsay 1\nend");
        let ops = ops(&func);
        assert!(ops.contains(&Op::Dup));
        assert!(ops.iter().any(|op| matches!(op, Op::JumpIfFalse(_))));
    }

    #[test]
    fn test_array_ops() {
        let func = lowered_main(
            "there is a list of numbers called xs containing 1, 2, 3\nsay item number 0 in xs\nsay the length of xs",
        );
        let ops = ops(&func);
        assert!(ops.contains(&Op::ArrayLit(3)));
        assert!(ops.contains(&Op::ArrayGet));
        assert!(ops.contains(&Op::ArrayLen));
    }

    #[test]
    fn test_main_implicit_exit_code() {
        let func = lowered_main("say 1");
        let ops = ops(&func);
        assert_eq!(&ops[ops.len() - 2..], &[Op::PushInt(0), Op::ReturnValue]);
    }
}
