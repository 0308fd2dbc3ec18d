//! C lowering for Zinc
//!
//! Serializes the resolved AST into a single C translation unit. The
//! output starts with a fixed prelude (standard headers, the `yes`/`no`/
//! `null` macros and the `zn_read_line` helper), then struct typedefs in
//! source order, forward declarations for every Zinc function, the
//! function definitions, and `main` last.
//!
//! Passthrough names and raw-C statements are emitted verbatim; only the
//! downstream C compiler can reject them.

use crate::ast::*;
use crate::error::LowerError;
use crate::resolve::Symbols;
use std::collections::HashMap;

/// Approximate C type of an expression, used to pick printf specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CType {
    Int,
    Double,
    CharPtr,
    Char,
}

pub struct Transpiler<'a> {
    symbols: &'a Symbols,
    indent: usize,
    lines: Vec<String>,
    /// Declared variable types, innermost scope last
    var_types: Vec<HashMap<String, TypeSpec>>,
    /// Known fixed-array sizes for `the length of` and `last item in`
    array_sizes: HashMap<String, usize>,
    /// Most recently declared file variable (for bare `failed to open`)
    last_file: Option<String>,
    loop_depth: usize,
    counter: usize,
}

/// Lower a resolved program to a C translation unit.
pub fn transpile(program: &Program, symbols: &Symbols) -> Result<String, LowerError> {
    Transpiler::new(symbols).run(program)
}

impl<'a> Transpiler<'a> {
    pub fn new(symbols: &'a Symbols) -> Self {
        Self {
            symbols,
            indent: 0,
            lines: Vec::new(),
            var_types: Vec::new(),
            array_sizes: HashMap::new(),
            last_file: None,
            loop_depth: 0,
            counter: 0,
        }
    }

    fn emit(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.lines.push(format!("{}{}", "    ".repeat(self.indent), line));
    }

    fn emit_raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn run(mut self, program: &Program) -> Result<String, LowerError> {
        self.emit_prelude(program);

        for def in &program.structs {
            self.emit_struct(def);
        }

        for func in &program.functions {
            if !func.is_main {
                self.emit_raw(format!("{};", self.signature(func)));
            }
        }
        if program.functions.iter().any(|f| !f.is_main) {
            self.emit_raw("");
        }

        for func in program.functions.iter().filter(|f| !f.is_main) {
            self.emit_function(func)?;
            self.emit_raw("");
        }
        for func in program.functions.iter().filter(|f| f.is_main) {
            self.emit_function(func)?;
            self.emit_raw("");
        }

        Ok(self.lines.join("\n"))
    }

    fn emit_prelude(&mut self, program: &Program) {
        self.emit_raw("#include <stdio.h>");
        self.emit_raw("#include <stdlib.h>");
        self.emit_raw("#include <string.h>");
        self.emit_raw("#include <math.h>");

        // Directive-mapped includes not already covered by the prelude.
        let mut extra: Vec<String> = Vec::new();
        for include in &program.includes {
            match &include.library {
                Library::Graphics => extra.push("#include \"raylib.h\"".to_string()),
                Library::User(name) => extra.push(format!("#include \"{}.h\"", name)),
                Library::Io | Library::Math | Library::Strings | Library::Files
                | Library::Random => {}
            }
        }
        if program_uses_random(program) {
            extra.push("#include <time.h>".to_string());
        }
        extra.dedup();
        for line in extra {
            self.emit_raw(line);
        }

        self.emit_raw("");
        self.emit_raw("#define yes 1");
        self.emit_raw("#define no 0");
        self.emit_raw("#define null NULL");
        self.emit_raw("");
        self.emit_raw("static char *zn_read_line(void) {");
        self.emit_raw("    char buf[256];");
        self.emit_raw("    if (!fgets(buf, sizeof buf, stdin)) {");
        self.emit_raw("        return NULL;");
        self.emit_raw("    }");
        self.emit_raw("    buf[strcspn(buf, \"\\n\")] = '\\0';");
        self.emit_raw("    char *line = malloc(strlen(buf) + 1);");
        self.emit_raw("    if (line != NULL) {");
        self.emit_raw("        strcpy(line, buf);");
        self.emit_raw("    }");
        self.emit_raw("    return line;");
        self.emit_raw("}");
        self.emit_raw("");
    }

    fn emit_struct(&mut self, def: &StructDef) {
        self.emit_raw("typedef struct {");
        for field in &def.fields {
            self.emit_raw(format!("    {};", self.declarator(&field.ty, &field.name)));
        }
        self.emit_raw(format!("}} {};", def.name));
        self.emit_raw("");
    }

    fn signature(&self, func: &FnDef) -> String {
        let ret = func
            .return_type
            .as_ref()
            .map(|ty| self.type_to_c(ty))
            .unwrap_or_else(|| "void".to_string());
        let params = if func.params.is_empty() {
            "void".to_string()
        } else {
            func.params
                .iter()
                .map(|p| self.declarator(&p.ty, &p.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} {}({})", ret, func.name, params)
    }

    fn emit_function(&mut self, func: &FnDef) -> Result<(), LowerError> {
        self.var_types = vec![HashMap::new()];
        self.array_sizes.clear();
        self.last_file = None;
        self.counter = 0;

        for param in &func.params {
            self.record_var(&param.name, param.ty.clone());
        }

        if func.is_main {
            self.emit_raw("int main(void) {");
        } else {
            self.emit_raw(format!("{} {{", self.signature(func)));
        }

        self.indent += 1;
        for stmt in &func.body {
            self.emit_stmt(stmt)?;
        }
        if func.is_main
            && !matches!(func.body.last().map(|s| &s.kind), Some(StmtKind::Return { .. }))
        {
            self.emit("return 0;");
        }
        self.indent -= 1;
        self.emit_raw("}");
        Ok(())
    }

    // ============ Variable typing ============

    fn record_var(&mut self, name: &str, ty: TypeSpec) {
        self.var_types
            .last_mut()
            .expect("type scope stack is never empty")
            .insert(name.to_string(), ty);
    }

    fn var_type(&self, name: &str) -> Option<&TypeSpec> {
        self.var_types.iter().rev().find_map(|scope| scope.get(name))
    }

    fn push_scope(&mut self) {
        self.var_types.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.var_types.pop();
    }

    /// The declared Zinc type of an expression, where one can be known.
    fn type_of(&self, expr: &Expr) -> Option<TypeSpec> {
        match &expr.kind {
            ExprKind::Ident { name, .. } => self.var_type(name).cloned(),
            ExprKind::Member { object, field } => {
                let obj_ty = self.type_of(object)?;
                if let BaseType::Struct(struct_name) = &obj_ty.base {
                    let def = self.symbols.struct_def(struct_name)?;
                    def.fields
                        .iter()
                        .find(|f| &f.name == field)
                        .map(|f| f.ty.clone())
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
            ExprKind::Allocate { ty, .. } => {
                let mut ty = ty.clone();
                ty.is_pointer = true;
                Some(ty)
            }
            _ => None,
        }
    }

    /// printf-oriented view of an expression's type.
    fn ctype(&self, expr: &Expr) -> CType {
        match &expr.kind {
            ExprKind::Str(_) => CType::CharPtr,
            ExprKind::Float(_) => CType::Double,
            ExprKind::CharLit(_) => CType::Char,
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Null => CType::Int,
            ExprKind::Binary { op, left, right } => match op {
                BinOp::Pow => CType::Double,
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                    if self.ctype(left) == CType::Double || self.ctype(right) == CType::Double {
                        CType::Double
                    } else {
                        CType::Int
                    }
                }
                _ => CType::Int,
            },
            ExprKind::Unary { op, operand } => match op {
                UnOp::Sqrt => CType::Double,
                UnOp::Neg | UnOp::Abs => self.ctype(operand),
                UnOp::Not => CType::Int,
            },
            ExprKind::Length(_) | ExprKind::Random { .. } | ExprKind::Gfx(_) => CType::Int,
            _ => match self.type_of(expr) {
                Some(ty) if !ty.is_pointer && !ty.is_array => match ty.base {
                    BaseType::Decimal => CType::Double,
                    BaseType::Text => CType::CharPtr,
                    BaseType::Letter => CType::Char,
                    _ => CType::Int,
                },
                _ => CType::Int,
            },
        }
    }

    // ============ Types ============

    fn base_c(&self, base: &BaseType) -> String {
        match base {
            BaseType::Number => "int".to_string(),
            BaseType::Decimal => "double".to_string(),
            BaseType::Text => "char*".to_string(),
            BaseType::Letter => "char".to_string(),
            BaseType::Boolean => "int".to_string(),
            BaseType::Nothing => "void".to_string(),
            BaseType::File => "FILE*".to_string(),
            BaseType::Struct(name) => name.clone(),
        }
    }

    fn type_to_c(&self, ty: &TypeSpec) -> String {
        let mut out = self.base_c(&ty.base);
        if ty.is_pointer {
            out.push('*');
        }
        out
    }

    /// `int *p`, `char *s`, `double d` -- pointer stars attach to the
    /// name.
    fn declarator(&self, ty: &TypeSpec, name: &str) -> String {
        let c_type = self.type_to_c(ty);
        let stars = c_type.chars().rev().take_while(|&c| c == '*').count();
        let base = &c_type[..c_type.len() - stars];
        if stars == 0 {
            format!("{} {}", base, name)
        } else {
            format!("{} {}{}", base, "*".repeat(stars), name)
        }
    }

    // ============ Statements ============

    fn emit_block(&mut self, body: &[Stmt]) -> Result<(), LowerError> {
        self.push_scope();
        self.indent += 1;
        for stmt in body {
            self.emit_stmt(stmt)?;
        }
        self.indent -= 1;
        self.pop_scope();
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::VarDecl { name, ty, init } => self.emit_var_decl(name, ty, init),
            StmtKind::FileDecl { name, path, mode } => {
                self.record_var(name, TypeSpec::base(BaseType::File));
                self.last_file = Some(name.clone());
                match path {
                    Some(path) => {
                        let mode = match mode {
                            FileMode::Read => "\"r\"",
                            FileMode::Write => "\"w\"",
                        };
                        let path = self.expr_to_c(path);
                        self.emit(format!("FILE *{} = fopen({}, {});", name, path, mode));
                    }
                    None => self.emit(format!("FILE *{} = NULL;", name)),
                }
                Ok(())
            }
            StmtKind::Assign { target, value } => {
                let target = self.expr_to_c(target);
                let value = self.expr_to_c(value);
                self.emit(format!("{} = {};", target, value));
                Ok(())
            }
            StmtKind::Compound { op, target, value } => {
                let target = self.expr_to_c(target);
                let value = self.expr_to_c(value);
                self.emit(format!("{} {}= ({});", target, op.c_symbol(), value));
                Ok(())
            }
            StmtKind::If {
                condition,
                then_body,
                else_ifs,
                else_body,
            } => {
                let cond = self.expr_to_c(condition);
                self.emit(format!("if ({}) {{", cond));
                self.emit_block(then_body)?;
                for (cond, body) in else_ifs {
                    let cond = self.expr_to_c(cond);
                    self.emit(format!("}} else if ({}) {{", cond));
                    self.emit_block(body)?;
                }
                if !else_body.is_empty() {
                    self.emit("} else {");
                    self.emit_block(else_body)?;
                }
                self.emit("}");
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let cond = self.expr_to_c(condition);
                self.emit(format!("while ({}) {{", cond));
                self.loop_depth += 1;
                self.emit_block(body)?;
                self.loop_depth -= 1;
                self.emit("}");
                Ok(())
            }
            StmtKind::For {
                var,
                start,
                end,
                descending,
                body,
            } => {
                let start = self.expr_to_c(start);
                let end = self.expr_to_c(end);
                if *descending {
                    self.emit(format!(
                        "for (int {var} = ({start}); {var} >= ({end}); {var}--) {{"
                    ));
                } else {
                    self.emit(format!(
                        "for (int {var} = ({start}); {var} <= ({end}); {var}++) {{"
                    ));
                }
                self.push_scope();
                self.record_var(var, TypeSpec::number());
                self.loop_depth += 1;
                self.indent += 1;
                for stmt in body {
                    self.emit_stmt(stmt)?;
                }
                self.indent -= 1;
                self.loop_depth -= 1;
                self.pop_scope();
                self.emit("}");
                Ok(())
            }
            StmtKind::ForEach {
                var,
                ty,
                iterable,
                body,
            } => {
                let counter = self.fresh("_i");
                let iter = self.expr_to_c(iterable);
                let elem_ty = ty
                    .clone()
                    .or_else(|| self.type_of(iterable).map(|mut t| {
                        t.is_array = false;
                        t.array_size = None;
                        t
                    }))
                    .unwrap_or_else(TypeSpec::number);

                let limit = match &iterable.kind {
                    ExprKind::Ident { name, .. } => self.array_sizes.get(name).copied(),
                    _ => None,
                };
                match limit {
                    Some(size) => self.emit(format!(
                        "for (int {counter} = 0; {counter} < {size}; {counter}++) {{"
                    )),
                    None => self.emit(format!(
                        "for (int {counter} = 0; {counter} < (int)(sizeof({iter})/sizeof({iter}[0])); {counter}++) {{"
                    )),
                }

                self.push_scope();
                self.record_var(var, elem_ty.clone());
                self.loop_depth += 1;
                self.indent += 1;
                self.emit(format!(
                    "{} = {}[{}];",
                    self.declarator(&elem_ty, var),
                    iter,
                    counter
                ));
                for stmt in body {
                    self.emit_stmt(stmt)?;
                }
                self.indent -= 1;
                self.loop_depth -= 1;
                self.pop_scope();
                self.emit("}");
                Ok(())
            }
            StmtKind::Repeat { count, body } => {
                let counter = self.fresh("_rep");
                let count = self.expr_to_c(count);
                self.emit(format!(
                    "for (int {counter} = 0; {counter} < ({count}); {counter}++) {{"
                ));
                self.loop_depth += 1;
                self.emit_block(body)?;
                self.loop_depth -= 1;
                self.emit("}");
                Ok(())
            }
            StmtKind::Return { value } => {
                match value {
                    Some(value) => {
                        let value = self.expr_to_c(value);
                        self.emit(format!("return {};", value));
                    }
                    None => self.emit("return;"),
                }
                Ok(())
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(LowerError::BreakOutsideLoop { pos: stmt.pos });
                }
                self.emit("break;");
                Ok(())
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(LowerError::ContinueOutsideLoop { pos: stmt.pos });
                }
                self.emit("continue;");
                Ok(())
            }
            StmtKind::Print { parts } => {
                self.emit_print(parts);
                Ok(())
            }
            StmtKind::Input { target, ty } => {
                let target_c = self.expr_to_c(target);
                match ty {
                    InputType::Number => self.emit(format!("scanf(\"%d\", &{});", target_c)),
                    InputType::Decimal => self.emit(format!("scanf(\"%lf\", &{});", target_c)),
                    InputType::Letter => self.emit(format!("scanf(\" %c\", &{});", target_c)),
                    InputType::Text => self.emit(format!("{} = zn_read_line();", target_c)),
                }
                Ok(())
            }
            StmtKind::Free { pointer } => {
                let pointer = self.expr_to_c(pointer);
                self.emit(format!("free({});", pointer));
                Ok(())
            }
            StmtKind::CloseFile { file } => {
                let file = self.expr_to_c(file);
                self.emit(format!("fclose({});", file));
                Ok(())
            }
            StmtKind::Graphics(gfx) => {
                self.emit_graphics(gfx);
                Ok(())
            }
            StmtKind::RawC(text) => {
                self.emit(text.clone());
                Ok(())
            }
            StmtKind::Expr(expr) => {
                let expr = self.expr_to_c(expr);
                self.emit(format!("{};", expr));
                Ok(())
            }
        }
    }

    fn emit_var_decl(
        &mut self,
        name: &str,
        ty: &Option<TypeSpec>,
        init: &Option<Expr>,
    ) -> Result<(), LowerError> {
        let ty = ty.clone().unwrap_or_else(TypeSpec::number);
        self.record_var(name, ty.clone());

        if ty.is_array {
            let mut elem = ty.clone();
            elem.is_array = false;
            match init {
                Some(Expr { kind: ExprKind::ArrayLit(elements), .. }) => {
                    let values = elements
                        .iter()
                        .map(|e| self.expr_to_c(e))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.array_sizes.insert(name.to_string(), elements.len());
                    self.emit(format!(
                        "{}[{}] = {{{}}};",
                        self.declarator(&elem, name),
                        elements.len(),
                        values
                    ));
                }
                _ => match ty.array_size {
                    Some(size) => {
                        self.array_sizes.insert(name.to_string(), size);
                        self.emit(format!("{}[{}];", self.declarator(&elem, name), size));
                    }
                    None => {
                        let mut ptr = elem.clone();
                        ptr.is_pointer = true;
                        self.emit(format!("{} = NULL;", self.declarator(&ptr, name)));
                    }
                },
            }
            return Ok(());
        }

        match init {
            Some(Expr { kind: ExprKind::StructInit(fields), .. }) => {
                // Conservative lowering: zeroed declaration plus one
                // assignment per field.
                self.emit(format!("{} = {{0}};", self.declarator(&ty, name)));
                for (field, value) in fields {
                    let value = self.expr_to_c(value);
                    self.emit(format!("{}.{} = {};", name, field, value));
                }
            }
            Some(init) => {
                let value = self.expr_to_c(init);
                self.emit(format!("{} = {};", self.declarator(&ty, name), value));
            }
            None => {
                let default = if ty.is_pointer || ty.base == BaseType::Text {
                    "NULL"
                } else if matches!(ty.base, BaseType::Struct(_)) {
                    "{0}"
                } else {
                    "0"
                };
                self.emit(format!("{} = {};", self.declarator(&ty, name), default));
            }
        }
        Ok(())
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let id = self.counter;
        self.counter += 1;
        format!("{}{}", prefix, id)
    }

    /// `say A and then B` -> one printf with format specifiers chosen
    /// per operand type; string literals are spliced into the format.
    fn emit_print(&mut self, parts: &[Expr]) {
        let mut format = String::new();
        let mut args = Vec::new();

        for part in parts {
            match &part.kind {
                ExprKind::Str(value) => format.push_str(&escape_format(value)),
                _ => {
                    let spec = match self.ctype(part) {
                        CType::Int => "%d",
                        CType::Double => "%f",
                        CType::CharPtr => "%s",
                        CType::Char => "%c",
                    };
                    format.push_str(spec);
                    args.push(self.expr_to_c(part));
                }
            }
        }

        format.push_str("\\n");
        if args.is_empty() {
            self.emit(format!("printf(\"{}\");", format));
        } else {
            self.emit(format!("printf(\"{}\", {});", format, args.join(", ")));
        }
    }

    fn emit_graphics(&mut self, gfx: &GfxStmt) {
        match gfx {
            GfxStmt::OpenWindow {
                width,
                height,
                title,
            } => {
                let width = self.expr_to_c(width);
                let height = self.expr_to_c(height);
                let title = title
                    .as_ref()
                    .map(|t| self.expr_to_c(t))
                    .unwrap_or_else(|| "\"Zinc App\"".to_string());
                self.emit(format!("InitWindow({}, {}, {});", width, height, title));
                self.emit("SetTargetFPS(60);");
            }
            GfxStmt::CloseWindow => self.emit("CloseWindow();"),
            GfxStmt::BeginDrawing => self.emit("BeginDrawing();"),
            GfxStmt::EndDrawing => self.emit("EndDrawing();"),
            GfxStmt::ClearScreen { color } => self.emit(format!("ClearBackground({});", color)),
            GfxStmt::DrawRectangle {
                x,
                y,
                width,
                height,
                color,
            } => {
                let x = self.expr_to_c(x);
                let y = self.expr_to_c(y);
                let width = self.expr_to_c(width);
                let height = self.expr_to_c(height);
                self.emit(format!(
                    "DrawRectangle({}, {}, {}, {}, {});",
                    x, y, width, height, color
                ));
            }
            GfxStmt::DrawText {
                text,
                x,
                y,
                size,
                color,
            } => {
                let text = self.expr_to_c(text);
                let x = self.expr_to_c(x);
                let y = self.expr_to_c(y);
                let size = self.expr_to_c(size);
                self.emit(format!(
                    "DrawText({}, {}, {}, {}, {});",
                    text, x, y, size, color
                ));
            }
        }
    }

    // ============ Expressions ============

    fn expr_to_c(&self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Int(value) => value.to_string(),
            ExprKind::Float(value) => format!("{:?}", value),
            ExprKind::Str(value) => format!("\"{}\"", escape_c(value)),
            ExprKind::CharLit(value) => format!("'{}'", escape_char(*value)),
            ExprKind::Bool(value) => if *value { "1" } else { "0" }.to_string(),
            ExprKind::Null => "NULL".to_string(),
            ExprKind::Ident { name, .. } => name.clone(),
            ExprKind::Binary { op, left, right } => {
                let left = self.expr_to_c(left);
                let right = self.expr_to_c(right);
                match op {
                    BinOp::Pow => format!("pow({}, {})", left, right),
                    _ => format!("({} {} {})", left, op.c_symbol(), right),
                }
            }
            ExprKind::Unary { op, operand } => {
                let inner = self.expr_to_c(operand);
                match op {
                    UnOp::Neg => format!("(-{})", inner),
                    UnOp::Not => format!("(!{})", inner),
                    UnOp::Sqrt => format!("sqrt({})", inner),
                    UnOp::Abs => {
                        if self.ctype(operand) == CType::Double {
                            format!("fabs({})", inner)
                        } else {
                            format!("abs({})", inner)
                        }
                    }
                }
            }
            ExprKind::Call { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.expr_to_c(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", name, args)
            }
            ExprKind::Index { array, index } => {
                let array_c = self.expr_to_c(array);
                if let ExprKind::Int(-1) = index.kind {
                    // `the last item in`
                    if let ExprKind::Ident { name, .. } = &array.kind {
                        if let Some(size) = self.array_sizes.get(name) {
                            return format!("{}[{}]", array_c, size - 1);
                        }
                    }
                    return format!(
                        "{}[sizeof({})/sizeof({}[0]) - 1]",
                        array_c, array_c, array_c
                    );
                }
                format!("{}[{}]", array_c, self.expr_to_c(index))
            }
            ExprKind::Member { object, field } => {
                let object_c = self.expr_to_c(object);
                let pointer = self
                    .type_of(object)
                    .map(|ty| ty.is_pointer)
                    .unwrap_or(false);
                if pointer {
                    format!("{}->{}", object_c, field)
                } else {
                    format!("{}.{}", object_c, field)
                }
            }
            ExprKind::AddressOf(operand) => format!("&{}", self.expr_to_c(operand)),
            ExprKind::Deref(operand) => format!("(*{})", self.expr_to_c(operand)),
            ExprKind::ArrayLit(elements) => {
                let values = elements
                    .iter()
                    .map(|e| self.expr_to_c(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{}}}", values)
            }
            ExprKind::StructInit(_) => "{0}".to_string(),
            ExprKind::Allocate { count, ty } => {
                let mut elem = ty.clone();
                elem.is_array = false;
                format!(
                    "malloc(sizeof({}) * ({}))",
                    self.type_to_c(&elem),
                    self.expr_to_c(count)
                )
            }
            ExprKind::Random { min, max } => {
                let min = self.expr_to_c(min);
                let max = self.expr_to_c(max);
                format!("(rand() % (({}) - ({}) + 1) + ({}))", max, min, min)
            }
            ExprKind::Length(array) => {
                if let ExprKind::Ident { name, .. } = &array.kind {
                    if let Some(size) = self.array_sizes.get(name) {
                        return size.to_string();
                    }
                }
                let array = self.expr_to_c(array);
                format!("(sizeof({})/sizeof({}[0]))", array, array)
            }
            ExprKind::HasLine(file) => format!("!feof({})", self.expr_to_c(file)),
            ExprKind::ReadLine { file, target } => format!(
                "fgets({}, 256, {})",
                self.expr_to_c(target),
                self.expr_to_c(file)
            ),
            ExprKind::OpenFailed(file) => {
                let name = match file {
                    Some(file) => self.expr_to_c(file),
                    None => self
                        .last_file
                        .clone()
                        .unwrap_or_else(|| "NULL".to_string()),
                };
                format!("({} == NULL)", name)
            }
            ExprKind::StrContains { haystack, needle } => format!(
                "(strstr({}, {}) != NULL)",
                self.expr_to_c(haystack),
                self.expr_to_c(needle)
            ),
            ExprKind::Gfx(gfx) => match gfx {
                GfxExpr::WindowShouldClose => "WindowShouldClose()".to_string(),
                GfxExpr::MouseX => "GetMouseX()".to_string(),
                GfxExpr::MouseY => "GetMouseY()".to_string(),
                GfxExpr::MousePressed => {
                    "IsMouseButtonPressed(MOUSE_LEFT_BUTTON)".to_string()
                }
            },
        }
    }
}

/// Escape a string for a C string literal.
fn escape_c(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a string literal for splicing into a printf format: like
/// `escape_c`, plus `%` doubling.
fn escape_format(value: &str) -> String {
    escape_c(value).replace('%', "%%")
}

fn escape_char(value: char) -> String {
    match value {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\'' => "\\'".to_string(),
        '\\' => "\\\\".to_string(),
        '\0' => "\\0".to_string(),
        _ => value.to_string(),
    }
}

fn program_uses_random(program: &Program) -> bool {
    program
        .functions
        .iter()
        .any(|func| func.body.iter().any(stmt_uses_random))
}

fn stmt_uses_random(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::VarDecl { init, .. } => init.as_ref().map_or(false, expr_uses_random),
        StmtKind::FileDecl { path, .. } => path.as_ref().map_or(false, expr_uses_random),
        StmtKind::Assign { target, value } | StmtKind::Compound { target, value, .. } => {
            expr_uses_random(target) || expr_uses_random(value)
        }
        StmtKind::If {
            condition,
            then_body,
            else_ifs,
            else_body,
        } => {
            expr_uses_random(condition)
                || then_body.iter().any(stmt_uses_random)
                || else_ifs
                    .iter()
                    .any(|(c, b)| expr_uses_random(c) || b.iter().any(stmt_uses_random))
                || else_body.iter().any(stmt_uses_random)
        }
        StmtKind::While { condition, body } => {
            expr_uses_random(condition) || body.iter().any(stmt_uses_random)
        }
        StmtKind::For { start, end, body, .. } => {
            expr_uses_random(start) || expr_uses_random(end) || body.iter().any(stmt_uses_random)
        }
        StmtKind::ForEach { iterable, body, .. } => {
            expr_uses_random(iterable) || body.iter().any(stmt_uses_random)
        }
        StmtKind::Repeat { count, body } => {
            expr_uses_random(count) || body.iter().any(stmt_uses_random)
        }
        StmtKind::Return { value } => value.as_ref().map_or(false, expr_uses_random),
        StmtKind::Print { parts } => parts.iter().any(expr_uses_random),
        StmtKind::Input { target, .. } => expr_uses_random(target),
        StmtKind::Free { pointer } => expr_uses_random(pointer),
        StmtKind::CloseFile { file } => expr_uses_random(file),
        StmtKind::Graphics(_) | StmtKind::RawC(_) | StmtKind::Break | StmtKind::Continue => false,
        StmtKind::Expr(expr) => expr_uses_random(expr),
    }
}

fn expr_uses_random(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Random { .. } => true,
        ExprKind::Binary { left, right, .. } => expr_uses_random(left) || expr_uses_random(right),
        ExprKind::Unary { operand, .. } => expr_uses_random(operand),
        ExprKind::Call { args, .. } => args.iter().any(expr_uses_random),
        ExprKind::Index { array, index } => expr_uses_random(array) || expr_uses_random(index),
        ExprKind::Member { object, .. } => expr_uses_random(object),
        ExprKind::AddressOf(inner)
        | ExprKind::Deref(inner)
        | ExprKind::Length(inner)
        | ExprKind::HasLine(inner) => expr_uses_random(inner),
        ExprKind::ArrayLit(elements) => elements.iter().any(expr_uses_random),
        ExprKind::StructInit(fields) => fields.iter().any(|(_, v)| expr_uses_random(v)),
        ExprKind::Allocate { count, .. } => expr_uses_random(count),
        ExprKind::ReadLine { file, target } => expr_uses_random(file) || expr_uses_random(target),
        ExprKind::OpenFailed(file) => file.as_ref().map_or(false, |f| expr_uses_random(f)),
        ExprKind::StrContains { haystack, needle } => {
            expr_uses_random(haystack) || expr_uses_random(needle)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser;
    use crate::resolve;

    fn emit(source: &str) -> String {
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve::resolve(&mut program).unwrap();
        transpile(&program, &symbols).unwrap()
    }

    fn emit_main(body: &str) -> String {
        emit(&format!("to do the main thing:\n{}\nend\n", body))
    }

    #[test]
    fn test_hello_world() {
        let c = emit_main("say \"Hello, World!\"");
        assert!(c.contains("printf(\"Hello, World!\\n\");"), "{c}");
        assert!(c.contains("int main(void) {"), "{c}");
        assert!(c.contains("return 0;"), "{c}");
    }

    #[test]
    fn test_exactly_one_main() {
        let c = emit_main("say 1");
        assert_eq!(c.matches("int main(void)").count(), 1, "{c}");
    }

    #[test]
    fn test_prelude() {
        let c = emit_main("say 1");
        for needle in [
            "#include <stdio.h>",
            "#include <stdlib.h>",
            "#include <string.h>",
            "#include <math.h>",
            "#define yes 1",
            "#define no 0",
            "#define null NULL",
            "static char *zn_read_line(void)",
        ] {
            assert!(c.contains(needle), "missing {needle} in:\n{c}");
        }
    }

    #[test]
    fn test_precedence_in_decl() {
        let c = emit_main("there is a number called x which is 2 plus 3 times 4\nsay x");
        assert!(c.contains("int x = (2 + (3 * 4));"), "{c}");
        assert!(c.contains("printf(\"%d\\n\", x);"), "{c}");
    }

    #[test]
    fn test_for_range() {
        let c = emit_main("for each number i from 1 to 5:\nsay i\nend");
        assert!(c.contains("for (int i = (1); i <= (5); i++) {"), "{c}");
    }

    #[test]
    fn test_for_range_descending() {
        let c = emit_main("for each number i from 5 down to 1:\nsay i\nend");
        assert!(c.contains("for (int i = (5); i >= (1); i--) {"), "{c}");
    }

    #[test]
    fn test_repeat_unique_counters() {
        let c = emit_main("repeat 2 times:\nsay 1\nend\nrepeat 3 times:\nsay 2\nend");
        assert!(c.contains("for (int _rep0 = 0; _rep0 < (2); _rep0++) {"), "{c}");
        assert!(c.contains("for (int _rep1 = 0; _rep1 < (3); _rep1++) {"), "{c}");
    }

    #[test]
    fn test_struct_member_value_vs_pointer() {
        let source = "\
define a Person as having:
    number called age
end

to update with a pointer to Person called p:
    set p's age to 31
end

to do the main thing:
    there is a Person called bob
    set bob's age to 30
end
";
        let c = emit(source);
        assert!(c.contains("bob.age = 30;"), "{c}");
        assert!(c.contains("p->age = 31;"), "{c}");
    }

    #[test]
    fn test_struct_init_field_assignments() {
        let source = "\
define a Person as having:
    text called name
    number called age
end

to do the main thing:
    there is a Person called alice which has name \"Alice\" and age 25
    say alice's age
end
";
        let c = emit(source);
        assert!(c.contains("Person alice = {0};"), "{c}");
        assert!(c.contains("alice.name = \"Alice\";"), "{c}");
        assert!(c.contains("alice.age = 25;"), "{c}");
    }

    #[test]
    fn test_input_lowerings() {
        let c = emit_main(
            "there is a number called x\nthere is a text called s\nask the user for a number and store it in x\nask the user for text and store it in s",
        );
        assert!(c.contains("scanf(\"%d\", &x);"), "{c}");
        assert!(c.contains("s = zn_read_line();"), "{c}");
    }

    #[test]
    fn test_raw_c_verbatim() {
        let c = emit_main("printf(\"raw %d\\n\", 42);");
        assert!(c.contains("printf(\"raw %d\\n\", 42);"), "{c}");
    }

    #[test]
    fn test_allocate_and_free() {
        let c = emit_main(
            "allocate space for 10 numbers and call it p\nfree the memory at p",
        );
        assert!(c.contains("int *p = malloc(sizeof(int) * (10));"), "{c}");
        assert!(c.contains("free(p);"), "{c}");
    }

    #[test]
    fn test_print_mixed_parts() {
        let c = emit_main(
            "there is a number called x which is 7\nsay \"x is \" and then x",
        );
        assert!(c.contains("printf(\"x is %d\\n\", x);"), "{c}");
    }

    #[test]
    fn test_print_escapes_percent() {
        let c = emit_main("say \"100% done\"");
        assert!(c.contains("printf(\"100%% done\\n\");"), "{c}");
    }

    #[test]
    fn test_decimal_print_specifier() {
        let c = emit_main("there is a decimal called d which is 2.5\nsay d");
        assert!(c.contains("double d = 2.5;"), "{c}");
        assert!(c.contains("printf(\"%f\\n\", d);"), "{c}");
    }

    #[test]
    fn test_forward_declarations() {
        let source = "\
to add both with a number called a and a number called b and return a number:
    return a plus b
end

to do the main thing:
    say the result of add both with 1 and 2
end
";
        let c = emit(source);
        assert!(c.contains("int add_both(int a, int b);"), "{c}");
        assert!(c.contains("int add_both(int a, int b) {"), "{c}");
        assert!(c.contains("printf(\"%d\\n\", add_both(1, 2));"), "{c}");
    }

    #[test]
    fn test_array_literal_and_length() {
        let c = emit_main(
            "there is a list of numbers called xs containing 1, 2, 3\nsay the length of xs\nsay the last item in xs",
        );
        assert!(c.contains("int xs[3] = {1, 2, 3};"), "{c}");
        assert!(c.contains("printf(\"%d\\n\", 3);"), "{c}");
        assert!(c.contains("xs[2]"), "{c}");
    }

    #[test]
    fn test_graphics_include_and_calls() {
        let source = "\
include the graphics library

to do the main thing:
    open a window sized 800 by 600 called \"Demo\"
    close the window
end
";
        let c = emit(source);
        assert!(c.contains("#include \"raylib.h\""), "{c}");
        assert!(c.contains("InitWindow(800, 600, \"Demo\");"), "{c}");
        assert!(c.contains("CloseWindow();"), "{c}");
    }

    #[test]
    fn test_random_adds_time_header() {
        let c = emit_main("say a random number between 1 and 6");
        assert!(c.contains("#include <time.h>"), "{c}");
        assert!(c.contains("(rand() % ((6) - (1) + 1) + (1))"), "{c}");
    }

    #[test]
    fn test_file_lowerings() {
        let c = emit_main(
            "there is a file called log which opens \"log.txt\" for writing\nclose the file log",
        );
        assert!(c.contains("FILE *log = fopen(\"log.txt\", \"w\");"), "{c}");
        assert!(c.contains("fclose(log);"), "{c}");
    }

    #[test]
    fn test_compound_assignment() {
        let c = emit_main("there is a number called x\nadd 5 to x\ndecrease x");
        assert!(c.contains("x += (5);"), "{c}");
        assert!(c.contains("x -= (1);"), "{c}");
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        let source = "to do the main thing:\nstop the loop\nend\n";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve::resolve(&mut program).unwrap();
        assert!(matches!(
            transpile(&program, &symbols),
            Err(LowerError::BreakOutsideLoop { .. })
        ));
    }

    #[test]
    fn test_recursive_factorial() {
        let source = "\
to compute factorial with a number called n and return a number:
    if n is at most 1 then
        return 1
    end
    return n times the result of compute factorial with n minus 1
end

to do the main thing:
    there is a number called x
    ask the user for a number and store it in x
    say \"Factorial: \" and then the result of compute factorial with x
end
";
        let c = emit(source);
        assert!(c.contains("int compute_factorial(int n);"), "{c}");
        assert!(c.contains("if ((n <= 1)) {"), "{c}");
        assert!(
            c.contains("return (n * compute_factorial((n - 1)));"),
            "{c}"
        );
        assert!(
            c.contains("printf(\"Factorial: %d\\n\", compute_factorial(x));"),
            "{c}"
        );
    }

    #[test]
    fn test_modulo_condition() {
        let c = emit_main("if 7 modulo 2 equals 0 then\nsay \"even\"\notherwise\nsay \"odd\"\nend");
        assert!(c.contains("if (((7 % 2) == 0)) {"), "{c}");
        assert!(c.contains("} else {"), "{c}");
    }
}
