//! Name resolution for Zinc
//!
//! Walks the parsed AST once, builds the global symbol tables (functions
//! and structures) and annotates every variable reference and call site
//! with what it resolved to. Unknown names are not errors; they are
//! tagged passthrough and survive into the C translation unit verbatim,
//! where only the downstream C compiler can reject them.

use crate::ast::*;
use crate::span::Position;
use std::collections::HashMap;
use thiserror::Error;

/// Resolution errors (all fatal)
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("duplicate function definition '{name}' at {pos}")]
    DuplicateFunction { name: String, pos: Position },

    #[error("duplicate structure definition '{name}' at {pos}")]
    DuplicateStruct { name: String, pos: Position },

    #[error("duplicate field '{field}' in structure '{name}' at {pos}")]
    DuplicateField {
        name: String,
        field: String,
        pos: Position,
    },

    #[error("'{name}' is a reserved word and cannot be used as a name at {pos}")]
    ReservedWord { name: String, pos: Position },
}

impl ResolveError {
    pub fn position(&self) -> Position {
        match self {
            ResolveError::DuplicateFunction { pos, .. }
            | ResolveError::DuplicateStruct { pos, .. }
            | ResolveError::DuplicateField { pos, .. }
            | ResolveError::ReservedWord { pos, .. } => *pos,
        }
    }
}

/// A resolved function signature
#[derive(Debug, Clone)]
pub struct FnSymbol {
    pub name: String,
    pub params: Vec<TypeSpec>,
    pub return_type: Option<TypeSpec>,
    pub is_main: bool,
}

/// Global symbol tables, kept alive through lowering
#[derive(Debug, Default)]
pub struct Symbols {
    pub functions: HashMap<String, FnSymbol>,
    /// Structures in source order (the C lowering emits them in order)
    pub structs: Vec<StructDef>,
}

impl Symbols {
    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }
}

/// Names that are lexically valid in Zinc but would poison the emitted C.
const RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do",
    "double", "else", "enum", "extern", "float", "for", "goto", "if", "int",
    "long", "register", "return", "short", "signed", "sizeof", "static",
    "struct", "switch", "typedef", "union", "unsigned", "void", "volatile",
    "while",
];

fn check_name(name: &str, pos: Position) -> Result<(), ResolveError> {
    if RESERVED.contains(&name) {
        return Err(ResolveError::ReservedWord {
            name: name.to_string(),
            pos,
        });
    }
    Ok(())
}

/// Resolve a program in place and return its symbol tables.
pub fn resolve(program: &mut Program) -> Result<Symbols, ResolveError> {
    let mut symbols = Symbols::default();

    // Globals first, so forward references resolve.
    for def in &program.structs {
        check_name(&def.name, def.pos)?;
        if symbols.struct_def(&def.name).is_some() {
            return Err(ResolveError::DuplicateStruct {
                name: def.name.clone(),
                pos: def.pos,
            });
        }
        let mut seen = Vec::new();
        for field in &def.fields {
            check_name(&field.name, field.pos)?;
            if seen.contains(&&field.name) {
                return Err(ResolveError::DuplicateField {
                    name: def.name.clone(),
                    field: field.name.clone(),
                    pos: field.pos,
                });
            }
            seen.push(&field.name);
        }
        symbols.structs.push(def.clone());
    }

    for func in &program.functions {
        check_name(&func.name, func.pos)?;
        if symbols.functions.contains_key(&func.name) {
            return Err(ResolveError::DuplicateFunction {
                name: func.name.clone(),
                pos: func.pos,
            });
        }
        symbols.functions.insert(
            func.name.clone(),
            FnSymbol {
                name: func.name.clone(),
                params: func.params.iter().map(|p| p.ty.clone()).collect(),
                return_type: func.return_type.clone(),
                is_main: func.is_main,
            },
        );
    }

    let mut resolver = Resolver {
        symbols: &symbols,
        scopes: Vec::new(),
    };
    for func in &mut program.functions {
        resolver.resolve_function(func)?;
    }

    Ok(symbols)
}

struct Resolver<'a> {
    symbols: &'a Symbols,
    /// Innermost scope last; each maps a name to its kind.
    scopes: Vec<HashMap<String, NameKind>>,
}

impl<'a> Resolver<'a> {
    fn resolve_function(&mut self, func: &mut FnDef) -> Result<(), ResolveError> {
        let mut top = HashMap::new();
        for param in &func.params {
            check_name(&param.name, param.pos)?;
            top.insert(param.name.clone(), NameKind::Param);
        }
        self.scopes = vec![top];
        self.resolve_body(&mut func.body)?;
        self.scopes.clear();
        Ok(())
    }

    fn declare(&mut self, name: &str, pos: Position) -> Result<(), ResolveError> {
        check_name(name, pos)?;
        // Shadowing within nested blocks is allowed; the nearest
        // binding wins.
        self.scopes
            .last_mut()
            .expect("scope stack is never empty inside a function")
            .insert(name.to_string(), NameKind::Local);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<NameKind> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn resolve_scoped(&mut self, body: &mut [Stmt]) -> Result<(), ResolveError> {
        self.scopes.push(HashMap::new());
        let result = self.resolve_body(body);
        self.scopes.pop();
        result
    }

    fn resolve_body(&mut self, body: &mut [Stmt]) -> Result<(), ResolveError> {
        for stmt in body {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) -> Result<(), ResolveError> {
        let pos = stmt.pos;
        match &mut stmt.kind {
            StmtKind::VarDecl { name, init, .. } => {
                if let Some(init) = init {
                    self.resolve_expr(init);
                }
                self.declare(name, pos)?;
            }
            StmtKind::FileDecl { name, path, .. } => {
                if let Some(path) = path {
                    self.resolve_expr(path);
                }
                self.declare(name, pos)?;
            }
            StmtKind::Assign { target, value } | StmtKind::Compound { target, value, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            StmtKind::If {
                condition,
                then_body,
                else_ifs,
                else_body,
            } => {
                self.resolve_expr(condition);
                self.resolve_scoped(then_body)?;
                for (cond, body) in else_ifs {
                    self.resolve_expr(cond);
                    self.resolve_scoped(body)?;
                }
                self.resolve_scoped(else_body)?;
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_scoped(body)?;
            }
            StmtKind::For {
                var,
                start,
                end,
                body,
                ..
            } => {
                self.resolve_expr(start);
                self.resolve_expr(end);
                self.scopes.push(HashMap::new());
                self.declare(var, pos)?;
                let result = self.resolve_body(body);
                self.scopes.pop();
                result?;
            }
            StmtKind::ForEach {
                var,
                iterable,
                body,
                ..
            } => {
                self.resolve_expr(iterable);
                self.scopes.push(HashMap::new());
                self.declare(var, pos)?;
                let result = self.resolve_body(body);
                self.scopes.pop();
                result?;
            }
            StmtKind::Repeat { count, body } => {
                self.resolve_expr(count);
                self.resolve_scoped(body)?;
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            StmtKind::Print { parts } => {
                for part in parts {
                    self.resolve_expr(part);
                }
            }
            StmtKind::Input { target, .. } => self.resolve_expr(target),
            StmtKind::Free { pointer } => self.resolve_expr(pointer),
            StmtKind::CloseFile { file } => self.resolve_expr(file),
            StmtKind::Graphics(gfx) => match gfx {
                GfxStmt::OpenWindow {
                    width,
                    height,
                    title,
                } => {
                    self.resolve_expr(width);
                    self.resolve_expr(height);
                    if let Some(title) = title {
                        self.resolve_expr(title);
                    }
                }
                GfxStmt::DrawRectangle {
                    x, y, width, height, ..
                } => {
                    self.resolve_expr(x);
                    self.resolve_expr(y);
                    self.resolve_expr(width);
                    self.resolve_expr(height);
                }
                GfxStmt::DrawText { text, x, y, size, .. } => {
                    self.resolve_expr(text);
                    self.resolve_expr(x);
                    self.resolve_expr(y);
                    self.resolve_expr(size);
                }
                GfxStmt::CloseWindow
                | GfxStmt::BeginDrawing
                | GfxStmt::EndDrawing
                | GfxStmt::ClearScreen { .. } => {}
            },
            StmtKind::RawC(_) | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Expr(expr) => self.resolve_expr(expr),
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Ident { name, res } => {
                *res = self.lookup(name).unwrap_or(NameKind::Passthrough);
            }
            ExprKind::Call { name, args, res } => {
                *res = if self.symbols.functions.contains_key(name.as_str()) {
                    CallKind::Function
                } else {
                    CallKind::Passthrough
                };
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Index { array, index } => {
                self.resolve_expr(array);
                self.resolve_expr(index);
            }
            ExprKind::Member { object, .. } => self.resolve_expr(object),
            ExprKind::AddressOf(operand)
            | ExprKind::Deref(operand)
            | ExprKind::Length(operand)
            | ExprKind::HasLine(operand) => self.resolve_expr(operand),
            ExprKind::ArrayLit(elements) => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
            ExprKind::StructInit(fields) => {
                for (_, value) in fields {
                    self.resolve_expr(value);
                }
            }
            ExprKind::Allocate { count, .. } => self.resolve_expr(count),
            ExprKind::Random { min, max } => {
                self.resolve_expr(min);
                self.resolve_expr(max);
            }
            ExprKind::ReadLine { file, target } => {
                self.resolve_expr(file);
                self.resolve_expr(target);
            }
            ExprKind::OpenFailed(file) => {
                if let Some(file) = file {
                    self.resolve_expr(file);
                }
            }
            ExprKind::StrContains { haystack, needle } => {
                self.resolve_expr(haystack);
                self.resolve_expr(needle);
            }
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::CharLit(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Gfx(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser;

    fn resolved(source: &str) -> (Program, Symbols) {
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        let symbols = resolve(&mut program).unwrap();
        (program, symbols)
    }

    #[test]
    fn test_local_and_param_tagging() {
        let source = "\
to double it with a number called n and return a number:
    there is a number called result which is n times 2
    return result
end
";
        let (program, _) = resolved(source);
        let func = &program.functions[0];
        // `n` in the initializer is a parameter
        match &func.body[0].kind {
            StmtKind::VarDecl { init: Some(init), .. } => match &init.kind {
                ExprKind::Binary { left, .. } => {
                    assert!(matches!(
                        left.kind,
                        ExprKind::Ident { res: NameKind::Param, .. }
                    ));
                }
                other => panic!("unexpected init: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
        // `result` in the return is a local
        match &func.body[1].kind {
            StmtKind::Return { value: Some(value) } => {
                assert!(matches!(
                    value.kind,
                    ExprKind::Ident { res: NameKind::Local, .. }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_is_passthrough() {
        let source = "to do the main thing:\n    say mystery\nend\n";
        let (program, _) = resolved(source);
        match &program.functions[0].body[0].kind {
            StmtKind::Print { parts } => {
                assert!(matches!(
                    parts[0].kind,
                    ExprKind::Ident { res: NameKind::Passthrough, .. }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_no_call_left_unresolved() {
        let source = "\
to greet the user:
    say \"hi\"
end

to do the main thing:
    greet the user
    say the result of mystery thing
end
";
        let (program, _) = resolved(source);
        let main = program.functions.iter().find(|f| f.is_main).unwrap();
        let kinds: Vec<CallKind> = main
            .body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Expr(Expr { kind: ExprKind::Call { res, .. }, .. }) => Some(*res),
                StmtKind::Print { parts } => match &parts[0].kind {
                    ExprKind::Call { res, .. } => Some(*res),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![CallKind::Function, CallKind::Passthrough]);
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let source = "\
to greet the user:
    say \"hi\"
end

to greet the user:
    say \"hello\"
end
";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        assert!(matches!(
            resolve(&mut program),
            Err(ResolveError::DuplicateFunction { .. })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let source = "\
define a Point as having:
    number called x
    number called x
end

to do the main thing:
    say 1
end
";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        assert!(matches!(
            resolve(&mut program),
            Err(ResolveError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_reserved_word_rejected() {
        let source = "to do the main thing:\n    there is a number called int\nend\n";
        let tokens = lex(source).unwrap();
        let mut program = parser::parse(source, tokens).unwrap();
        assert!(matches!(
            resolve(&mut program),
            Err(ResolveError::ReservedWord { .. })
        ));
    }

    #[test]
    fn test_loop_variable_scoped_to_body() {
        let source = "\
to do the main thing:
    for each number i from 1 to 3:
        say i
    end
    say i
end
";
        let (program, _) = resolved(source);
        let body = &program.functions[0].body;
        // inside the loop: local
        match &body[0].kind {
            StmtKind::For { body: loop_body, .. } => match &loop_body[0].kind {
                StmtKind::Print { parts } => {
                    assert!(matches!(
                        parts[0].kind,
                        ExprKind::Ident { res: NameKind::Local, .. }
                    ));
                }
                other => panic!("unexpected statement: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
        // after the loop: out of scope, passthrough
        match &body[1].kind {
            StmtKind::Print { parts } => {
                assert!(matches!(
                    parts[0].kind,
                    ExprKind::Ident { res: NameKind::Passthrough, .. }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_symbols_table() {
        let source = "\
define a Person as having:
    number called age
end

to greet the user:
    say \"hi\"
end

to do the main thing:
    say 1
end
";
        let (_, symbols) = resolved(source);
        assert!(symbols.functions.contains_key("greet_the_user"));
        assert!(symbols.functions.contains_key("main"));
        assert!(symbols.struct_def("Person").is_some());
    }
}
