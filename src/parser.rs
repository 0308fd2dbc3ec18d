//! Parser for the Zinc language
//!
//! A recursive descent parser over the folded token stream. Two passes:
//! a signature prepass indexes every top-level `to` introducer so call
//! sites can reconstruct multi-word function names by longest match even
//! before the definition has been parsed; the main pass builds the AST.
//!
//! Statements end at end-of-line or at a structural keyword. Colons after
//! introducers and `then` after conditions are optional. A statement that
//! starts with an identifier the grammar cannot place is captured as a
//! raw-C line and emitted verbatim by the C lowering.

use crate::ast::*;
use crate::span::Position;
use crate::token::{Token, TokenKind};
use thiserror::Error;

/// Parser errors
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("unexpected token at {pos}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: Position,
    },

    #[error("unexpected end of file at {pos}")]
    UnexpectedEof { pos: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { pos, .. } => *pos,
            ParseError::UnexpectedEof { pos } => *pos,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

// ============ Function signature prepass ============

/// An indexed function signature: the name's word sequence and its
/// snake-cased form.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub words: Vec<String>,
    pub name: String,
}

/// Index of all `to`-introduced function names, sorted longest-first so
/// call-site matching is greedy.
#[derive(Debug, Default)]
pub struct FnIndex {
    sigs: Vec<FnSig>,
}

impl FnIndex {
    /// The longest indexed name that is a prefix of `words`.
    pub fn longest_match(&self, words: &[String]) -> Option<&FnSig> {
        self.sigs.iter().find(|sig| {
            sig.words.len() <= words.len()
                && sig.words.iter().zip(words).all(|(a, b)| a == b)
        })
    }
}

/// Scan the token stream for line-initial `to` introducers and index
/// their names. Runs before the main parse so forward references work.
pub fn scan_signatures(tokens: &[Token]) -> FnIndex {
    let mut sigs = Vec::new();
    let mut at_line_start = true;

    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        if at_line_start && tok.kind == TokenKind::To {
            let mut j = i + 1;
            let mut words = Vec::new();
            while j < tokens.len() {
                let t = &tokens[j];
                if !t.kind.is_wordish()
                    || matches!(
                        t.kind,
                        TokenKind::With | TokenKind::AndReturn | TokenKind::DoMain
                    )
                {
                    break;
                }
                for w in t.text.split_whitespace() {
                    words.push(w.to_ascii_lowercase());
                }
                j += 1;
            }
            if !words.is_empty() {
                sigs.push(FnSig {
                    name: words.join("_"),
                    words,
                });
            }
        }
        at_line_start = tok.kind == TokenKind::Newline;
        i += 1;
    }

    sigs.sort_by(|a, b| b.words.len().cmp(&a.words.len()));
    FnIndex { sigs }
}

// ============ Parser ============

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    fn_index: FnIndex,
}

/// Parse a token stream into a program. `source` is the original text;
/// the raw-C fallback slices physical lines from it.
pub fn parse(source: &str, tokens: Vec<Token>) -> ParseResult<Program> {
    Parser::new(source, tokens).parse_program()
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        let fn_index = scan_signatures(&tokens);
        Self {
            source,
            tokens,
            pos: 0,
            fn_index,
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Owned copy of the current kind; dispatch matches use this so the
    /// arms are free to take `&mut self`.
    fn current_kind(&self) -> TokenKind {
        self.current().kind.clone()
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.peek(offset).kind.clone()
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.err_expected(&kind.to_string()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<Token> {
        if self.check(TokenKind::Ident) {
            Ok(self.advance())
        } else {
            Err(self.err_expected("identifier"))
        }
    }

    fn err_expected(&self, expected: &str) -> ParseError {
        let tok = self.current();
        if tok.kind == TokenKind::Eof {
            return ParseError::UnexpectedEof { pos: tok.pos };
        }
        let found = if tok.text.is_empty() {
            tok.kind.to_string()
        } else {
            format!("{} '{}'", tok.kind, tok.text)
        };
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            pos: tok.pos,
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_articles(&mut self) {
        while matches!(self.current().kind, TokenKind::A | TokenKind::An) {
            self.advance();
        }
    }

    /// Case-insensitive check on the current token's surface text; used
    /// by the graphics productions for their loose connective words
    /// (`sized`, `at`, `colored`, ...).
    fn word_is(&self, word: &str) -> bool {
        self.current().kind.is_wordish() && self.current().text.eq_ignore_ascii_case(word)
    }

    // ============ Top level ============

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut program = Program {
            includes: Vec::new(),
            structs: Vec::new(),
            functions: Vec::new(),
        };

        self.skip_newlines();
        while !self.check(TokenKind::Eof) {
            match self.current_kind() {
                TokenKind::Include => program.includes.push(self.parse_include()?),
                TokenKind::Define => program.structs.push(self.parse_struct()?),
                TokenKind::To => program.functions.push(self.parse_function()?),
                _ => {
                    return Err(self.err_expected(
                        "an include, a structure definition, or a function definition",
                    ))
                }
            }
            self.skip_newlines();
        }

        Ok(program)
    }

    fn parse_include(&mut self) -> ParseResult<Include> {
        let pos = self.current().pos;
        self.advance(); // include / use

        let library = match self.current_kind() {
            TokenKind::StandardIo => {
                self.advance();
                Library::Io
            }
            TokenKind::StandardMath => {
                self.advance();
                Library::Math
            }
            TokenKind::StringFunctions => {
                self.advance();
                Library::Strings
            }
            TokenKind::FileFunctions => {
                self.advance();
                Library::Files
            }
            TokenKind::RandomFunctions => {
                self.advance();
                Library::Random
            }
            TokenKind::GraphicsLibrary => {
                self.advance();
                Library::Graphics
            }
            TokenKind::FileCalled => {
                self.advance();
                let name = match self.current_kind() {
                    TokenKind::Str(value) => {
                        self.advance();
                        value
                    }
                    TokenKind::Ident => self.advance().text,
                    _ => return Err(self.err_expected("a header name")),
                };
                Library::User(name)
            }
            _ => return Err(self.err_expected("a library name")),
        };

        Ok(Include { library, pos })
    }

    fn parse_struct(&mut self) -> ParseResult<StructDef> {
        let pos = self.current().pos;
        self.advance(); // define
        self.skip_articles();

        let name = self.expect_ident()?.text;
        self.expect(TokenKind::AsHaving)?;
        self.consume(TokenKind::Colon);
        self.skip_newlines();

        let mut fields = Vec::new();
        while !matches!(self.current().kind, TokenKind::End | TokenKind::Eof) {
            let field_pos = self.current().pos;
            let ty = self.parse_type()?;
            self.expect(TokenKind::Called)?;
            let field_name = self.expect_ident()?.text;
            fields.push(Field {
                name: field_name,
                ty,
                pos: field_pos,
            });
            self.skip_newlines();
        }
        self.expect(TokenKind::End)?;

        Ok(StructDef { name, fields, pos })
    }

    fn parse_function(&mut self) -> ParseResult<FnDef> {
        let pos = self.current().pos;
        self.expect(TokenKind::To)?;

        if self.consume(TokenKind::DoMain) {
            self.consume(TokenKind::Colon);
            self.skip_newlines();
            let body = self.parse_block()?;
            return Ok(FnDef {
                name: "main".to_string(),
                params: Vec::new(),
                return_type: Some(TypeSpec::number()),
                body,
                is_main: true,
                pos,
            });
        }

        // Function names are phrases: every word up to `with`,
        // `and return`, `:` or end-of-line belongs to the name.
        let mut words = Vec::new();
        while !matches!(
            self.current().kind,
            TokenKind::With
                | TokenKind::AndReturn
                | TokenKind::Colon
                | TokenKind::Newline
                | TokenKind::Eof
        ) {
            if !self.current().kind.is_wordish() {
                return Err(self.err_expected("a function name word"));
            }
            let tok = self.advance();
            for w in tok.text.split_whitespace() {
                words.push(w.to_ascii_lowercase());
            }
        }
        if words.is_empty() {
            return Err(self.err_expected("a function name"));
        }
        let name = words.join("_");

        let params = if self.consume(TokenKind::With) {
            self.parse_params()?
        } else {
            Vec::new()
        };

        let return_type = if self.consume(TokenKind::AndReturn) {
            self.skip_articles();
            Some(self.parse_type()?)
        } else {
            None
        };

        self.consume(TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block()?;

        Ok(FnDef {
            name,
            params,
            return_type,
            body,
            is_main: false,
            pos,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = Vec::new();
        loop {
            let pos = self.current().pos;
            self.skip_articles();
            let ty = self.parse_type()?;
            self.consume(TokenKind::Called);
            let name = self.expect_ident()?.text;
            params.push(Param { name, ty, pos });

            if self.consume(TokenKind::And) || self.consume(TokenKind::Comma) {
                continue;
            }
            break;
        }
        Ok(params)
    }

    fn parse_type(&mut self) -> ParseResult<TypeSpec> {
        let mut ty = TypeSpec::number();

        self.skip_articles();
        if self.consume(TokenKind::PointerTo) {
            ty.is_pointer = true;
            self.skip_articles();
        }
        if self.consume(TokenKind::ListOf) {
            ty.is_array = true;
            if let TokenKind::Int(n) = self.current_kind() {
                self.advance();
                ty.array_size = Some(n as usize);
            }
        }

        ty.base = match self.current_kind() {
            TokenKind::Number => {
                self.advance();
                BaseType::Number
            }
            TokenKind::Decimal => {
                self.advance();
                BaseType::Decimal
            }
            TokenKind::Text => {
                self.advance();
                BaseType::Text
            }
            TokenKind::Letter => {
                self.advance();
                BaseType::Letter
            }
            TokenKind::Boolean => {
                self.advance();
                BaseType::Boolean
            }
            TokenKind::Nothing => {
                self.advance();
                BaseType::Nothing
            }
            TokenKind::Ident => BaseType::Struct(self.advance().text),
            // Untyped positions default to number, matching the loose
            // surface grammar.
            _ => BaseType::Number,
        };

        Ok(ty)
    }

    // ============ Statements ============

    /// Parse statements until one of `stops` (or end of file). Does not
    /// consume the stop token. Semicolons are accepted between
    /// statements but never required.
    fn parse_stmts_until(&mut self, stops: &[TokenKind]) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.check(TokenKind::Newline) || self.check(TokenKind::Punct(';')) {
                self.advance();
            }
            if self.check(TokenKind::Eof) || stops.contains(&self.current().kind) {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    /// A block runs to its closing `end`.
    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        let stmts = self.parse_stmts_until(&[TokenKind::End])?;
        self.consume(TokenKind::End);
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        match self.current_kind() {
            TokenKind::ThereIs => self.parse_var_decl(),
            TokenKind::Let => self.parse_let(),
            TokenKind::Change | TokenKind::Set | TokenKind::Now | TokenKind::Make => {
                self.parse_assignment()
            }
            TokenKind::Add => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::To)?;
                let target = self.parse_assign_target()?;
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Add,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::Subtract => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::From)?;
                let target = self.parse_assign_target()?;
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Sub,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::Multiply => {
                self.advance();
                let target = self.parse_assign_target()?;
                self.consume(TokenKind::By);
                self.consume(TokenKind::Times);
                let value = self.parse_expression()?;
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Mul,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::Divide => {
                self.advance();
                let target = self.parse_assign_target()?;
                self.consume(TokenKind::By);
                let value = self.parse_expression()?;
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Div,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::Increase => {
                self.advance();
                let target = self.parse_assign_target()?;
                let value = Expr::int(1, pos);
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Add,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::Decrease => {
                self.advance();
                let target = self.parse_assign_target()?;
                let value = Expr::int(1, pos);
                Ok(Stmt::new(
                    StmtKind::Compound {
                        op: BinOp::Sub,
                        target,
                        value,
                    },
                    pos,
                ))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::ForEach => self.parse_for(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Say => self.parse_print(),
            TokenKind::AskUserFor | TokenKind::Read | TokenKind::GetInput => self.parse_input(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::new(StmtKind::Break, pos))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::new(StmtKind::Continue, pos))
            }
            TokenKind::StopProgram => {
                self.advance();
                Ok(Stmt::new(
                    StmtKind::Return {
                        value: Some(Expr::int(1, pos)),
                    },
                    pos,
                ))
            }
            TokenKind::Free => {
                self.advance();
                let pointer = self.parse_expression()?;
                Ok(Stmt::new(StmtKind::Free { pointer }, pos))
            }
            TokenKind::CloseFile => {
                self.advance();
                let file = self.parse_primary()?;
                Ok(Stmt::new(StmtKind::CloseFile { file }, pos))
            }
            TokenKind::Allocate => self.parse_alloc_decl(),
            TokenKind::OpenWindow => self.parse_open_window(),
            TokenKind::CloseWindow => {
                self.advance();
                Ok(Stmt::new(StmtKind::Graphics(GfxStmt::CloseWindow), pos))
            }
            TokenKind::BeginDrawing => {
                self.advance();
                Ok(Stmt::new(StmtKind::Graphics(GfxStmt::BeginDrawing), pos))
            }
            TokenKind::EndDrawing => {
                self.advance();
                Ok(Stmt::new(StmtKind::Graphics(GfxStmt::EndDrawing), pos))
            }
            TokenKind::ClearScreen => {
                self.advance();
                let color = self.parse_color("RAYWHITE");
                Ok(Stmt::new(
                    StmtKind::Graphics(GfxStmt::ClearScreen { color }),
                    pos,
                ))
            }
            TokenKind::DrawRectangle => self.parse_draw_rectangle(),
            TokenKind::DrawText => self.parse_draw_text(),
            TokenKind::Ident => self.parse_identifier_statement(),
            TokenKind::Number
            | TokenKind::Decimal
            | TokenKind::Text
            | TokenKind::Letter
            | TokenKind::Boolean
            | TokenKind::PointerTo
            | TokenKind::ListOf => self.parse_typed_var_decl(),
            _ => {
                let expr = self.parse_expression()?;
                Ok(Stmt::new(StmtKind::Expr(expr), pos))
            }
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<Stmt> {
        let intro = self.advance(); // there is (a / an / a file called)
        let pos = intro.pos;

        if intro.text.to_ascii_lowercase().contains("file") {
            let name = self.expect_ident()?.text;
            let mut path = None;
            let mut mode = FileMode::Read;
            if self.consume(TokenKind::Opens) {
                path = Some(self.parse_expression()?);
                if self.consume(TokenKind::ForWriting) {
                    mode = FileMode::Write;
                } else {
                    self.consume(TokenKind::ForReading);
                }
            }
            return Ok(Stmt::new(StmtKind::FileDecl { name, path, mode }, pos));
        }

        let ty = self.parse_type()?;
        self.expect(TokenKind::Called)?;
        let name = self.expect_ident()?.text;

        let init = if self.consume(TokenKind::WhichIs) {
            Some(self.parse_expression()?)
        } else if self.consume(TokenKind::WhichHas) {
            Some(self.parse_struct_init()?)
        } else if self.consume(TokenKind::Containing) {
            let lit_pos = self.current().pos;
            let mut elements = vec![self.parse_expression()?];
            while self.consume(TokenKind::Comma) {
                elements.push(self.parse_expression()?);
            }
            Some(Expr::new(ExprKind::ArrayLit(elements), lit_pos))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                ty: Some(ty),
                init,
            },
            pos,
        ))
    }

    /// The typed shorthand: `number x is 5`
    fn parse_typed_var_decl(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        let ty = self.parse_type()?;
        let name = self.expect_ident()?.text;
        let init = if self.consume(TokenKind::Is) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                ty: Some(ty),
                init,
            },
            pos,
        ))
    }

    /// `which has name "Alice" and age 25`
    fn parse_struct_init(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        let mut fields = Vec::new();
        loop {
            let field = self.expect_ident()?.text;
            let value = self.parse_expression()?;
            fields.push((field, value));
            if self.consume(TokenKind::And) || self.consume(TokenKind::Comma) {
                continue;
            }
            break;
        }
        Ok(Expr::new(ExprKind::StructInit(fields), pos))
    }

    /// `allocate space for N numbers and call it p`
    fn parse_alloc_decl(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // allocate space for
        let count = self.parse_expression()?;
        let elem_ty = self.parse_type()?;
        self.expect(TokenKind::Called)?;
        let name = self.expect_ident()?.text;

        let decl_ty = TypeSpec {
            base: elem_ty.base.clone(),
            is_pointer: true,
            is_array: false,
            array_size: None,
        };
        let init = Expr::new(
            ExprKind::Allocate {
                count: Box::new(count),
                ty: elem_ty,
            },
            pos,
        );
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                ty: Some(decl_ty),
                init: Some(init),
            },
            pos,
        ))
    }

    fn parse_let(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // let
        let name = self.expect_ident()?;
        let target = Expr::new(
            ExprKind::Ident {
                name: name.text,
                res: NameKind::Unresolved,
            },
            name.pos,
        );
        self.expect(TokenKind::Be)?;
        let value = self.parse_expression()?;
        Ok(Stmt::new(StmtKind::Assign { target, value }, pos))
    }

    fn parse_assignment(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // set / change / now / make
        let target = self.parse_assign_target()?;
        while matches!(
            self.current().kind,
            TokenKind::To | TokenKind::Is | TokenKind::EqualTo
        ) {
            self.advance();
        }
        let value = self.parse_expression()?;
        Ok(Stmt::new(StmtKind::Assign { target, value }, pos))
    }

    /// The left-hand side of an assignment.
    fn parse_assign_target(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        match self.current_kind() {
            TokenKind::ItemNumber => {
                self.advance();
                let index = self.parse_expression()?;
                while matches!(self.current().kind, TokenKind::In | TokenKind::Of) {
                    self.advance();
                }
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                    pos,
                ))
            }
            TokenKind::FirstItemIn => {
                self.advance();
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(Expr::int(0, pos)),
                    },
                    pos,
                ))
            }
            TokenKind::LastItemIn => {
                self.advance();
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(Expr::int(-1, pos)),
                    },
                    pos,
                ))
            }
            TokenKind::ValueAt => {
                self.advance();
                let ptr = self.parse_primary()?;
                Ok(Expr::new(ExprKind::Deref(Box::new(ptr)), pos))
            }
            TokenKind::The => {
                self.advance();
                self.parse_assign_target()
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // if
        let condition = self.parse_condition()?;
        self.consume(TokenKind::Then);
        self.consume(TokenKind::Colon);
        self.skip_newlines();

        let then_body = self.parse_stmts_until(&[TokenKind::End, TokenKind::Otherwise])?;
        let mut else_ifs = Vec::new();
        let mut else_body = Vec::new();

        while self.consume(TokenKind::Otherwise) {
            if self.consume(TokenKind::If) {
                let cond = self.parse_condition()?;
                self.consume(TokenKind::Then);
                self.consume(TokenKind::Colon);
                self.skip_newlines();
                let body = self.parse_stmts_until(&[TokenKind::End, TokenKind::Otherwise])?;
                else_ifs.push((cond, body));
            } else {
                self.consume(TokenKind::Colon);
                self.skip_newlines();
                else_body = self.parse_stmts_until(&[TokenKind::End])?;
                break;
            }
        }
        self.consume(TokenKind::End);

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_body,
                else_ifs,
                else_body,
            },
            pos,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // while / keep doing this while
        let condition = self.parse_condition()?;
        self.consume(TokenKind::Then);
        self.consume(TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::While { condition, body }, pos))
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // for each

        let ty = if self.current().kind.starts_type() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let var = self.expect_ident()?.text;

        if self.consume(TokenKind::From) {
            let start = self.parse_expression()?;
            let descending = self.consume(TokenKind::DownTo);
            if !descending {
                self.expect(TokenKind::To)?;
            }
            let end = self.parse_expression()?;
            self.consume(TokenKind::Colon);
            self.skip_newlines();
            let body = self.parse_block()?;
            Ok(Stmt::new(
                StmtKind::For {
                    var,
                    start,
                    end,
                    descending,
                    body,
                },
                pos,
            ))
        } else if self.consume(TokenKind::In) {
            self.consume(TokenKind::The);
            let iterable = self.parse_expression()?;
            self.consume(TokenKind::Colon);
            self.skip_newlines();
            let body = self.parse_block()?;
            Ok(Stmt::new(
                StmtKind::ForEach {
                    var,
                    ty,
                    iterable,
                    body,
                },
                pos,
            ))
        } else {
            Err(self.err_expected("'from' or 'in'"))
        }
    }

    fn parse_repeat(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // repeat
        // parse_primary, so `times` stays the loop keyword rather than
        // becoming multiplication
        let count = self.parse_primary()?;
        self.consume(TokenKind::Times);
        self.consume(TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::Repeat { count, body }, pos))
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // say / print / show / display
        self.consume(TokenKind::TheValueOf);

        let mut parts = vec![self.parse_expression()?];
        while matches!(
            self.current().kind,
            TokenKind::AndThen | TokenKind::FollowedBy | TokenKind::And
        ) {
            self.advance();
            parts.push(self.parse_expression()?);
        }

        Ok(Stmt::new(StmtKind::Print { parts }, pos))
    }

    fn parse_input(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        let intro = self.advance();
        let text = intro.text.to_ascii_lowercase();

        let ty = match intro.kind {
            TokenKind::AskUserFor | TokenKind::Read => {
                if text.contains("number") {
                    InputType::Number
                } else if text.contains("decimal") {
                    InputType::Decimal
                } else if text.contains("letter") {
                    InputType::Letter
                } else {
                    InputType::Text
                }
            }
            _ => InputType::Text, // get input from the user as
        };

        let target = self.parse_assign_target()?;
        Ok(Stmt::new(StmtKind::Input { target, ty }, pos))
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // return
        let value = if matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::End | TokenKind::Eof
        ) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        Ok(Stmt::new(StmtKind::Return { value }, pos))
    }

    // ============ Graphics statements ============

    fn parse_color(&mut self, default: &str) -> String {
        if self.check(TokenKind::Ident) {
            self.advance().text.to_ascii_uppercase()
        } else {
            default.to_string()
        }
    }

    fn parse_open_window(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // open a window sized
        let width = self.parse_primary()?;
        if self.check(TokenKind::By) || self.word_is("x") {
            self.advance();
        }
        let height = self.parse_primary()?;

        let mut title = None;
        if self.consume(TokenKind::Called) || self.consume(TokenKind::With) {
            if self.word_is("title") {
                self.advance();
            }
            title = Some(self.parse_expression()?);
        } else if matches!(self.current().kind, TokenKind::Str(_)) {
            title = Some(self.parse_expression()?);
        }

        Ok(Stmt::new(
            StmtKind::Graphics(GfxStmt::OpenWindow {
                width,
                height,
                title,
            }),
            pos,
        ))
    }

    fn parse_draw_rectangle(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // draw a rectangle at
        let x = self.parse_primary()?;
        self.consume(TokenKind::Comma);
        let y = self.parse_primary()?;
        if self.word_is("sized") || self.word_is("size") || self.check(TokenKind::With) {
            self.advance();
            if self.word_is("size") {
                self.advance();
            }
        }
        let width = self.parse_primary()?;
        if self.check(TokenKind::By) || self.word_is("x") {
            self.advance();
        }
        let height = self.parse_primary()?;

        let mut color = "LIGHTGRAY".to_string();
        if self.check(TokenKind::In) || self.check(TokenKind::With) || self.word_is("colored") {
            self.advance();
            if self.word_is("color") {
                self.advance();
            }
            color = self.parse_color(&color);
        }

        Ok(Stmt::new(
            StmtKind::Graphics(GfxStmt::DrawRectangle {
                x,
                y,
                width,
                height,
                color,
            }),
            pos,
        ))
    }

    fn parse_draw_text(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;
        self.advance(); // draw text
        let text = self.parse_expression()?;

        let mut x = Expr::int(0, pos);
        let mut y = Expr::int(0, pos);
        let mut size = Expr::int(20, pos);
        let mut color = "BLACK".to_string();

        if self.word_is("at") {
            self.advance();
            x = self.parse_expression()?;
            self.consume(TokenKind::Comma);
            y = self.parse_expression()?;
        }
        if self.word_is("size") || self.word_is("sized") || self.check(TokenKind::With) {
            self.advance();
            if self.word_is("size") {
                self.advance();
            }
            size = self.parse_expression()?;
        }
        if self.check(TokenKind::In) || self.word_is("colored") || self.check(TokenKind::With) {
            self.advance();
            if self.word_is("color") {
                self.advance();
            }
            color = self.parse_color(&color);
        }

        Ok(Stmt::new(
            StmtKind::Graphics(GfxStmt::DrawText {
                text,
                x,
                y,
                size,
                color,
            }),
            pos,
        ))
    }

    // ============ Identifier statements and the C fallback ============

    fn parse_identifier_statement(&mut self) -> ParseResult<Stmt> {
        let pos = self.current().pos;

        // Assignment-shaped statements win over a function that happens
        // to share its first word with the target variable.
        if matches!(
            self.peek(1).kind,
            TokenKind::ApostropheS | TokenKind::Is | TokenKind::To | TokenKind::EqualTo
        ) {
            let target = self.parse_postfix()?;
            if matches!(
                self.current().kind,
                TokenKind::To | TokenKind::Is | TokenKind::EqualTo
            ) {
                self.advance();
                let value = self.parse_expression()?;
                return Ok(Stmt::new(StmtKind::Assign { target, value }, pos));
            }
            return Ok(Stmt::new(StmtKind::Expr(target), pos));
        }

        // A statement may begin with a known function phrase.
        if let Some((consumed, name)) = self.match_fn_phrase() {
            for _ in 0..consumed {
                self.advance();
            }
            let args = self.parse_call_args()?;
            let call = Expr::new(
                ExprKind::Call {
                    name,
                    args,
                    res: CallKind::Unresolved,
                },
                pos,
            );
            return Ok(Stmt::new(StmtKind::Expr(call), pos));
        }

        match self.peek_kind(1) {
            // A lone identifier on its line is a bare expression.
            TokenKind::Newline | TokenKind::Eof | TokenKind::End | TokenKind::Otherwise => {
                let expr = self.parse_expression()?;
                Ok(Stmt::new(StmtKind::Expr(expr), pos))
            }
            // No Zinc statement production matches: take the rest of the
            // physical line as raw C.
            _ => self.parse_raw_c(),
        }
    }

    fn parse_raw_c(&mut self) -> ParseResult<Stmt> {
        let tok = self.current().clone();
        let start = tok.span.start;
        let end = self.source[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.source.len());
        let text = self.source[start..end].trim_end().to_string();

        while !matches!(self.current().kind, TokenKind::Newline | TokenKind::Eof) {
            self.advance();
        }
        Ok(Stmt::new(StmtKind::RawC(text), tok.pos))
    }

    // ============ Call phrase matching ============

    /// Match the longest known function phrase at the current position.
    /// Returns how many tokens the phrase spans and the sanitized name.
    fn match_fn_phrase(&self) -> Option<(usize, String)> {
        let mut words: Vec<String> = Vec::new();
        let mut boundaries: Vec<usize> = Vec::new();
        let mut count = 0usize;

        loop {
            let tok = self.peek(count);
            if !tok.kind.is_wordish()
                || matches!(
                    tok.kind,
                    TokenKind::With | TokenKind::AndThen | TokenKind::FollowedBy
                )
            {
                break;
            }
            for w in tok.text.split_whitespace() {
                words.push(w.to_ascii_lowercase());
            }
            count += 1;
            boundaries.push(words.len());
            if count >= 16 {
                break;
            }
        }
        if words.is_empty() {
            return None;
        }

        let sig = self.fn_index.longest_match(&words)?;
        let consumed = boundaries.iter().position(|&b| b == sig.words.len())? + 1;
        Some((consumed, sig.name.clone()))
    }

    /// Arguments after a matched call phrase: `with`-introduced or bare,
    /// separated by `and` or commas.
    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        self.consume(TokenKind::With);
        self.consume(TokenKind::Of);
        if self.starts_expression() {
            loop {
                args.push(self.parse_expression()?);
                if self.consume(TokenKind::And) || self.consume(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        Ok(args)
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::CharLit(_)
                | TokenKind::Yes
                | TokenKind::No
                | TokenKind::Null
                | TokenKind::Ident
                | TokenKind::The
                | TokenKind::A
                | TokenKind::An
                | TokenKind::Negative
                | TokenKind::SquareRootOf
                | TokenKind::AbsoluteValueOf
                | TokenKind::TheSumOf
                | TokenKind::TheValueOf
                | TokenKind::AddressOf
                | TokenKind::ValueAt
                | TokenKind::ResultOf
                | TokenKind::ItemNumber
                | TokenKind::FirstItemIn
                | TokenKind::LastItemIn
                | TokenKind::LengthOf
                | TokenKind::Allocate
                | TokenKind::RandomNumber
                | TokenKind::AnotherLineIn
                | TokenKind::ReadLineFrom
                | TokenKind::FailedToOpen
                | TokenKind::WindowShouldClose
                | TokenKind::MouseX
                | TokenKind::MouseY
                | TokenKind::MousePressed
        )
    }

    /// Call phrase after `the result of` with an unknown name: words are
    /// collected until something that can only be an argument or a
    /// terminator shows up. The call resolves as passthrough later.
    fn parse_unknown_call(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        let mut words: Vec<String> = Vec::new();
        let mut args = Vec::new();

        loop {
            match self.current_kind() {
                TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::CharLit(_) => args.push(self.parse_primary()?),
                TokenKind::Ident => {
                    let arg_follows = matches!(
                        self.peek(1).kind,
                        TokenKind::And
                            | TokenKind::Comma
                            | TokenKind::Newline
                            | TokenKind::Plus
                            | TokenKind::Minus
                            | TokenKind::Times
                            | TokenKind::DividedBy
                            | TokenKind::Then
                            | TokenKind::End
                            | TokenKind::Eof
                    );
                    if arg_follows {
                        args.push(self.parse_primary()?);
                    } else {
                        words.push(self.advance().text.to_ascii_lowercase());
                    }
                }
                TokenKind::The | TokenKind::A | TokenKind::An => {
                    self.advance();
                }
                TokenKind::Of | TokenKind::With | TokenKind::In => {
                    words.push(self.advance().text.to_ascii_lowercase());
                }
                _ => break,
            }
        }

        let name = if words.is_empty() {
            "unknown".to_string()
        } else {
            words.join("_")
        };
        Ok(Expr::new(
            ExprKind::Call {
                name,
                args,
                res: CallKind::Unresolved,
            },
            pos,
        ))
    }

    // ============ Conditions ============

    pub(crate) fn parse_condition(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let pos = self.advance().pos;
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: BinOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.check(TokenKind::And) {
            let pos = self.advance().pos;
            let right = self.parse_not()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: BinOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Not) {
            let pos = self.advance().pos;
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
                pos,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_expression()?;
        let pos = self.current().pos;

        let binary = |op: BinOp, left: Expr, right: Expr| {
            Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            )
        };

        let simple = match self.current_kind() {
            TokenKind::GreaterThan => Some(BinOp::Gt),
            TokenKind::LessThan => Some(BinOp::Lt),
            TokenKind::Equals | TokenKind::Is => Some(BinOp::Eq),
            TokenKind::NotEqualTo => Some(BinOp::Ne),
            TokenKind::AtLeast => Some(BinOp::Ge),
            TokenKind::AtMost => Some(BinOp::Le),
            _ => None,
        };
        if let Some(op) = simple {
            self.advance();
            let right = self.parse_expression()?;
            return Ok(binary(op, left, right));
        }

        match self.current_kind() {
            TokenKind::Between => {
                self.advance();
                let low = self.parse_expression()?;
                self.expect(TokenKind::And)?;
                let high = self.parse_expression()?;
                let ge = binary(BinOp::Ge, left.clone(), low);
                let le = binary(BinOp::Le, left, high);
                Ok(binary(BinOp::And, ge, le))
            }
            TokenKind::IsPositive => {
                self.advance();
                Ok(binary(BinOp::Gt, left, Expr::int(0, pos)))
            }
            TokenKind::IsNegative => {
                self.advance();
                Ok(binary(BinOp::Lt, left, Expr::int(0, pos)))
            }
            TokenKind::IsZero => {
                self.advance();
                Ok(binary(BinOp::Eq, left, Expr::int(0, pos)))
            }
            TokenKind::IsEven => {
                self.advance();
                let modulo = binary(BinOp::Mod, left, Expr::int(2, pos));
                Ok(binary(BinOp::Eq, modulo, Expr::int(0, pos)))
            }
            TokenKind::IsOdd => {
                self.advance();
                let modulo = binary(BinOp::Mod, left, Expr::int(2, pos));
                Ok(binary(BinOp::Ne, modulo, Expr::int(0, pos)))
            }
            TokenKind::IsEmpty => {
                self.advance();
                let len = Expr::new(ExprKind::Length(Box::new(left)), pos);
                Ok(binary(BinOp::Eq, len, Expr::int(0, pos)))
            }
            TokenKind::Contains => {
                self.advance();
                let needle = self.parse_expression()?;
                Ok(Expr::new(
                    ExprKind::StrContains {
                        haystack: Box::new(left),
                        needle: Box::new(needle),
                    },
                    pos,
                ))
            }
            _ => Ok(left),
        }
    }

    // ============ Expressions ============

    /// Arithmetic expression. `and` is not consumed here: output
    /// statements and the `is between` form use it as a separator.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while matches!(self.current().kind, TokenKind::Plus | TokenKind::Minus) {
            let tok = self.advance();
            let op = if tok.kind == TokenKind::Plus {
                BinOp::Add
            } else {
                BinOp::Sub
            };
            let right = self.parse_multiplicative()?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok.pos,
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Times => BinOp::Mul,
                TokenKind::DividedBy => BinOp::Div,
                TokenKind::Modulo => BinOp::Mod,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_power()?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                tok.pos,
            );
        }
        Ok(left)
    }

    /// `to the power of` is right-associative.
    fn parse_power(&mut self) -> ParseResult<Expr> {
        let left = self.parse_unary()?;
        if self.check(TokenKind::ToThePowerOf) {
            let pos = self.advance().pos;
            let right = self.parse_power()?;
            return Ok(Expr::new(
                ExprKind::Binary {
                    op: BinOp::Pow,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            ));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        match self.current_kind() {
            TokenKind::Negative => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Neg,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::SquareRootOf => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Sqrt,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::AbsoluteValueOf => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnOp::Abs,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::TheSumOf => {
                self.advance();
                let left = self.parse_primary()?;
                self.expect(TokenKind::And)?;
                let right = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Binary {
                        op: BinOp::Add,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    pos,
                ))
            }
            TokenKind::AddressOf => {
                self.advance();
                let operand = self.parse_primary()?;
                Ok(Expr::new(ExprKind::AddressOf(Box::new(operand)), pos))
            }
            TokenKind::ValueAt => {
                self.advance();
                let operand = self.parse_primary()?;
                self.consume(TokenKind::PointsTo);
                Ok(Expr::new(ExprKind::Deref(Box::new(operand)), pos))
            }
            TokenKind::ResultOf => {
                self.advance();
                if let Some((consumed, name)) = self.match_fn_phrase() {
                    for _ in 0..consumed {
                        self.advance();
                    }
                    let args = self.parse_call_args()?;
                    Ok(Expr::new(
                        ExprKind::Call {
                            name,
                            args,
                            res: CallKind::Unresolved,
                        },
                        pos,
                    ))
                } else {
                    self.parse_unknown_call()
                }
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.check(TokenKind::ApostropheS) {
            let pos = self.advance().pos;
            let field = self.expect_ident()?.text;
            expr = Expr::new(
                ExprKind::Member {
                    object: Box::new(expr),
                    field,
                },
                pos,
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        match self.current_kind() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::int(value, pos))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(value), pos))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(value), pos))
            }
            TokenKind::CharLit(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::CharLit(value), pos))
            }
            TokenKind::Yes => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            TokenKind::No => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, pos))
            }
            TokenKind::FirstItemIn => {
                self.advance();
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(Expr::int(0, pos)),
                    },
                    pos,
                ))
            }
            TokenKind::LastItemIn => {
                self.advance();
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(Expr::int(-1, pos)),
                    },
                    pos,
                ))
            }
            TokenKind::ItemNumber => {
                self.advance();
                let index = self.parse_expression()?;
                while matches!(self.current().kind, TokenKind::In | TokenKind::Of) {
                    self.advance();
                }
                let array = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::Index {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                    pos,
                ))
            }
            TokenKind::LengthOf => {
                self.advance();
                self.consume(TokenKind::The);
                let array = self.parse_primary()?;
                Ok(Expr::new(ExprKind::Length(Box::new(array)), pos))
            }
            TokenKind::Allocate => {
                self.advance();
                let count = self.parse_expression()?;
                let ty = self.parse_type()?;
                Ok(Expr::new(
                    ExprKind::Allocate {
                        count: Box::new(count),
                        ty,
                    },
                    pos,
                ))
            }
            TokenKind::RandomNumber => {
                self.advance();
                let min = self.parse_expression()?;
                self.expect(TokenKind::And)?;
                let max = self.parse_expression()?;
                Ok(Expr::new(
                    ExprKind::Random {
                        min: Box::new(min),
                        max: Box::new(max),
                    },
                    pos,
                ))
            }
            TokenKind::AnotherLineIn => {
                self.advance();
                let file = self.parse_primary()?;
                Ok(Expr::new(ExprKind::HasLine(Box::new(file)), pos))
            }
            TokenKind::ReadLineFrom => {
                self.advance();
                let file = self.parse_primary()?;
                self.consume(TokenKind::Into);
                let target = self.parse_primary()?;
                Ok(Expr::new(
                    ExprKind::ReadLine {
                        file: Box::new(file),
                        target: Box::new(target),
                    },
                    pos,
                ))
            }
            TokenKind::FailedToOpen => {
                self.advance();
                let file = if self.check(TokenKind::Ident) {
                    Some(Box::new(self.parse_primary()?))
                } else {
                    None
                };
                Ok(Expr::new(ExprKind::OpenFailed(file), pos))
            }
            TokenKind::WindowShouldClose => {
                self.advance();
                Ok(Expr::new(ExprKind::Gfx(GfxExpr::WindowShouldClose), pos))
            }
            TokenKind::MouseX => {
                self.advance();
                Ok(Expr::new(ExprKind::Gfx(GfxExpr::MouseX), pos))
            }
            TokenKind::MouseY => {
                self.advance();
                Ok(Expr::new(ExprKind::Gfx(GfxExpr::MouseY), pos))
            }
            TokenKind::MousePressed => {
                self.advance();
                Ok(Expr::new(ExprKind::Gfx(GfxExpr::MousePressed), pos))
            }
            TokenKind::The | TokenKind::A | TokenKind::An | TokenKind::TheValueOf => {
                self.advance();
                self.parse_primary()
            }
            TokenKind::ResultOf => self.parse_unary(),
            TokenKind::Ident => {
                let tok = self.advance();
                Ok(Expr::new(
                    ExprKind::Ident {
                        name: tok.text,
                        res: NameKind::Unresolved,
                    },
                    pos,
                ))
            }
            _ => Err(self.err_expected("an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> Program {
        let tokens = lex(source).unwrap();
        parse(source, tokens).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn parse_main(body: &str) -> Vec<Stmt> {
        let source = format!("to do the main thing:\n{}\nend\n", body);
        let program = parse_source(&source);
        program.functions.into_iter().find(|f| f.is_main).unwrap().body
    }

    fn parse_expr(expr: &str) -> Expr {
        let stmts = parse_main(&format!("say {}", expr));
        match &stmts[0].kind {
            StmtKind::Print { parts } => parts[0].clone(),
            other => panic!("expected print, got {:?}", other),
        }
    }

    #[test]
    fn test_hello_world() {
        let stmts = parse_main("say \"Hello, World!\"");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::Print { parts } => {
                assert!(matches!(&parts[0].kind, ExprKind::Str(s) if s == "Hello, World!"));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        // 2 plus 3 times 4 => 2 + (3 * 4)
        let expr = parse_expr("2 plus 3 times 4");
        match expr.kind {
            ExprKind::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary { op: BinOp::Mul, .. }
                ));
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_equal_precedence_is_left_to_right() {
        // temp minus 32 times 5 divided by 9 => temp - ((32 * 5) / 9)
        let expr = parse_expr("temp minus 32 times 5 divided by 9");
        match expr.kind {
            ExprKind::Binary { op: BinOp::Sub, left, right } => {
                assert!(matches!(left.kind, ExprKind::Ident { .. }));
                match right.kind {
                    ExprKind::Binary { op: BinOp::Div, left: num, .. } => {
                        assert!(matches!(num.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
                    }
                    other => panic!("unexpected rhs: {:?}", other),
                }
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse_expr("2 to the power of 3 to the power of 2");
        match expr.kind {
            ExprKind::Binary { op: BinOp::Pow, right, .. } => {
                assert!(matches!(
                    right.kind,
                    ExprKind::Binary { op: BinOp::Pow, .. }
                ));
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_assignment_synonyms_collapse() {
        for form in [
            "set x to 5",
            "change x to 5",
            "now x is 5",
            "let x be 5",
            "make x equal to 5",
        ] {
            let stmts = parse_main(form);
            assert!(
                matches!(stmts[0].kind, StmtKind::Assign { .. }),
                "form {:?} did not parse to an assignment",
                form
            );
        }
    }

    #[test]
    fn test_var_decl_with_init() {
        let stmts = parse_main("there is a number called x which is 2 plus 3 times 4");
        match &stmts[0].kind {
            StmtKind::VarDecl { name, ty, init } => {
                assert_eq!(name, "x");
                assert_eq!(ty.as_ref().unwrap().base, BaseType::Number);
                assert!(init.is_some());
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_if_otherwise_chain() {
        let stmts = parse_main(
            "if x is greater than 10 then\nsay 1\notherwise if x is greater than 5 then\nsay 2\notherwise\nsay 3\nend",
        );
        match &stmts[0].kind {
            StmtKind::If { else_ifs, else_body, .. } => {
                assert_eq!(else_ifs.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_then_is_optional() {
        let stmts = parse_main("if x equals 0\nsay \"zero\"\nend");
        assert!(matches!(stmts[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_for_range_descending() {
        let stmts = parse_main("for each number i from 5 down to 1:\nsay i\nend");
        match &stmts[0].kind {
            StmtKind::For { var, descending, .. } => {
                assert_eq!(var, "i");
                assert!(*descending);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_repeat_keeps_times_keyword() {
        let stmts = parse_main("repeat 3 times:\nsay \"hi\"\nend");
        match &stmts[0].kind {
            StmtKind::Repeat { count, body } => {
                assert!(matches!(count.kind, ExprKind::Int(3)));
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_print_concatenation_list() {
        let stmts = parse_main("say \"x is \" and then x followed by \"!\"");
        match &stmts[0].kind {
            StmtKind::Print { parts } => assert_eq!(parts.len(), 3),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_possessive_assignment() {
        let stmts = parse_main("set bob's age to 30");
        match &stmts[0].kind {
            StmtKind::Assign { target, .. } => match &target.kind {
                ExprKind::Member { field, .. } => assert_eq!(field, "age"),
                other => panic!("unexpected target: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_raw_c_passthrough() {
        let stmts = parse_main("printf(\"raw %d\\n\", 42);");
        match &stmts[0].kind {
            StmtKind::RawC(text) => assert_eq!(text, "printf(\"raw %d\\n\", 42);"),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_raw_c_declaration() {
        let stmts = parse_main("int y = 5;");
        assert!(matches!(&stmts[0].kind, StmtKind::RawC(text) if text == "int y = 5;"));
    }

    #[test]
    fn test_unknown_phrase_falls_through_as_raw_c() {
        let stmts = parse_main("frobnicate the widget");
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::RawC(text) if text == "frobnicate the widget"
        ));
    }

    #[test]
    fn test_forward_reference_call() {
        let source = "\
to do the main thing:
    say the result of double it with 4
end

to double it with a number called n and return a number:
    return n times 2
end
";
        let program = parse_source(source);
        let main = program.functions.iter().find(|f| f.is_main).unwrap();
        match &main.body[0].kind {
            StmtKind::Print { parts } => match &parts[0].kind {
                ExprKind::Call { name, args, .. } => {
                    assert_eq!(name, "double_it");
                    assert_eq!(args.len(), 1);
                }
                other => panic!("unexpected expression: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_statement_level_call() {
        let source = "\
to greet the user:
    say \"hi\"
end

to do the main thing:
    greet the user
end
";
        let program = parse_source(source);
        let main = program.functions.iter().find(|f| f.is_main).unwrap();
        match &main.body[0].kind {
            StmtKind::Expr(expr) => {
                assert!(matches!(&expr.kind, ExprKind::Call { name, .. } if name == "greet_the_user"));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_function_signature() {
        let source = "\
to add both with a number called a and a number called b and return a number:
    return a plus b
end
";
        let program = parse_source(source);
        let func = &program.functions[0];
        assert_eq!(func.name, "add_both");
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.return_type.as_ref().unwrap().base, BaseType::Number);
    }

    #[test]
    fn test_struct_definition() {
        let source = "\
define a Person as having:
    text called name
    number called age
end
";
        let program = parse_source(source);
        assert_eq!(program.structs.len(), 1);
        let def = &program.structs[0];
        assert_eq!(def.name, "Person");
        assert_eq!(def.fields.len(), 2);
        assert_eq!(def.fields[0].name, "name");
        assert_eq!(def.fields[1].ty.base, BaseType::Number);
    }

    #[test]
    fn test_struct_init_which_has() {
        let stmts = parse_main(
            "there is a Person called alice which has name \"Alice\" and age 25",
        );
        match &stmts[0].kind {
            StmtKind::VarDecl { init, .. } => match &init.as_ref().unwrap().kind {
                ExprKind::StructInit(fields) => {
                    assert_eq!(fields.len(), 2);
                    assert_eq!(fields[0].0, "name");
                    assert_eq!(fields[1].0, "age");
                }
                other => panic!("unexpected init: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_input_type_from_phrase() {
        let stmts = parse_main("ask the user for a number and store it in x");
        match &stmts[0].kind {
            StmtKind::Input { ty, .. } => assert_eq!(*ty, InputType::Number),
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_allocation_declares_pointer() {
        let stmts = parse_main("allocate space for 10 numbers and call it p");
        match &stmts[0].kind {
            StmtKind::VarDecl { name, ty, init } => {
                assert_eq!(name, "p");
                assert!(ty.as_ref().unwrap().is_pointer);
                assert!(matches!(
                    init.as_ref().unwrap().kind,
                    ExprKind::Allocate { .. }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_break_and_continue() {
        let stmts = parse_main("while yes:\nstop the loop\nskip to the next one\nend");
        match &stmts[0].kind {
            StmtKind::While { body, .. } => {
                assert!(matches!(body[0].kind, StmtKind::Break));
                assert!(matches!(body[1].kind, StmtKind::Continue));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_include_directives() {
        let source = "include the standard input and output\nuse the standard math functions\ninclude the file called \"helpers\"\n";
        let program = parse_source(source);
        assert_eq!(program.includes.len(), 3);
        assert_eq!(program.includes[0].library, Library::Io);
        assert_eq!(program.includes[1].library, Library::Math);
        assert_eq!(program.includes[2].library, Library::User("helpers".into()));
    }

    #[test]
    fn test_is_between_desugars() {
        let stmts = parse_main("if x is between 1 and 10 then\nsay 1\nend");
        match &stmts[0].kind {
            StmtKind::If { condition, .. } => {
                assert!(matches!(
                    condition.kind,
                    ExprKind::Binary { op: BinOp::And, .. }
                ));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_semicolons_are_tolerated() {
        let stmts = parse_main("say 1;\nreturn 0;");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[1].kind, StmtKind::Return { .. }));
    }

    #[test]
    fn test_top_level_error() {
        let tokens = lex("say 1\n").unwrap();
        let err = parse("say 1\n", tokens).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_positions_propagate() {
        let source = "to do the main thing:\n    say 1\nend\n";
        let program = parse_source(source);
        let main = &program.functions[0];
        assert_eq!(main.pos.line, 1);
        assert_eq!(main.body[0].pos.line, 2);
    }
}
