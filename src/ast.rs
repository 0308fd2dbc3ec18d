//! Abstract Syntax Tree for Zinc
//!
//! The AST is built once by the parser and annotated in place by the
//! resolver (the `res` slots on names and calls). Every node carries the
//! position of its first token. The five surface assignment forms, the
//! four output verbs, and the break/continue synonyms all collapse to
//! single node kinds here; the surface spelling is not preserved.

use crate::span::Position;

/// A complete Zinc program (compilation unit)
#[derive(Debug, Clone)]
pub struct Program {
    pub includes: Vec<Include>,
    pub structs: Vec<StructDef>,
    pub functions: Vec<FnDef>,
}

/// Include directive
#[derive(Debug, Clone)]
pub struct Include {
    pub library: Library,
    pub pos: Position,
}

/// Target of an include directive (fixed mapping, see the C lowering)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Library {
    /// `the standard input and output`
    Io,
    /// `the standard math functions`
    Math,
    /// `the string functions`
    Strings,
    /// `the file functions`
    Files,
    /// `the random functions`
    Random,
    /// `the graphics library`
    Graphics,
    /// `the file called "X"`
    User(String),
}

/// Structure definition
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub pos: Position,
}

/// Structure field
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeSpec,
    pub pos: Position,
}

/// Function definition. Multi-word Zinc names are already collapsed to
/// snake case (`compute the area` -> `compute_the_area`).
#[derive(Debug, Clone)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeSpec>,
    pub body: Vec<Stmt>,
    pub is_main: bool,
    pub pos: Position,
}

/// Function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
    pub pos: Position,
}

// ============ Types ============

/// A Zinc type: a base kind with at most one constructor level
/// (pointer-to or array-of) on top.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub base: BaseType,
    pub is_pointer: bool,
    pub is_array: bool,
    pub array_size: Option<usize>,
}

impl TypeSpec {
    pub fn base(base: BaseType) -> Self {
        Self {
            base,
            is_pointer: false,
            is_array: false,
            array_size: None,
        }
    }

    pub fn number() -> Self {
        Self::base(BaseType::Number)
    }
}

/// Base type kinds
#[derive(Debug, Clone, PartialEq)]
pub enum BaseType {
    /// `number` (C int)
    Number,
    /// `decimal` (C double)
    Decimal,
    /// `text` (C char*)
    Text,
    /// `letter` (C char)
    Letter,
    /// `boolean` / `yes or no` (C int)
    Boolean,
    /// `nothing` (C void)
    Nothing,
    /// `FILE*`, from file declarations
    File,
    /// User structure
    Struct(String),
}

// ============ Statements ============

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `there is a number called x which is 5`, `number x is 5`,
    /// `allocate space for N numbers and call it p`
    VarDecl {
        name: String,
        ty: Option<TypeSpec>,
        init: Option<Expr>,
    },

    /// `there is a file called f which opens E for reading`
    FileDecl {
        name: String,
        path: Option<Expr>,
        mode: FileMode,
    },

    /// `set/change/now/make/let` all collapse here
    Assign { target: Expr, value: Expr },

    /// `add E to X`, `subtract E from X`, `multiply X by E`,
    /// `divide X by E`, `increase X`, `decrease X`
    Compound {
        op: BinOp,
        target: Expr,
        value: Expr,
    },

    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_ifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },

    While { condition: Expr, body: Vec<Stmt> },

    /// `for each number i from A to B` (inclusive, ascending or
    /// descending)
    For {
        var: String,
        start: Expr,
        end: Expr,
        descending: bool,
        body: Vec<Stmt>,
    },

    /// `for each item in the list`
    ForEach {
        var: String,
        ty: Option<TypeSpec>,
        iterable: Expr,
        body: Vec<Stmt>,
    },

    /// `repeat N times`
    Repeat { count: Expr, body: Vec<Stmt> },

    Return { value: Option<Expr> },
    Break,
    Continue,

    /// `say`/`print`/`show`/`display` with a concatenation list
    Print { parts: Vec<Expr> },

    /// `ask the user for … and store it in X`
    Input { target: Expr, ty: InputType },

    /// `free the memory at p`
    Free { pointer: Expr },

    /// `close the file f`
    CloseFile { file: Expr },

    /// Graphics builtins (raylib family)
    Graphics(GfxStmt),

    /// Raw C fragment emitted verbatim by the C lowering
    RawC(String),

    /// Bare expression (typically a call)
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Number,
    Decimal,
    Text,
    Letter,
}

/// Graphics statement family
#[derive(Debug, Clone)]
pub enum GfxStmt {
    OpenWindow {
        width: Expr,
        height: Expr,
        title: Option<Expr>,
    },
    CloseWindow,
    BeginDrawing,
    EndDrawing,
    ClearScreen { color: String },
    DrawRectangle {
        x: Expr,
        y: Expr,
        width: Expr,
        height: Expr,
        color: String,
    },
    DrawText {
        text: Expr,
        x: Expr,
        y: Expr,
        size: Expr,
        color: String,
    },
}

// ============ Expressions ============

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    CharLit(char),
    Bool(bool),
    Null,

    /// Variable reference; `res` is filled in by the resolver
    Ident { name: String, res: NameKind },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary { op: UnOp, operand: Box<Expr> },

    /// Function call (name already snake-cased); `res` is filled in by
    /// the resolver
    Call {
        name: String,
        args: Vec<Expr>,
        res: CallKind,
    },

    /// `item number N in X`; an index of literal -1 means the last item
    Index { array: Box<Expr>, index: Box<Expr> },

    /// `bob's age`
    Member { object: Box<Expr>, field: String },

    /// `the address of x`
    AddressOf(Box<Expr>),

    /// `the value at p`
    Deref(Box<Expr>),

    /// `containing 1, 2, 3`
    ArrayLit(Vec<Expr>),

    /// `which has name "Alice" and age 25`
    StructInit(Vec<(String, Expr)>),

    /// `allocate space for N numbers`
    Allocate { count: Box<Expr>, ty: TypeSpec },

    /// `a random number between A and B`
    Random { min: Box<Expr>, max: Box<Expr> },

    /// `the length of X`
    Length(Box<Expr>),

    /// `there is another line in f`
    HasLine(Box<Expr>),

    /// `read a line from f into s`
    ReadLine { file: Box<Expr>, target: Box<Expr> },

    /// `failed to open [f]`; without an operand it refers to the most
    /// recently declared file
    OpenFailed(Option<Box<Expr>>),

    /// `X contains Y` (substring test)
    StrContains {
        haystack: Box<Expr>,
        needle: Box<Expr>,
    },

    /// Graphics query expressions
    Gfx(GfxExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfxExpr {
    WindowShouldClose,
    MouseX,
    MouseY,
    MousePressed,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// The C spelling of this operator
    pub fn c_symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**", // never emitted directly; lowered to pow()
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Sqrt,
    Abs,
}

// ============ Resolution annotations ============

/// What a variable reference resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Not yet visited by the resolver
    Unresolved,
    Local,
    Param,
    Global,
    /// Unknown name, emitted verbatim by the C lowering
    Passthrough,
}

/// What a call site resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unresolved,
    Function,
    Passthrough,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    pub fn int(value: i64, pos: Position) -> Self {
        Self::new(ExprKind::Int(value), pos)
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}
