//! Token definitions for the Zinc language
//!
//! The keyword surface is English-like: many keywords are multi-word
//! phrases that the lexer folds into single tokens. Keyword recognition is
//! case-insensitive; identifier text is preserved verbatim. Literal kinds
//! carry their resolved values (escape sequences already processed).

use crate::span::{Position, Span};
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Original source text (for phrases: the matched words joined by
    /// single spaces)
    pub text: String,
    pub span: Span,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span, pos: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            pos,
        }
    }
}

/// All token kinds in Zinc
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Literals ============
    Int(i64),
    Float(f64),
    Str(String),
    CharLit(char),

    /// Identifier (case-sensitive, preserved in `Token::text`)
    Ident,

    // ============ Declarations ============
    /// `there is a`, `there is an`, `there is a file called`
    ThereIs,
    Let,
    Be,
    /// `called`, `and call it`
    Called,
    Is,
    /// `which is`
    WhichIs,
    /// `which has`, `has`
    WhichHas,
    Containing,

    // ============ Types ============
    Number,
    Decimal,
    Text,
    Letter,
    /// `boolean`, `yes or no`
    Boolean,
    Nothing,
    /// `pointer to`
    PointerTo,
    /// `list of`
    ListOf,

    // ============ Values ============
    Yes,
    No,
    Null,

    // ============ Assignment ============
    Change,
    Set,
    Now,
    Make,
    To,
    /// `equal to`, `make equal to`
    EqualTo,

    // ============ Compound assignment ============
    Add,
    Subtract,
    Multiply,
    Divide,
    Increase,
    Decrease,
    By,

    // ============ Arithmetic ============
    Plus,
    Minus,
    Times,
    /// `divided by`
    DividedBy,
    Modulo,
    /// `to the power of`
    ToThePowerOf,

    // ============ Math phrases ============
    /// `the square root of`
    SquareRootOf,
    /// `the absolute value of`
    AbsoluteValueOf,
    /// `the sum of`
    TheSumOf,
    Negative,

    // ============ Comparisons ============
    /// `is greater than`
    GreaterThan,
    /// `is less than`
    LessThan,
    /// `equals`, `is the same as`
    Equals,
    /// `is not equal to`, `not equal to`, `is not`
    NotEqualTo,
    /// `is at least`
    AtLeast,
    /// `is at most`
    AtMost,
    /// `is between`
    Between,
    IsPositive,
    IsNegative,
    IsZero,
    IsEven,
    IsOdd,
    IsEmpty,
    Contains,

    // ============ Logic ============
    And,
    Or,
    /// `not`, `it is not the case that`
    Not,

    // ============ Control flow ============
    If,
    Then,
    Otherwise,
    End,

    // ============ Loops ============
    Repeat,
    /// `while`, `keep doing this while`
    While,
    /// `for each`
    ForEach,
    From,
    /// `down to`
    DownTo,
    In,
    /// `stop the loop`, `leave the loop`
    Break,
    /// `skip to the next one`, `continue with the next iteration`
    Continue,

    // ============ Functions ============
    Return,
    /// `the result of`
    ResultOf,
    /// `and return`
    AndReturn,
    /// `stop the program`
    StopProgram,
    /// `do the main thing`
    DoMain,
    With,

    // ============ Output ============
    /// `say`, `print`, `show`, `display`
    Say,
    /// `and then`
    AndThen,
    /// `followed by`
    FollowedBy,
    /// `the value of`
    TheValueOf,

    // ============ Input ============
    /// `ask the user for a number/a decimal/a letter/text and store it in`
    /// (`Token::text` records which)
    AskUserFor,
    /// `read a number into`, `read text into`
    Read,
    Into,
    /// `get input from the user as`
    GetInput,

    // ============ Arrays ============
    /// `item number`, `the character at position`
    ItemNumber,
    /// `the first item in`
    FirstItemIn,
    /// `the last item in`
    LastItemIn,
    /// `the length of`, `the size of`, `how many items are in`
    LengthOf,

    // ============ Structures ============
    Define,
    /// `as having`
    AsHaving,

    // ============ Pointers and memory ============
    /// `the address of`
    AddressOf,
    /// `the value at`, `the value that`
    ValueAt,
    /// `points to`
    PointsTo,
    /// `allocate space for`
    Allocate,
    /// `free the memory at`
    Free,

    // ============ Includes ============
    /// `include`, `use`
    Include,
    /// `the standard input and output`
    StandardIo,
    /// `the standard math functions`
    StandardMath,
    /// `the string functions`
    StringFunctions,
    /// `the file functions`
    FileFunctions,
    /// `the random functions`
    RandomFunctions,
    /// `the graphics library`, `raylib graphics`
    GraphicsLibrary,
    /// `the file called`
    FileCalled,

    // ============ Files ============
    /// `which opens`, `opens`
    Opens,
    /// `for reading`
    ForReading,
    /// `for writing`
    ForWriting,
    /// `failed to open`
    FailedToOpen,
    /// `close the file`
    CloseFile,
    /// `there is another line in`
    AnotherLineIn,
    /// `read a line from`
    ReadLineFrom,

    // ============ Graphics ============
    /// `open a window sized`
    OpenWindow,
    /// `close the window`
    CloseWindow,
    /// `the window should close`
    WindowShouldClose,
    BeginDrawing,
    EndDrawing,
    /// `clear the screen with`
    ClearScreen,
    /// `draw a rectangle at`
    DrawRectangle,
    DrawText,
    MouseX,
    MouseY,
    /// `the mouse was clicked`
    MousePressed,

    // ============ Random ============
    /// `a random number between`
    RandomNumber,

    // ============ Filler words ============
    A,
    An,
    The,
    Of,

    // ============ Punctuation ============
    Newline,
    Colon,
    Comma,
    /// Possessive `'s`
    ApostropheS,
    /// Any other single glyph, kept for the raw-C fallback
    Punct(char),

    Eof,
}

impl TokenKind {
    /// Literal tokens (carry a resolved value)
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::CharLit(_)
                | TokenKind::Yes
                | TokenKind::No
                | TokenKind::Null
        )
    }

    /// Tokens that introduce a type phrase
    pub fn starts_type(&self) -> bool {
        matches!(
            self,
            TokenKind::Number
                | TokenKind::Decimal
                | TokenKind::Text
                | TokenKind::Letter
                | TokenKind::Boolean
                | TokenKind::Nothing
                | TokenKind::PointerTo
                | TokenKind::ListOf
        )
    }

    /// Word-like tokens: identifiers and keywords whose surface form is
    /// plain words. Phrase reconstruction (function names, call sites)
    /// walks runs of these.
    pub fn is_wordish(&self) -> bool {
        !matches!(
            self,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::CharLit(_)
                | TokenKind::Newline
                | TokenKind::Colon
                | TokenKind::Comma
                | TokenKind::ApostropheS
                | TokenKind::Punct(_)
                | TokenKind::Eof
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Int(_) => "integer literal",
            TokenKind::Float(_) => "decimal literal",
            TokenKind::Str(_) => "string literal",
            TokenKind::CharLit(_) => "character literal",
            TokenKind::Ident => "identifier",
            TokenKind::ThereIs => "there is",
            TokenKind::Let => "let",
            TokenKind::Be => "be",
            TokenKind::Called => "called",
            TokenKind::Is => "is",
            TokenKind::WhichIs => "which is",
            TokenKind::WhichHas => "which has",
            TokenKind::Containing => "containing",
            TokenKind::Number => "number",
            TokenKind::Decimal => "decimal",
            TokenKind::Text => "text",
            TokenKind::Letter => "letter",
            TokenKind::Boolean => "boolean",
            TokenKind::Nothing => "nothing",
            TokenKind::PointerTo => "pointer to",
            TokenKind::ListOf => "list of",
            TokenKind::Yes => "yes",
            TokenKind::No => "no",
            TokenKind::Null => "null",
            TokenKind::Change => "change",
            TokenKind::Set => "set",
            TokenKind::Now => "now",
            TokenKind::Make => "make",
            TokenKind::To => "to",
            TokenKind::EqualTo => "equal to",
            TokenKind::Add => "add",
            TokenKind::Subtract => "subtract",
            TokenKind::Multiply => "multiply",
            TokenKind::Divide => "divide",
            TokenKind::Increase => "increase",
            TokenKind::Decrease => "decrease",
            TokenKind::By => "by",
            TokenKind::Plus => "plus",
            TokenKind::Minus => "minus",
            TokenKind::Times => "times",
            TokenKind::DividedBy => "divided by",
            TokenKind::Modulo => "modulo",
            TokenKind::ToThePowerOf => "to the power of",
            TokenKind::SquareRootOf => "the square root of",
            TokenKind::AbsoluteValueOf => "the absolute value of",
            TokenKind::TheSumOf => "the sum of",
            TokenKind::Negative => "negative",
            TokenKind::GreaterThan => "is greater than",
            TokenKind::LessThan => "is less than",
            TokenKind::Equals => "equals",
            TokenKind::NotEqualTo => "is not equal to",
            TokenKind::AtLeast => "is at least",
            TokenKind::AtMost => "is at most",
            TokenKind::Between => "is between",
            TokenKind::IsPositive => "is positive",
            TokenKind::IsNegative => "is negative",
            TokenKind::IsZero => "is zero",
            TokenKind::IsEven => "is even",
            TokenKind::IsOdd => "is odd",
            TokenKind::IsEmpty => "is empty",
            TokenKind::Contains => "contains",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Otherwise => "otherwise",
            TokenKind::End => "end",
            TokenKind::Repeat => "repeat",
            TokenKind::While => "while",
            TokenKind::ForEach => "for each",
            TokenKind::From => "from",
            TokenKind::DownTo => "down to",
            TokenKind::In => "in",
            TokenKind::Break => "stop the loop",
            TokenKind::Continue => "skip to the next one",
            TokenKind::Return => "return",
            TokenKind::ResultOf => "the result of",
            TokenKind::AndReturn => "and return",
            TokenKind::StopProgram => "stop the program",
            TokenKind::DoMain => "do the main thing",
            TokenKind::With => "with",
            TokenKind::Say => "say",
            TokenKind::AndThen => "and then",
            TokenKind::FollowedBy => "followed by",
            TokenKind::TheValueOf => "the value of",
            TokenKind::AskUserFor => "ask the user for",
            TokenKind::Read => "read",
            TokenKind::Into => "into",
            TokenKind::GetInput => "get input from the user as",
            TokenKind::ItemNumber => "item number",
            TokenKind::FirstItemIn => "the first item in",
            TokenKind::LastItemIn => "the last item in",
            TokenKind::LengthOf => "the length of",
            TokenKind::Define => "define",
            TokenKind::AsHaving => "as having",
            TokenKind::AddressOf => "the address of",
            TokenKind::ValueAt => "the value at",
            TokenKind::PointsTo => "points to",
            TokenKind::Allocate => "allocate space for",
            TokenKind::Free => "free the memory at",
            TokenKind::Include => "include",
            TokenKind::StandardIo => "the standard input and output",
            TokenKind::StandardMath => "the standard math functions",
            TokenKind::StringFunctions => "the string functions",
            TokenKind::FileFunctions => "the file functions",
            TokenKind::RandomFunctions => "the random functions",
            TokenKind::GraphicsLibrary => "the graphics library",
            TokenKind::FileCalled => "the file called",
            TokenKind::Opens => "opens",
            TokenKind::ForReading => "for reading",
            TokenKind::ForWriting => "for writing",
            TokenKind::FailedToOpen => "failed to open",
            TokenKind::CloseFile => "close the file",
            TokenKind::AnotherLineIn => "there is another line in",
            TokenKind::ReadLineFrom => "read a line from",
            TokenKind::OpenWindow => "open a window sized",
            TokenKind::CloseWindow => "close the window",
            TokenKind::WindowShouldClose => "the window should close",
            TokenKind::BeginDrawing => "begin drawing",
            TokenKind::EndDrawing => "end drawing",
            TokenKind::ClearScreen => "clear the screen with",
            TokenKind::DrawRectangle => "draw a rectangle at",
            TokenKind::DrawText => "draw text",
            TokenKind::MouseX => "the mouse x position",
            TokenKind::MouseY => "the mouse y position",
            TokenKind::MousePressed => "the mouse was clicked",
            TokenKind::RandomNumber => "a random number between",
            TokenKind::A => "a",
            TokenKind::An => "an",
            TokenKind::The => "the",
            TokenKind::Of => "of",
            TokenKind::Newline => "end of line",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::ApostropheS => "'s",
            TokenKind::Punct(_) => "punctuation",
            TokenKind::Eof => "end of file",
        };
        write!(f, "{}", s)
    }
}
