//! Lexer for the Zinc language
//!
//! Lexing happens in two passes. A `logos` scanner does the primary split
//! into literals, words, newlines and punctuation (comments are dropped
//! here). A folding pass then collapses multi-word keyword phrases into
//! single tokens by greedy longest match and erases `note:` / `notes:`
//! comment forms. Folding only ever looks at runs of consecutive word
//! tokens, so a phrase can never cross a literal, newline or punctuation
//! boundary.

use crate::span::{LineIndex, Position, Span};
use crate::token::{Token, TokenKind};
use logos::Logos;
use thiserror::Error;

/// Lexer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unterminated string literal at {pos}")]
    UnterminatedString { pos: Position },

    #[error("unterminated character literal at {pos}")]
    UnterminatedChar { pos: Position },

    #[error("stray backslash at {pos}")]
    StrayBackslash { pos: Position },

    #[error("invalid escape sequence '\\{found}' at {pos}")]
    InvalidEscape { found: char, pos: Position },

    #[error("integer literal out of range at {pos}")]
    InvalidNumber { pos: Position },

    #[error("unexpected character at {pos}")]
    UnexpectedChar { pos: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString { pos }
            | LexError::UnterminatedChar { pos }
            | LexError::StrayBackslash { pos }
            | LexError::InvalidEscape { pos, .. }
            | LexError::InvalidNumber { pos }
            | LexError::UnexpectedChar { pos } => *pos,
        }
    }
}

/// Raw token classes produced by the primary scan
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
enum RawToken {
    #[regex(r"[0-9]+\.[0-9]+")]
    Float,

    #[regex(r"[0-9]+")]
    Int,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Str,

    /// Possessive marker; `'s'` still lexes as a character literal because
    /// the longer match wins.
    #[token("'s")]
    ApostropheS,

    #[regex(r"'([^'\\\n]|\\.)'")]
    CharLit,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Word,

    #[token("\n")]
    Newline,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    /// Any other glyph. Kept as a token (not an error) because the raw-C
    /// fallback needs to see it at statement position. Lowest priority
    /// so every dedicated single-glyph pattern wins the tie.
    #[regex(r"[^ \t\r\f\na-zA-Z0-9_]", priority = 0)]
    Punct,
}

/// Multi-word keyword phrases, ordered longest-first so that the greedy
/// match always prefers the longer phrase (`is not equal to` over
/// `is not`).
static PHRASES: &[(&[&str], TokenKind)] = &[
    (&["ask", "the", "user", "for", "a", "number", "and", "store", "it", "in"], TokenKind::AskUserFor),
    (&["ask", "the", "user", "for", "a", "decimal", "and", "store", "it", "in"], TokenKind::AskUserFor),
    (&["ask", "the", "user", "for", "a", "letter", "and", "store", "it", "in"], TokenKind::AskUserFor),
    (&["ask", "the", "user", "for", "text", "and", "store", "it", "in"], TokenKind::AskUserFor),
    (&["it", "is", "not", "the", "case", "that"], TokenKind::Not),
    (&["get", "input", "from", "the", "user", "as"], TokenKind::GetInput),
    (&["there", "is", "a", "file", "called"], TokenKind::ThereIs),
    (&["there", "is", "another", "line", "in"], TokenKind::AnotherLineIn),
    (&["continue", "with", "the", "next", "iteration"], TokenKind::Continue),
    (&["the", "standard", "input", "and", "output"], TokenKind::StandardIo),
    (&["how", "many", "items", "are", "in"], TokenKind::LengthOf),
    (&["skip", "to", "the", "next", "one"], TokenKind::Continue),
    (&["the", "standard", "math", "functions"], TokenKind::StandardMath),
    (&["the", "absolute", "value", "of"], TokenKind::AbsoluteValueOf),
    (&["the", "square", "root", "of"], TokenKind::SquareRootOf),
    (&["to", "the", "power", "of"], TokenKind::ToThePowerOf),
    (&["keep", "doing", "this", "while"], TokenKind::While),
    (&["read", "a", "number", "into"], TokenKind::Read),
    (&["a", "random", "number", "between"], TokenKind::RandomNumber),
    (&["the", "mouse", "was", "clicked"], TokenKind::MousePressed),
    (&["the", "mouse", "x", "position"], TokenKind::MouseX),
    (&["the", "mouse", "y", "position"], TokenKind::MouseY),
    (&["open", "a", "window", "sized"], TokenKind::OpenWindow),
    (&["the", "window", "should", "close"], TokenKind::WindowShouldClose),
    (&["clear", "the", "screen", "with"], TokenKind::ClearScreen),
    (&["draw", "a", "rectangle", "at"], TokenKind::DrawRectangle),
    (&["do", "the", "main", "thing"], TokenKind::DoMain),
    (&["free", "the", "memory", "at"], TokenKind::Free),
    (&["is", "the", "same", "as"], TokenKind::Equals),
    (&["is", "not", "equal", "to"], TokenKind::NotEqualTo),
    (&["the", "first", "item", "in"], TokenKind::FirstItemIn),
    (&["the", "last", "item", "in"], TokenKind::LastItemIn),
    (&["the", "character", "at", "position"], TokenKind::ItemNumber),
    (&["read", "a", "line", "from"], TokenKind::ReadLineFrom),
    (&["print", "the", "value", "of"], TokenKind::Say),
    (&["there", "is", "a"], TokenKind::ThereIs),
    (&["there", "is", "an"], TokenKind::ThereIs),
    (&["stop", "the", "program"], TokenKind::StopProgram),
    (&["stop", "the", "loop"], TokenKind::Break),
    (&["leave", "the", "loop"], TokenKind::Break),
    (&["close", "the", "window"], TokenKind::CloseWindow),
    (&["window", "should", "close"], TokenKind::WindowShouldClose),
    (&["clear", "screen", "with"], TokenKind::ClearScreen),
    (&["draw", "rectangle", "at"], TokenKind::DrawRectangle),
    (&["open", "window", "sized"], TokenKind::OpenWindow),
    (&["mouse", "is", "pressed"], TokenKind::MousePressed),
    (&["mouse", "was", "pressed"], TokenKind::MousePressed),
    (&["the", "graphics", "library"], TokenKind::GraphicsLibrary),
    (&["the", "string", "functions"], TokenKind::StringFunctions),
    (&["the", "file", "functions"], TokenKind::FileFunctions),
    (&["the", "random", "functions"], TokenKind::RandomFunctions),
    (&["the", "file", "called"], TokenKind::FileCalled),
    (&["the", "result", "of"], TokenKind::ResultOf),
    (&["the", "value", "of"], TokenKind::TheValueOf),
    (&["the", "value", "at"], TokenKind::ValueAt),
    (&["the", "value", "that"], TokenKind::ValueAt),
    (&["the", "address", "of"], TokenKind::AddressOf),
    (&["allocate", "space", "for"], TokenKind::Allocate),
    (&["and", "call", "it"], TokenKind::Called),
    (&["is", "greater", "than"], TokenKind::GreaterThan),
    (&["is", "less", "than"], TokenKind::LessThan),
    (&["not", "equal", "to"], TokenKind::NotEqualTo),
    (&["is", "at", "least"], TokenKind::AtLeast),
    (&["is", "at", "most"], TokenKind::AtMost),
    (&["make", "equal", "to"], TokenKind::EqualTo),
    (&["first", "item", "in"], TokenKind::FirstItemIn),
    (&["last", "item", "in"], TokenKind::LastItemIn),
    (&["the", "length", "of"], TokenKind::LengthOf),
    (&["the", "size", "of"], TokenKind::LengthOf),
    (&["close", "the", "file"], TokenKind::CloseFile),
    (&["failed", "to", "open"], TokenKind::FailedToOpen),
    (&["the", "sum", "of"], TokenKind::TheSumOf),
    (&["read", "text", "into"], TokenKind::Read),
    (&["yes", "or", "no"], TokenKind::Boolean),
    (&["raylib", "graphics"], TokenKind::GraphicsLibrary),
    (&["begin", "drawing"], TokenKind::BeginDrawing),
    (&["start", "drawing"], TokenKind::BeginDrawing),
    (&["end", "drawing"], TokenKind::EndDrawing),
    (&["stop", "drawing"], TokenKind::EndDrawing),
    (&["draw", "text"], TokenKind::DrawText),
    (&["mouse", "x"], TokenKind::MouseX),
    (&["mouse", "y"], TokenKind::MouseY),
    (&["points", "to"], TokenKind::PointsTo),
    (&["pointer", "to"], TokenKind::PointerTo),
    (&["list", "of"], TokenKind::ListOf),
    (&["is", "between"], TokenKind::Between),
    (&["is", "positive"], TokenKind::IsPositive),
    (&["is", "negative"], TokenKind::IsNegative),
    (&["is", "zero"], TokenKind::IsZero),
    (&["is", "even"], TokenKind::IsEven),
    (&["is", "odd"], TokenKind::IsOdd),
    (&["is", "empty"], TokenKind::IsEmpty),
    (&["is", "not"], TokenKind::NotEqualTo),
    (&["divided", "by"], TokenKind::DividedBy),
    (&["and", "then"], TokenKind::AndThen),
    (&["followed", "by"], TokenKind::FollowedBy),
    (&["down", "to"], TokenKind::DownTo),
    (&["for", "each"], TokenKind::ForEach),
    (&["there", "is"], TokenKind::ThereIs),
    (&["which", "is"], TokenKind::WhichIs),
    (&["which", "has"], TokenKind::WhichHas),
    (&["which", "opens"], TokenKind::Opens),
    (&["equal", "to"], TokenKind::EqualTo),
    (&["item", "number"], TokenKind::ItemNumber),
    (&["length", "of"], TokenKind::LengthOf),
    (&["as", "having"], TokenKind::AsHaving),
    (&["and", "return"], TokenKind::AndReturn),
    (&["for", "reading"], TokenKind::ForReading),
    (&["for", "writing"], TokenKind::ForWriting),
];

/// Single-word keywords (lookup is on the lowercased word)
fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "include" | "use" => TokenKind::Include,
        "let" => TokenKind::Let,
        "be" => TokenKind::Be,
        "called" => TokenKind::Called,
        "is" => TokenKind::Is,
        "number" | "numbers" => TokenKind::Number,
        "decimal" | "decimals" => TokenKind::Decimal,
        "text" => TokenKind::Text,
        "letter" | "letters" => TokenKind::Letter,
        "boolean" => TokenKind::Boolean,
        "nothing" => TokenKind::Nothing,
        "yes" => TokenKind::Yes,
        "no" => TokenKind::No,
        "null" => TokenKind::Null,
        "change" => TokenKind::Change,
        "set" => TokenKind::Set,
        "now" => TokenKind::Now,
        "make" => TokenKind::Make,
        "to" => TokenKind::To,
        "add" => TokenKind::Add,
        "subtract" => TokenKind::Subtract,
        "multiply" => TokenKind::Multiply,
        "divide" => TokenKind::Divide,
        "increase" => TokenKind::Increase,
        "decrease" => TokenKind::Decrease,
        "by" => TokenKind::By,
        "plus" => TokenKind::Plus,
        "minus" => TokenKind::Minus,
        "times" => TokenKind::Times,
        "modulo" => TokenKind::Modulo,
        "negative" => TokenKind::Negative,
        "equals" => TokenKind::Equals,
        "contains" => TokenKind::Contains,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "otherwise" => TokenKind::Otherwise,
        "end" => TokenKind::End,
        "repeat" => TokenKind::Repeat,
        "while" => TokenKind::While,
        "from" => TokenKind::From,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "say" | "print" | "show" | "display" => TokenKind::Say,
        "containing" => TokenKind::Containing,
        "define" => TokenKind::Define,
        "has" => TokenKind::WhichHas,
        "with" => TokenKind::With,
        "into" => TokenKind::Into,
        "opens" => TokenKind::Opens,
        "a" => TokenKind::A,
        "an" => TokenKind::An,
        "the" => TokenKind::The,
        "of" => TokenKind::Of,
        _ => return None,
    };
    Some(kind)
}

/// A word from the raw scan, with its lowercased copy for keyword lookup
struct RawWord<'src> {
    text: &'src str,
    lower: String,
    span: Span,
}

/// The Zinc lexer
pub struct Lexer<'src> {
    source: &'src str,
    line_index: LineIndex,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            line_index: LineIndex::new(source),
        }
    }

    fn pos(&self, offset: usize) -> Position {
        self.line_index.position(offset)
    }

    /// Tokenize the whole source, folding phrases and erasing comments.
    pub fn tokenize(&self) -> Result<Vec<Token>, LexError> {
        let raw: Vec<(Result<RawToken, ()>, Span)> = RawToken::lexer(self.source)
            .spanned()
            .map(|(res, range)| (res, Span::new(range.start, range.end)))
            .collect();

        let mut tokens = Vec::new();
        let mut i = 0;

        while i < raw.len() {
            let (ref res, span) = raw[i];
            let pos = self.pos(span.start);
            let kind = match res {
                Ok(kind) => *kind,
                Err(()) => return Err(LexError::UnexpectedChar { pos }),
            };

            match kind {
                RawToken::Word => {
                    let lower = span.text(self.source).to_ascii_lowercase();
                    // Comment forms are word-introduced, so the raw
                    // scanner cannot drop them; erase them here.
                    if matches!(lower.as_str(), "note" | "reminder")
                        && self.raw_kind(&raw, i + 1) == Some(RawToken::Colon)
                    {
                        i = self.skip_line_comment(&raw, i + 2);
                        continue;
                    }
                    if lower == "notes" && self.raw_kind(&raw, i + 1) == Some(RawToken::Colon) {
                        i = self.skip_block_comment(&raw, i + 2);
                        continue;
                    }

                    let mut words = Vec::new();
                    while i < raw.len() {
                        match raw[i] {
                            (Ok(RawToken::Word), word_span) => {
                                let text = word_span.text(self.source);
                                words.push(RawWord {
                                    text,
                                    lower: text.to_ascii_lowercase(),
                                    span: word_span,
                                });
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    self.fold_words(&words, &mut tokens);
                }
                RawToken::Int => {
                    let text = span.text(self.source);
                    let value: i64 = text
                        .parse()
                        .map_err(|_| LexError::InvalidNumber { pos })?;
                    tokens.push(Token::new(TokenKind::Int(value), text, span, pos));
                    i += 1;
                }
                RawToken::Float => {
                    let text = span.text(self.source);
                    let value: f64 = text
                        .parse()
                        .map_err(|_| LexError::InvalidNumber { pos })?;
                    tokens.push(Token::new(TokenKind::Float(value), text, span, pos));
                    i += 1;
                }
                RawToken::Str => {
                    let text = span.text(self.source);
                    let inner = &text[1..text.len() - 1];
                    let value = unescape(inner, pos)?;
                    tokens.push(Token::new(TokenKind::Str(value), text, span, pos));
                    i += 1;
                }
                RawToken::CharLit => {
                    let text = span.text(self.source);
                    let inner = &text[1..text.len() - 1];
                    let value = unescape(inner, pos)?;
                    let c = value.chars().next().unwrap_or('\0');
                    tokens.push(Token::new(TokenKind::CharLit(c), text, span, pos));
                    i += 1;
                }
                RawToken::ApostropheS => {
                    tokens.push(Token::new(TokenKind::ApostropheS, "'s", span, pos));
                    i += 1;
                }
                RawToken::Newline => {
                    tokens.push(Token::new(TokenKind::Newline, "\n", span, pos));
                    i += 1;
                }
                RawToken::Colon => {
                    tokens.push(Token::new(TokenKind::Colon, ":", span, pos));
                    i += 1;
                }
                RawToken::Comma => {
                    tokens.push(Token::new(TokenKind::Comma, ",", span, pos));
                    i += 1;
                }
                RawToken::Punct => {
                    let text = span.text(self.source);
                    let c = text.chars().next().unwrap_or('\0');
                    match c {
                        '"' => return Err(LexError::UnterminatedString { pos }),
                        '\'' => return Err(LexError::UnterminatedChar { pos }),
                        '\\' => return Err(LexError::StrayBackslash { pos }),
                        _ => tokens.push(Token::new(TokenKind::Punct(c), text, span, pos)),
                    }
                    i += 1;
                }
            }
        }

        let end = self.source.len();
        tokens.push(Token::new(
            TokenKind::Eof,
            "",
            Span::new(end, end),
            self.pos(end),
        ));
        Ok(tokens)
    }

    fn raw_kind(&self, raw: &[(Result<RawToken, ()>, Span)], idx: usize) -> Option<RawToken> {
        raw.get(idx).and_then(|(res, _)| res.clone().ok())
    }

    /// Skip to (but not past) the next newline.
    fn skip_line_comment(&self, raw: &[(Result<RawToken, ()>, Span)], mut i: usize) -> usize {
        while i < raw.len() && self.raw_kind(raw, i) != Some(RawToken::Newline) {
            i += 1;
        }
        i
    }

    /// Skip a `notes: ... end notes` block, consuming the closing words.
    fn skip_block_comment(&self, raw: &[(Result<RawToken, ()>, Span)], mut i: usize) -> usize {
        while i < raw.len() {
            if self.raw_kind(raw, i) == Some(RawToken::Word)
                && raw[i].1.text(self.source).eq_ignore_ascii_case("end")
                && self.raw_kind(raw, i + 1) == Some(RawToken::Word)
                && raw[i + 1].1.text(self.source).eq_ignore_ascii_case("notes")
            {
                return i + 2;
            }
            i += 1;
        }
        i
    }

    /// Fold a run of consecutive words into keyword-phrase, keyword and
    /// identifier tokens.
    fn fold_words(&self, words: &[RawWord<'src>], tokens: &mut Vec<Token>) {
        let mut k = 0;
        while k < words.len() {
            if let Some((kind, len)) = match_phrase(&words[k..]) {
                let text = words[k..k + len]
                    .iter()
                    .map(|w| w.text)
                    .collect::<Vec<_>>()
                    .join(" ");
                let span = words[k].span.merge(words[k + len - 1].span);
                tokens.push(Token::new(kind, text, span, self.pos(span.start)));
                k += len;
                continue;
            }

            let word = &words[k];
            let kind = keyword(&word.lower).unwrap_or(TokenKind::Ident);
            tokens.push(Token::new(
                kind,
                word.text,
                word.span,
                self.pos(word.span.start),
            ));
            k += 1;
        }
    }
}

/// Longest phrase matching at the head of `words`, if any.
fn match_phrase(words: &[RawWord]) -> Option<(TokenKind, usize)> {
    for (phrase, kind) in PHRASES {
        if phrase.len() <= words.len()
            && phrase.iter().zip(words).all(|(p, w)| *p == w.lower)
        {
            return Some((kind.clone(), phrase.len()));
        }
    }
    None
}

fn unescape(raw: &str, pos: Position) -> Result<String, LexError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some('\\') => out.push('\\'),
                Some(other) => return Err(LexError::InvalidEscape { found: other, pos }),
                None => return Err(LexError::StrayBackslash { pos }),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Helper function to lex source code
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_hello_world() {
        assert_eq!(
            kinds("say \"Hello, World!\""),
            vec![
                TokenKind::Say,
                TokenKind::Str("Hello, World!".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(kinds("Say"), kinds("say"));
        assert_eq!(kinds("IF X IS GREATER THAN 3 THEN"), kinds("if x is greater than 3 then"));
    }

    #[test]
    fn test_identifier_text_preserved() {
        let tokens = lex("say CamelCase").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[1].text, "CamelCase");
    }

    #[test]
    fn test_phrase_folding() {
        assert_eq!(
            kinds("x is greater than 3"),
            vec![
                TokenKind::Ident,
                TokenKind::GreaterThan,
                TokenKind::Int(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_longest_phrase_wins() {
        assert_eq!(
            kinds("x is not equal to 3"),
            vec![
                TokenKind::Ident,
                TokenKind::NotEqualTo,
                TokenKind::Int(3),
                TokenKind::Eof
            ]
        );
        // the shorter "is not" still folds on its own
        assert_eq!(
            kinds("x is not y"),
            vec![
                TokenKind::Ident,
                TokenKind::NotEqualTo,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_phrase_table_is_longest_first() {
        let mut last = usize::MAX;
        for (phrase, _) in PHRASES {
            assert!(phrase.len() <= last, "phrase table out of order: {:?}", phrase);
            last = last.min(phrase.len());
        }
    }

    #[test]
    fn test_folding_does_not_cross_literals() {
        // "divided" alone is not an operator; the literal breaks the run
        let tokens = kinds("divided \"x\" by");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident,
                TokenKind::Str("x".into()),
                TokenKind::By,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_folding_does_not_cross_newlines() {
        let tokens = kinds("divided\nby");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::By,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keyword_inside_identifier() {
        // underscores keep this a single word, not a `plus` expression
        assert_eq!(
            kinds("user_age_plus_one"),
            vec![TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_assignment_synonyms() {
        assert_eq!(
            kinds("make x equal to 5"),
            vec![
                TokenKind::Make,
                TokenKind::Ident,
                TokenKind::EqualTo,
                TokenKind::Int(5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_possessive() {
        assert_eq!(
            kinds("bob's age"),
            vec![
                TokenKind::Ident,
                TokenKind::ApostropheS,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(
            kinds(r"'a' '\n' 's'"),
            vec![
                TokenKind::CharLit('a'),
                TokenKind::CharLit('\n'),
                TokenKind::CharLit('s'),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\n""#),
            vec![TokenKind::Str("a\tb\n".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_invalid_escape() {
        assert!(matches!(
            lex(r#""bad \q escape""#),
            Err(LexError::InvalidEscape { found: 'q', .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            lex("say \"oops"),
            Err(LexError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_comments_erased() {
        assert_eq!(
            kinds("note: nothing to see\nsay 1 // trailing\n# hash\n/* block\nstill */ say 2"),
            vec![
                TokenKind::Newline,
                TokenKind::Say,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Newline,
                TokenKind::Say,
                TokenKind::Int(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_notes_block_erased() {
        assert_eq!(
            kinds("notes: anything\nat all end notes say 3"),
            vec![TokenKind::Say, TokenKind::Int(3), TokenKind::Eof]
        );
    }

    #[test]
    fn test_punctuation_kept_for_raw_c() {
        assert_eq!(
            kinds("printf(x);"),
            vec![
                TokenKind::Ident,
                TokenKind::Punct('('),
                TokenKind::Ident,
                TokenKind::Punct(')'),
                TokenKind::Punct(';'),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_file_decl_phrase() {
        let tokens = lex("there is a file called log").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ThereIs);
        assert!(tokens[0].text.to_ascii_lowercase().contains("file"));
    }

    #[test]
    fn test_positions_non_decreasing() {
        let source = "say 1 plus 2\nsay \"x\"\n";
        let tokens = lex(source).unwrap();
        let mut last = 0;
        for token in &tokens {
            assert!(token.span.start >= last);
            last = token.span.start;
        }
    }

    #[test]
    fn test_ask_phrase_records_type() {
        let tokens = lex("ask the user for a number and store it in x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::AskUserFor);
        assert!(tokens[0].text.to_ascii_lowercase().contains("number"));
        assert_eq!(tokens[1].kind, TokenKind::Ident);
    }
}
