use std::fmt;

use combine::{
    attempt, choice, optional,
    parser::char::{digit, space, string},
    satisfy, skip_many, skip_many1, token, Parser, Stream,
};
use log::trace;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    Function,
    Goto,
    If,
    Local,
    Nil,
    Not,
    Or,
    Print,
    Return,
    Then,
    True,

    // operators
    Add,
    Sub,
    Mul,
    Div,
    Equal,
    NotEq,
    LesEq,
    GreEq,
    Less,
    Greater,
    Assign,
    ParL,
    ParR,
    Comma,
    SemiColon,
    Dot,

    // constant values
    Number,
    String,

    // name of variables
    Name,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::And => "`and`",
            Self::Break => "`break`",
            Self::Do => "`do`",
            Self::Else => "`else`",
            Self::Elseif => "`elseif`",
            Self::End => "`end`",
            Self::False => "`false`",
            Self::Function => "`function`",
            Self::Goto => "`goto`",
            Self::If => "`if`",
            Self::Local => "`local`",
            Self::Nil => "`nil`",
            Self::Not => "`not`",
            Self::Or => "`or`",
            Self::Print => "`print`",
            Self::Return => "`return`",
            Self::Then => "`then`",
            Self::True => "`true`",
            Self::Add => "`+`",
            Self::Sub => "`-`",
            Self::Mul => "`*`",
            Self::Div => "`/`",
            Self::Equal => "`==`",
            Self::NotEq => "`~=`",
            Self::LesEq => "`<=`",
            Self::GreEq => "`>=`",
            Self::Less => "`<`",
            Self::Greater => "`>`",
            Self::Assign => "`=`",
            Self::ParL => "`(`",
            Self::ParR => "`)`",
            Self::Comma => "`,`",
            Self::SemiColon => "`;`",
            Self::Dot => "`.`",
            Self::Number => "number",
            Self::String => "string",
            Self::Name => "name",
        };
        f.write_str(s)
    }
}

/// A lexed token together with the exact text it was scanned from.
///
/// For string literals `source` holds the text between the quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub source: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("{line}:{column}: unexpected character `{ch}`")]
    UnexpectedChar { ch: char, line: u32, column: u32 },
    #[error("{line}:{column}: unterminated string")]
    UnterminatedString { line: u32, column: u32 },
}

/// Scans the whole source into a token list.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    trace!("lexing {} bytes", source.len());
    let mut lex = Lex::new(source);
    let mut tokens = Vec::new();
    while let Some(t) = lex.next()? {
        tokens.push(t);
    }
    Ok(tokens)
}

pub struct Lex<'a> {
    source: &'a str,
    rest: &'a str,
    // position of the first char of `rest`
    line: u32,
    column: u32,
}

impl<'a> Lex<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            rest: source,
            line: 1,
            column: 1,
        }
    }

    /// Returns the next token, or `None` once the input is exhausted.
    pub fn next(&mut self) -> Result<Option<Token>, LexError> {
        if let Ok(((), rest)) = blank().parse(self.rest) {
            self.skip_to(rest);
        }
        if self.rest.is_empty() {
            return Ok(None);
        }

        let start = self.offset();
        let (line, column) = (self.line, self.column);
        let (kind, rest) = match lua_token().parse(self.rest) {
            Ok(ok) => ok,
            Err(_) if self.rest.starts_with('"') => {
                return Err(LexError::UnterminatedString { line, column })
            }
            Err(_) => {
                let ch = self.rest.chars().next().unwrap_or('\0');
                return Err(LexError::UnexpectedChar { ch, line, column });
            }
        };
        self.skip_to(rest);

        let text = &self.source[start..self.offset()];
        let (kind, text) = match kind {
            TokenKind::Name => (keyword(text).unwrap_or(TokenKind::Name), text),
            TokenKind::String => (kind, &text[1..text.len() - 1]),
            _ => (kind, text),
        };
        Ok(Some(Token {
            kind,
            source: text.to_string(),
            line,
            column,
        }))
    }

    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    // moves past the text a parser consumed, counting lines and columns
    fn skip_to(&mut self, rest: &'a str) {
        let consumed = &self.rest[..self.rest.len() - rest.len()];
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.rest = rest;
    }
}

fn keyword(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "and" => TokenKind::And,
        "break" => TokenKind::Break,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "elseif" => TokenKind::Elseif,
        "end" => TokenKind::End,
        "false" => TokenKind::False,
        "function" => TokenKind::Function,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "local" => TokenKind::Local,
        "nil" => TokenKind::Nil,
        "not" => TokenKind::Not,
        "or" => TokenKind::Or,
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "then" => TokenKind::Then,
        "true" => TokenKind::True,
        _ => return None,
    };
    Some(kind)
}

// whitespace and `--` line comments
fn blank<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
{
    let comment =
        attempt((token('-'), token('-'))).with(skip_many(satisfy(|c: char| c != '\n')));
    skip_many(space().map(|_| ()).or(comment))
}

fn lua_token<Input>() -> impl Parser<Input, Output = TokenKind>
where
    Input: Stream<Token = char>,
{
    let name = (
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        skip_many(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    )
        .map(|_| TokenKind::Name);
    let number = (
        skip_many1(digit()),
        optional(attempt((token('.'), skip_many1(digit())))),
    )
        .map(|_| TokenKind::Number);
    let string = (
        token('"'),
        skip_many(satisfy(|c: char| c != '"')),
        token('"'),
    )
        .map(|_| TokenKind::String);
    choice((name, number, string, operators()))
}

fn operators<Input>() -> impl Parser<Input, Output = TokenKind>
where
    Input: Stream<Token = char>,
{
    choice((
        choice((
            attempt(string("==")).map(|_| TokenKind::Equal),
            attempt(string("~=")).map(|_| TokenKind::NotEq),
            attempt(string("<=")).map(|_| TokenKind::LesEq),
            attempt(string(">=")).map(|_| TokenKind::GreEq),
        )),
        choice((
            token('+').map(|_| TokenKind::Add),
            token('-').map(|_| TokenKind::Sub),
            token('*').map(|_| TokenKind::Mul),
            token('/').map(|_| TokenKind::Div),
            token('<').map(|_| TokenKind::Less),
            token('>').map(|_| TokenKind::Greater),
            token('=').map(|_| TokenKind::Assign),
            token('(').map(|_| TokenKind::ParL),
            token(')').map(|_| TokenKind::ParR),
            token(',').map(|_| TokenKind::Comma),
            token(';').map(|_| TokenKind::SemiColon),
            token('.').map(|_| TokenKind::Dot),
        )),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        lex(source)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.source))
            .collect()
    }

    #[test]
    fn lex_numerals() {
        assert_eq!(
            kinds("1 2 3.45"),
            vec![
                (TokenKind::Number, "1".into()),
                (TokenKind::Number, "2".into()),
                (TokenKind::Number, "3.45".into()),
            ]
        );
    }

    #[test]
    fn lex_single_float() {
        let tokens = lex("3.45").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].source, "3.45");
    }

    #[test]
    fn lex_trailing_dot() {
        assert_eq!(
            kinds("1."),
            vec![(TokenKind::Number, "1".into()), (TokenKind::Dot, ".".into())]
        );
    }

    #[test]
    fn lex_operators() {
        let got: Vec<TokenKind> = kinds("+ - * / == ~= > >= < <= =")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            got,
            vec![
                TokenKind::Add,
                TokenKind::Sub,
                TokenKind::Mul,
                TokenKind::Div,
                TokenKind::Equal,
                TokenKind::NotEq,
                TokenKind::Greater,
                TokenKind::GreEq,
                TokenKind::Less,
                TokenKind::LesEq,
                TokenKind::Assign,
            ]
        );
    }

    #[test]
    fn lex_reserved_words() {
        let got: Vec<TokenKind> = kinds(
            "true false and or not break do if then
             else elseif end function goto return print
             local custom name2",
        )
        .into_iter()
        .map(|(k, _)| k)
        .collect();
        assert_eq!(
            got,
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Break,
                TokenKind::Do,
                TokenKind::If,
                TokenKind::Then,
                TokenKind::Else,
                TokenKind::Elseif,
                TokenKind::End,
                TokenKind::Function,
                TokenKind::Goto,
                TokenKind::Return,
                TokenKind::Print,
                TokenKind::Local,
                TokenKind::Name,
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn lex_keyword_prefix_is_a_name() {
        assert_eq!(kinds("ending"), vec![(TokenKind::Name, "ending".into())]);
    }

    #[test]
    fn lex_function() {
        assert_eq!(
            kinds("\nfunction foo()\nend\n"),
            vec![
                (TokenKind::Function, "function".into()),
                (TokenKind::Name, "foo".into()),
                (TokenKind::ParL, "(".into()),
                (TokenKind::ParR, ")".into()),
                (TokenKind::End, "end".into()),
            ]
        );
    }

    #[test]
    fn lex_skips_comments() {
        assert_eq!(
            kinds("-- leading\nx = 1 -- trailing\n- 2"),
            vec![
                (TokenKind::Name, "x".into()),
                (TokenKind::Assign, "=".into()),
                (TokenKind::Number, "1".into()),
                (TokenKind::Sub, "-".into()),
                (TokenKind::Number, "2".into()),
            ]
        );
    }

    #[test]
    fn lex_string_keeps_content() {
        assert_eq!(
            kinds(r#"print("hello, world!")"#),
            vec![
                (TokenKind::Print, "print".into()),
                (TokenKind::ParL, "(".into()),
                (TokenKind::String, "hello, world!".into()),
                (TokenKind::ParR, ")".into()),
            ]
        );
    }

    #[test]
    fn lex_positions() {
        let tokens = lex("x\n  = 1").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 5));
    }

    #[test]
    fn lex_positions_deep_into_a_long_script() {
        let source: String = (0..20_000).map(|i| format!("x{i} = {i}\n")).collect();
        let tokens = lex(&source).unwrap();
        assert_eq!(tokens.len(), 60_000);
        let last = &tokens[59_999];
        assert_eq!(last.source, "19999");
        assert_eq!((last.line, last.column), (20_000, 10));
    }

    #[test]
    fn lex_positions_after_comments_and_unicode() {
        let tokens = lex("-- é comment\n  \"ü\" x").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (2, 3));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 7));
    }

    #[test]
    fn lex_underscore_names() {
        assert_eq!(
            kinds("_ _tmp snake_case2"),
            vec![
                (TokenKind::Name, "_".into()),
                (TokenKind::Name, "_tmp".into()),
                (TokenKind::Name, "snake_case2".into()),
            ]
        );
    }

    #[test]
    fn lex_unterminated_string() {
        assert_eq!(
            lex("x = \"abc"),
            Err(LexError::UnterminatedString { line: 1, column: 5 })
        );
    }

    #[test]
    fn lex_unexpected_char() {
        assert_eq!(
            lex("1 @ 2"),
            Err(LexError::UnexpectedChar {
                ch: '@',
                line: 1,
                column: 3
            })
        );
        assert!(matches!(
            lex("a ~ b"),
            Err(LexError::UnexpectedChar { ch: '~', .. })
        ));
    }

    #[test]
    fn lex_empty() {
        assert!(lex("  -- only a comment").unwrap().is_empty());
    }
}
