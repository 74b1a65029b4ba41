use std::{collections::VecDeque, str::Chars};

use itertools::{PeekNth, peek_nth};

use super::{
    SourceFile,
    reader::{ReadError, ReadErrorKind},
};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Delimiters */
    OpenParen,   // (
    CloseParen,  // )
    VectorOpen,  // #(
    Quote,       // '

    /* Atoms */
    Identifier,     // car
    BooleanLiteral, // #t
    CharLiteral,    // #\a
    IntegerLiteral, // 42
    FloatLiteral,   // 4.2
    StringLiteral,  // "hello, world"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\'')
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    /// Span pointing just past the last consumed character
    pub fn eof_span(&self) -> Span {
        Span::new(self.position, self.position)
    }

    fn error(&self, kind: ReadErrorKind, start: usize) -> ReadError {
        ReadError {
            kind,
            span: Span::new(start, self.position.max(start + 1)),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.bump();
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        self.bump();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;
        self.bump();
        self.bump();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_string(&mut self) -> Result<Token, ReadError> {
        let start_position = self.position;

        // Consume opening quote
        self.bump();

        while let Some(c) = self.bump() {
            match c {
                // Skip whatever is escaped, validated by the reader
                '\\' => {
                    self.bump();
                }
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::StringLiteral,
                        span: self.new_span(start_position),
                    });
                }
                _ => {}
            }
        }

        Err(self.error(ReadErrorKind::UnterminatedString, start_position))
    }

    // Anything up to the next delimiter: identifiers, numbers, `#t`, `#\a`
    fn read_atom(&mut self) -> Span {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if is_delimiter(c) {
                break;
            }

            self.bump();
        }

        self.new_span(start_position)
    }

    fn read_hash(&mut self) -> Result<Token, ReadError> {
        let start_position = self.position;

        match self.chars.peek_nth(1).copied() {
            Some('(') => Ok(self.read_double(TokenKind::VectorOpen)),
            Some('\\') => {
                self.bump();
                self.bump();
                // The first character is always part of the literal, even a
                // delimiter like `#\(`
                if self.bump().is_none() {
                    return Err(self.error(
                        ReadErrorKind::UnexpectedEof("a character literal"),
                        start_position,
                    ));
                }
                let rest = self.read_atom();

                Ok(Token {
                    kind: TokenKind::CharLiteral,
                    span: Span::new(start_position, rest.end),
                })
            }
            Some('t' | 'f') => {
                let span = self.read_atom();
                match self.source.value_of_span(span) {
                    "#t" | "#f" | "#true" | "#false" => Ok(Token {
                        kind: TokenKind::BooleanLiteral,
                        span,
                    }),
                    other => Err(ReadError {
                        kind: ReadErrorKind::InvalidAtom(other.to_string()),
                        span,
                    }),
                }
            }
            _ => {
                let span = self.read_atom();
                Err(ReadError {
                    kind: ReadErrorKind::InvalidAtom(self.source.value_of_span(span).to_string()),
                    span,
                })
            }
        }
    }

    fn classify_atom(&self, span: Span) -> TokenKind {
        let value = self.source.value_of_span(span);

        let digits = value.strip_prefix(['+', '-']).unwrap_or(value);

        // out of range integers stay integers so the reader rejects them
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            TokenKind::IntegerLiteral
        } else if value.contains('.')
            && value.contains(|c: char| c.is_ascii_digit())
            && value.parse::<f64>().is_ok()
            && !value.contains(|c: char| c.is_ascii_alphabetic())
        {
            TokenKind::FloatLiteral
        } else {
            TokenKind::Identifier
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token>, ReadError> {
        if let Some(token) = self.peek_buffer.front() {
            return Ok(Some(*token));
        }

        if let Some(token) = self.next()? {
            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.front().copied())
    }

    pub fn next(&mut self) -> Result<Option<Token>, ReadError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        while let Some(c) = self.chars.peek().copied() {
            let token = match c {
                // Ignore whitespace
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                // Ignore comments
                ';' => {
                    self.ignore_line();
                    continue;
                }

                '(' => self.read_single(TokenKind::OpenParen),
                ')' => self.read_single(TokenKind::CloseParen),
                '\'' => self.read_single(TokenKind::Quote),
                '"' => self.read_string()?,
                '#' => self.read_hash()?,

                _ => {
                    let span = self.read_atom();
                    Token {
                        kind: self.classify_atom(span),
                        span,
                    }
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_atoms_and_delimiters() {
        assert_eq!(
            kinds("(define (f x) #(1 2.5 -3) #\\a #t \"s\") ; trailing"),
            vec![
                TokenKind::OpenParen,
                TokenKind::Identifier,
                TokenKind::OpenParen,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::CloseParen,
                TokenKind::VectorOpen,
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::IntegerLiteral,
                TokenKind::CloseParen,
                TokenKind::CharLiteral,
                TokenKind::BooleanLiteral,
                TokenKind::StringLiteral,
                TokenKind::CloseParen,
            ]
        );
    }

    #[test]
    fn operator_names_are_identifiers() {
        assert_eq!(
            kinds("+ - fl<= exact->inexact"),
            vec![TokenKind::Identifier; 4]
        );
    }

    #[test]
    fn numbers_need_a_point_to_be_floats() {
        assert_eq!(
            kinds("99999999999999999999 +7 1.0 1e5"),
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let source = SourceFile::from_memory("(display \"oops)");
        let mut lexer = Lexer::new(&source);

        lexer.next().unwrap();
        lexer.next().unwrap();
        let error = lexer.next().unwrap_err();

        assert_eq!(error.kind, ReadErrorKind::UnterminatedString);
        assert_eq!(error.span.start, 9);
    }
}
