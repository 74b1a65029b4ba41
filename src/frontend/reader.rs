//! Turns source text into [`ast::Program`]s. Reading happens in two steps:
//! the token stream is first grouped into untyped data (atoms, lists,
//! vectors), then each datum is desugared into an expression, recognising
//! the special forms and operators of the language.

use std::rc::Rc;

use thiserror::Error;

use super::{
    SourceFile,
    ast::{
        BinaryOperator, CondClause, CondPredicate, Expression, Lambda, Literal,
        PrimitiveOperator, Program,
    },
    intern::InternedSymbol,
    lexer::{Lexer, Span, Token, TokenKind},
};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct ReadError {
    pub kind: ReadErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("unexpected closing parenthesis")]
    UnexpectedCloseParen,
    #[error("invalid atom `{0}`")]
    InvalidAtom(String),
    #[error("unknown character name `{0}`")]
    UnknownCharacterName(String),
    #[error("invalid escape sequence `\\{0}` in string literal")]
    InvalidEscape(char),
    #[error("malformed `{form}`: {reason}")]
    MalformedForm {
        form: &'static str,
        reason: &'static str,
    },
    #[error("operator `{0}` cannot be used as a value")]
    OperatorAsValue(String),
    #[error("only the empty list may be quoted")]
    UnsupportedQuote,
}

/// Untyped tree produced from the token stream
#[derive(Debug, Clone)]
enum Datum {
    Atom(Token),
    List(Vec<Datum>, Span),
    Vector(Vec<Datum>, Span),
    Quoted(Box<Datum>, Span),
}

impl Datum {
    fn span(&self) -> Span {
        match self {
            Datum::Atom(token) => token.span,
            Datum::List(_, span) | Datum::Vector(_, span) | Datum::Quoted(_, span) => *span,
        }
    }
}

#[derive(Debug)]
pub struct Reader<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Reader<'source> {
    pub fn read_program(source_file: &'source SourceFile) -> Result<Program, ReadError> {
        let mut reader = Self {
            lexer: Lexer::new(source_file),
        };

        let mut program = Program::default();

        while let Some(datum) = reader.read_datum()? {
            program.forms.push(reader.desugar(&datum)?);
        }

        Ok(program)
    }

    fn source(&self) -> &'source SourceFile {
        self.lexer.source()
    }

    fn text(&self, span: Span) -> &'source str {
        self.source().value_of_span(span)
    }

    fn read_datum(&mut self) -> Result<Option<Datum>, ReadError> {
        let Some(token) = self.lexer.next()? else {
            return Ok(None);
        };

        let datum = match token.kind {
            TokenKind::OpenParen => {
                let (items, end) = self.read_sequence("a list")?;
                Datum::List(items, token.span.to(end))
            }
            TokenKind::VectorOpen => {
                let (items, end) = self.read_sequence("a vector literal")?;
                Datum::Vector(items, token.span.to(end))
            }
            TokenKind::Quote => {
                let Some(quoted) = self.read_datum()? else {
                    return Err(ReadError {
                        kind: ReadErrorKind::UnexpectedEof("a quoted datum"),
                        span: token.span,
                    });
                };
                let span = token.span.to(quoted.span());
                Datum::Quoted(Box::new(quoted), span)
            }
            TokenKind::CloseParen => {
                return Err(ReadError {
                    kind: ReadErrorKind::UnexpectedCloseParen,
                    span: token.span,
                });
            }
            _ => Datum::Atom(token),
        };

        Ok(Some(datum))
    }

    /// Reads data until the matching close paren, returning its span
    fn read_sequence(&mut self, expecting: &'static str) -> Result<(Vec<Datum>, Span), ReadError> {
        let mut items = Vec::new();

        loop {
            match self.lexer.peek()? {
                None => {
                    return Err(ReadError {
                        kind: ReadErrorKind::UnexpectedEof(expecting),
                        span: self.lexer.eof_span(),
                    });
                }
                Some(Token {
                    kind: TokenKind::CloseParen,
                    span,
                }) => {
                    self.lexer.next()?;
                    return Ok((items, span));
                }
                Some(_) => {
                    if let Some(datum) = self.read_datum()? {
                        items.push(datum);
                    }
                }
            }
        }
    }

    fn desugar(&self, datum: &Datum) -> Result<Expression, ReadError> {
        match datum {
            Datum::Atom(token) => self.desugar_atom(*token),
            Datum::Vector(items, _) => Ok(Expression::Array(self.desugar_all(items)?)),
            Datum::Quoted(quoted, span) => match quoted.as_ref() {
                Datum::List(items, _) if items.is_empty() => {
                    Ok(Expression::Literal(Literal::Empty))
                }
                _ => Err(ReadError {
                    kind: ReadErrorKind::UnsupportedQuote,
                    span: *span,
                }),
            },
            Datum::List(items, span) => self.desugar_list(items, *span),
        }
    }

    fn desugar_all(&self, items: &[Datum]) -> Result<Vec<Expression>, ReadError> {
        items.iter().map(|d| self.desugar(d)).collect()
    }

    fn desugar_atom(&self, token: Token) -> Result<Expression, ReadError> {
        let text = self.text(token.span);
        let invalid = || ReadError {
            kind: ReadErrorKind::InvalidAtom(text.to_string()),
            span: token.span,
        };

        let literal = match token.kind {
            TokenKind::IntegerLiteral => Literal::Integer(text.parse().map_err(|_| invalid())?),
            TokenKind::FloatLiteral => Literal::Float(text.parse().map_err(|_| invalid())?),
            TokenKind::BooleanLiteral => Literal::Boolean(matches!(text, "#t" | "#true")),
            TokenKind::CharLiteral => Literal::Char(self.parse_char(token.span)?),
            TokenKind::StringLiteral => Literal::String(self.parse_string(token.span)?),
            TokenKind::Identifier => {
                if text.parse::<BinaryOperator>().is_ok()
                    || text.parse::<PrimitiveOperator>().is_ok()
                {
                    return Err(ReadError {
                        kind: ReadErrorKind::OperatorAsValue(text.to_string()),
                        span: token.span,
                    });
                }

                return Ok(Expression::Variable(InternedSymbol::new(text)));
            }
            TokenKind::OpenParen
            | TokenKind::CloseParen
            | TokenKind::VectorOpen
            | TokenKind::Quote => unreachable!("delimiters are never atoms"),
        };

        Ok(Expression::Literal(literal))
    }

    fn parse_char(&self, span: Span) -> Result<char, ReadError> {
        // strip the `#\` prefix
        let name = &self.text(span)[2..];
        let mut chars = name.chars();

        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => match name {
                "space" => Ok(' '),
                "newline" => Ok('\n'),
                "tab" => Ok('\t'),
                "nul" => Ok('\0'),
                _ => Err(ReadError {
                    kind: ReadErrorKind::UnknownCharacterName(name.to_string()),
                    span,
                }),
            },
        }
    }

    fn parse_string(&self, span: Span) -> Result<String, ReadError> {
        let text = self.text(span);
        let mut value = String::with_capacity(text.len());
        let mut chars = text[1..text.len() - 1].chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                value.push(c);
                continue;
            }

            match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some(other) => {
                    return Err(ReadError {
                        kind: ReadErrorKind::InvalidEscape(other),
                        span,
                    });
                }
                None => unreachable!("the lexer never ends a string on a backslash"),
            }
        }

        Ok(value)
    }

    fn malformed(form: &'static str, reason: &'static str, span: Span) -> ReadError {
        ReadError {
            kind: ReadErrorKind::MalformedForm { form, reason },
            span,
        }
    }

    fn identifier(&self, datum: &Datum, form: &'static str) -> Result<InternedSymbol, ReadError> {
        match datum {
            Datum::Atom(token) if token.kind == TokenKind::Identifier => {
                Ok(InternedSymbol::new(self.text(token.span)))
            }
            other => Err(Self::malformed(form, "expected an identifier", other.span())),
        }
    }

    fn parameters(
        &self,
        datum: &Datum,
        form: &'static str,
    ) -> Result<Vec<InternedSymbol>, ReadError> {
        match datum {
            Datum::List(items, _) => items.iter().map(|d| self.identifier(d, form)).collect(),
            other => Err(Self::malformed(form, "expected a parameter list", other.span())),
        }
    }

    fn body(
        &self,
        items: &[Datum],
        form: &'static str,
        span: Span,
    ) -> Result<Vec<Expression>, ReadError> {
        if items.is_empty() {
            return Err(Self::malformed(form, "body must not be empty", span));
        }

        self.desugar_all(items)
    }

    /// Collapses a body into one expression, wrapping multiple forms in a
    /// `begin`
    fn sequence(mut body: Vec<Expression>) -> Expression {
        if body.len() == 1 {
            body.remove(0)
        } else {
            Expression::Begin(body)
        }
    }

    fn desugar_list(&self, items: &[Datum], span: Span) -> Result<Expression, ReadError> {
        let Some((head, rest)) = items.split_first() else {
            return Err(Self::malformed("application", "empty combination", span));
        };

        let head_name = match head {
            Datum::Atom(token) if token.kind == TokenKind::Identifier => {
                Some(self.text(token.span))
            }
            _ => None,
        };

        let Some(name) = head_name else {
            return Ok(Expression::call(self.desugar(head)?, self.desugar_all(rest)?));
        };

        match name {
            "define" => self.desugar_define(rest, span),
            "lambda" => {
                let [parameters, body @ ..] = rest else {
                    return Err(Self::malformed("lambda", "expected a parameter list", span));
                };

                Ok(Expression::Lambda(Rc::new(Lambda {
                    parameters: self.parameters(parameters, "lambda")?,
                    body: self.body(body, "lambda", span)?,
                })))
            }
            "if" => match rest {
                [condition, positive] => Ok(Expression::if_else(
                    self.desugar(condition)?,
                    self.desugar(positive)?,
                    Expression::Literal(Literal::Empty),
                )),
                [condition, positive, negative] => Ok(Expression::if_else(
                    self.desugar(condition)?,
                    self.desugar(positive)?,
                    self.desugar(negative)?,
                )),
                _ => Err(Self::malformed("if", "expected 2 or 3 operands", span)),
            },
            "cond" => {
                let clauses = rest
                    .iter()
                    .map(|clause| self.desugar_cond_clause(clause))
                    .collect::<Result<_, _>>()?;

                Ok(Expression::Cond(clauses))
            }
            "and" => Ok(Expression::And(self.desugar_all(rest)?)),
            "or" => Ok(Expression::Or(self.desugar_all(rest)?)),
            "not" => match rest {
                [operand] => Ok(Expression::Not(Box::new(self.desugar(operand)?))),
                _ => Err(Self::malformed("not", "expected exactly 1 operand", span)),
            },
            "let" => {
                let [Datum::List(bindings, _), body @ ..] = rest else {
                    return Err(Self::malformed("let", "expected a binding list", span));
                };

                let bindings = bindings
                    .iter()
                    .map(|binding| match binding {
                        Datum::List(pair, _) if pair.len() == 2 => {
                            Ok((self.identifier(&pair[0], "let")?, self.desugar(&pair[1])?))
                        }
                        other => Err(Self::malformed(
                            "let",
                            "bindings must be (name value) pairs",
                            other.span(),
                        )),
                    })
                    .collect::<Result<_, _>>()?;

                Ok(Expression::Let {
                    bindings,
                    body: self.body(body, "let", span)?,
                })
            }
            "set!" => match rest {
                [name, value] => Ok(Expression::Set {
                    name: self.identifier(name, "set!")?,
                    value: Box::new(self.desugar(value)?),
                }),
                _ => Err(Self::malformed("set!", "expected a name and a value", span)),
            },
            "begin" => Ok(Expression::Begin(self.desugar_all(rest)?)),
            "return" => match rest {
                [value] => Ok(Expression::Return(Box::new(self.desugar(value)?))),
                [] => Ok(Expression::Return(Box::new(Expression::Literal(Literal::Empty)))),
                _ => Err(Self::malformed("return", "expected at most 1 operand", span)),
            },
            _ => {
                if let Ok(operator) = name.parse::<BinaryOperator>() {
                    return self.desugar_binary(operator, rest, span);
                }

                if let Ok(operator) = name.parse::<PrimitiveOperator>() {
                    return Ok(Expression::Primitive {
                        operator,
                        arguments: self.desugar_all(rest)?,
                    });
                }

                Ok(Expression::call(self.desugar(head)?, self.desugar_all(rest)?))
            }
        }
    }

    fn desugar_define(&self, rest: &[Datum], span: Span) -> Result<Expression, ReadError> {
        match rest {
            // (define (name params...) body...)
            [Datum::List(signature, signature_span), body @ ..] => {
                let Some((name, parameters)) = signature.split_first() else {
                    return Err(Self::malformed("define", "missing function name", *signature_span));
                };

                Ok(Expression::Define {
                    name: self.identifier(name, "define")?,
                    value: Box::new(Expression::Lambda(Rc::new(Lambda {
                        parameters: parameters
                            .iter()
                            .map(|p| self.identifier(p, "define"))
                            .collect::<Result<_, _>>()?,
                        body: self.body(body, "define", span)?,
                    }))),
                })
            }
            // (define name value)
            [name, value] => Ok(Expression::Define {
                name: self.identifier(name, "define")?,
                value: Box::new(self.desugar(value)?),
            }),
            _ => Err(Self::malformed("define", "expected a name and a value", span)),
        }
    }

    fn desugar_cond_clause(&self, clause: &Datum) -> Result<CondClause, ReadError> {
        let Datum::List(items, span) = clause else {
            return Err(Self::malformed("cond", "clauses must be lists", clause.span()));
        };
        let Some((predicate, body)) = items.split_first() else {
            return Err(Self::malformed("cond", "empty clause", *span));
        };

        let predicate = match predicate {
            Datum::Atom(token)
                if token.kind == TokenKind::Identifier && self.text(token.span) == "else" =>
            {
                CondPredicate::Else
            }
            other => CondPredicate::Test(self.desugar(other)?),
        };

        Ok(CondClause {
            predicate,
            body: Self::sequence(self.body(body, "cond", *span)?),
        })
    }

    fn desugar_binary(
        &self,
        operator: BinaryOperator,
        operands: &[Datum],
        span: Span,
    ) -> Result<Expression, ReadError> {
        let mut operands = self.desugar_all(operands)?.into_iter();

        match (operands.len(), operator) {
            // (- x) negates
            (1, BinaryOperator::Subtract) => Ok(Expression::binary(
                operator,
                Expression::integer(0),
                operands.next().unwrap_or(Expression::integer(0)),
            )),
            (2, _) => {
                let lhs = operands.next();
                let rhs = operands.next();
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => Ok(Expression::binary(operator, lhs, rhs)),
                    _ => unreachable!("length was checked"),
                }
            }
            (n, _) if n > 2 && operator.is_foldable() => {
                let first = operands.next().unwrap_or(Expression::integer(0));
                Ok(operands.fold(first, |lhs, rhs| Expression::binary(operator, lhs, rhs)))
            }
            _ => Err(Self::malformed(
                "operator",
                "wrong number of operands",
                span,
            )),
        }
    }
}
