//! A minimal S-expression-ish reader used only by the binary driver to
//! exercise `selfvm` end to end without a real lexer/parser, which
//! spec.md §1 keeps out of this crate's scope. This is a test harness
//! format, not a front end: it exists so `selfvm -e '...'` or
//! `selfvm some.sself` can drive the interpreter from the command line,
//! and so `_LoadFile:` has something to hand off to.
//!
//! Grammar (atoms are whitespace/paren-delimited, `;` starts a line
//! comment):
//!
//! ```text
//! expr       := INTEGER | FLOAT | "STRING" | IDENT | "(" form ")"
//! form       := "send" expr IDENT expr*              ; explicit-receiver send
//!             | "call" IDENT expr*                   ; implicit-receiver (self) send
//!             | "return" expr                         ; non-local return
//!             | "obj" "(" slot* ")" expr*             ; object literal + body
//!             | "block" "(" slot* ")" expr*           ; block literal + body
//! slot       := "(" "const" IDENT expr ")"
//!             | "(" "mut" IDENT expr ")"
//!             | "(" "parent" IDENT expr ")"
//!             | "(" "arg" IDENT ")"
//!             | "(" "method" IDENT "(" IDENT* ")" expr ")"
//! ```
//!
//! A whole source file is a sequence of top-level `expr`s, each one a
//! script statement.

use selfvm::ast::{
    Expression, Message, NumberLiteral, Script, Slot, SourceRange, Statement,
};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Str(String),
    Atom(String),
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Tokenizer { chars: source.char_indices().peekable(), source, line: 1, column: 1 }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn tokenize(mut self) -> Result<Vec<(Token, SourceRange)>, String> {
        let mut tokens = Vec::new();
        loop {
            while let Some(&(_, c)) = self.chars.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else if c == ';' {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                } else {
                    break;
                }
            }
            let range_start = (self.line, self.column);
            let (start, c) = match self.chars.peek().copied() {
                Some(v) => v,
                None => break,
            };
            match c {
                '(' => {
                    self.advance();
                    tokens.push((Token::LParen, range(range_start, start)));
                }
                ')' => {
                    self.advance();
                    tokens.push((Token::RParen, range(range_start, start)));
                }
                '"' => {
                    self.advance();
                    let mut s = String::new();
                    loop {
                        match self.advance() {
                            Some((_, '"')) => break,
                            Some((_, '\\')) => {
                                if let Some((_, escaped)) = self.advance() {
                                    s.push(match escaped {
                                        'n' => '\n',
                                        't' => '\t',
                                        other => other,
                                    });
                                }
                            }
                            Some((_, c)) => s.push(c),
                            None => return Err("unterminated string literal".to_string()),
                        }
                    }
                    tokens.push((Token::Str(s), range(range_start, start)));
                }
                _ => {
                    let begin = start;
                    let mut end = start;
                    while let Some(&(idx, c)) = self.chars.peek() {
                        if c.is_whitespace() || c == '(' || c == ')' || c == ';' {
                            break;
                        }
                        end = idx;
                        self.advance();
                    }
                    let text = &self.source[begin..=end];
                    tokens.push((Token::Atom(text.to_string()), range(range_start, begin)));
                }
            }
        }
        Ok(tokens)
    }
}

fn range(start: (u32, u32), offset: usize) -> SourceRange {
    SourceRange { start: offset as u32, end: offset as u32, line: start.0, column: start.1 }
}

struct Parser {
    tokens: Vec<(Token, SourceRange)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, SourceRange)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(Token, SourceRange)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_lparen(&mut self) -> Result<SourceRange, String> {
        match self.next() {
            Some((Token::LParen, r)) => Ok(r),
            other => Err(format!("expected '(', got {:?}", other)),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), String> {
        match self.next() {
            Some((Token::RParen, _)) => Ok(()),
            other => Err(format!("expected ')', got {:?}", other)),
        }
    }

    fn expect_atom(&mut self) -> Result<(String, SourceRange), String> {
        match self.next() {
            Some((Token::Atom(a), r)) => Ok((a, r)),
            other => Err(format!("expected an identifier, got {:?}", other)),
        }
    }

    fn parse_top_level(&mut self) -> Result<Vec<Statement>, String> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            statements.push(Statement::Expression(self.parse_expr()?));
        }
        Ok(statements)
    }

    fn parse_expr(&mut self) -> Result<Expression, String> {
        match self.next() {
            Some((Token::Atom(a), r)) => Ok(atom_to_expr(&a, r)),
            Some((Token::Str(s), r)) => Ok(Expression::String(Arc::from(s), r)),
            Some((Token::LParen, r)) => self.parse_form(r),
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_form(&mut self, range: SourceRange) -> Result<Expression, String> {
        let (tag, _) = self.expect_atom()?;
        let expr = match tag.as_str() {
            "send" => {
                let receiver = self.parse_expr()?;
                let (selector, _) = self.expect_atom()?;
                let mut arguments = Vec::new();
                while !matches!(self.peek(), Some((Token::RParen, _))) {
                    arguments.push(self.parse_expr()?);
                }
                Expression::Message(Rc::new(Message {
                    receiver: Some(receiver),
                    selector: Arc::from(selector),
                    arguments,
                    range,
                }))
            }
            "call" => {
                let (selector, _) = self.expect_atom()?;
                let mut arguments = Vec::new();
                while !matches!(self.peek(), Some((Token::RParen, _))) {
                    arguments.push(self.parse_expr()?);
                }
                Expression::Message(Rc::new(Message { receiver: None, selector: Arc::from(selector), arguments, range }))
            }
            "return" => {
                let inner = self.parse_expr()?;
                Expression::Return(Box::new(inner), range)
            }
            "obj" => {
                let (slots, statements) = self.parse_slots_and_body()?;
                Expression::ObjectLiteral { slots, statements, range }
            }
            "block" => {
                let (slots, statements) = self.parse_slots_and_body()?;
                Expression::BlockLiteral { slots, statements, range }
            }
            other => return Err(format!("unknown form {:?}", other)),
        };
        self.expect_rparen()?;
        Ok(expr)
    }

    fn parse_slots_and_body(&mut self) -> Result<(Vec<Slot>, Vec<Statement>), String> {
        self.expect_lparen()?;
        let mut slots = Vec::new();
        while !matches!(self.peek(), Some((Token::RParen, _))) {
            slots.push(self.parse_slot()?);
        }
        self.expect_rparen()?;
        let mut statements = Vec::new();
        while !matches!(self.peek(), Some((Token::RParen, _))) {
            statements.push(Statement::Expression(self.parse_expr()?));
        }
        Ok((slots, statements))
    }

    fn parse_slot(&mut self) -> Result<Slot, String> {
        let range = self.expect_lparen()?;
        let (kind, _) = self.expect_atom()?;
        let slot = match kind.as_str() {
            "const" => {
                let (name, _) = self.expect_atom()?;
                let value = self.parse_expr()?;
                Slot { name: Arc::from(name), is_mutable: false, is_parent: false, is_argument: false, arguments: Vec::new(), value, range }
            }
            "mut" => {
                let (name, _) = self.expect_atom()?;
                let value = self.parse_expr()?;
                Slot { name: Arc::from(name), is_mutable: true, is_parent: false, is_argument: false, arguments: Vec::new(), value, range }
            }
            "parent" => {
                let (name, _) = self.expect_atom()?;
                let value = self.parse_expr()?;
                Slot { name: Arc::from(name), is_mutable: false, is_parent: true, is_argument: false, arguments: Vec::new(), value, range }
            }
            "arg" => {
                let (name, _) = self.expect_atom()?;
                // Argument slots are overwritten with the real call
                // argument at activation time (dispatch.rs), so the
                // initializer here is never observed; zero is as good a
                // placeholder as any.
                let value = Expression::Number(NumberLiteral::Integer(0), range);
                Slot { name: Arc::from(name), is_mutable: true, is_parent: false, is_argument: true, arguments: Vec::new(), value, range }
            }
            "method" => {
                let (name, _) = self.expect_atom()?;
                self.expect_lparen()?;
                let mut arguments = Vec::new();
                while let Some((Token::Atom(_), _)) = self.peek() {
                    let (arg_name, _) = self.expect_atom()?;
                    arguments.push(Arc::from(arg_name));
                }
                self.expect_rparen()?;
                let value = self.parse_expr()?;
                Slot { name: Arc::from(name), is_mutable: false, is_parent: false, is_argument: false, arguments, value, range }
            }
            other => return Err(format!("unknown slot kind {:?}", other)),
        };
        self.expect_rparen()?;
        Ok(slot)
    }
}

fn atom_to_expr(atom: &str, range: SourceRange) -> Expression {
    if let Ok(i) = atom.parse::<i64>() {
        Expression::Number(NumberLiteral::Integer(i), range)
    } else if let Ok(f) = atom.parse::<f64>() {
        Expression::Number(NumberLiteral::Float(f), range)
    } else {
        Expression::Identifier(Arc::from(atom), range)
    }
}

/// Parses a whole source file into a `Script` named `<source>`. Matches
/// `config::ScriptLoader`'s signature so it can be installed directly as
/// the `_LoadFile:` hook.
pub fn parse(source: &str) -> Result<Script, String> {
    let tokens = Tokenizer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let statements = parser.parse_top_level()?;
    Ok(Script { name: Arc::from("<script>"), statements })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_literal() {
        let script = parse("42").unwrap();
        assert_eq!(script.statements.len(), 1);
        match &script.statements[0] {
            Statement::Expression(Expression::Number(NumberLiteral::Integer(42), _)) => {}
            other => panic!("unexpected parse {:?}", other),
        }
    }

    #[test]
    fn parses_nested_send() {
        let script = parse("(send (call x) + 1)").unwrap();
        assert_eq!(script.statements.len(), 1);
    }

    #[test]
    fn parses_object_with_slots() {
        let script = parse(r#"(obj ((const x 3) (const y 4)) (call x))"#).unwrap();
        assert_eq!(script.statements.len(), 1);
    }
}
