//! Structural type descriptors.
//!
//! The instrumenter attaches a textual type to every recorded slot, using the
//! host language's own syntax: `T[]`, `[A, B]`, `Name<A, B>`,
//! `{ readonly a?: T; b: U }`, `A | B` and parenthesized types. This module
//! parses that text into a [`TypeDesc`] tree and prints it back in a
//! canonical form. Anything outside that grammar (function types, indexed
//! access, intersections) fails to parse and is left untouched by callers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

/// Reserved leaf meaning "numeric, kind and width unknown".
pub const NUMBER_PLACEHOLDER: &str = "number";

/// A parsed type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeDesc {
    /// A plain name: `string`, `Point`, `number`, a literal type.
    Plain(String),
    /// `T[]`
    Array(Box<TypeDesc>),
    /// `[A, B]`
    Tuple(Vec<TypeDesc>),
    /// `Name<A, B>`
    Generic { name: String, args: Vec<TypeDesc> },
    /// `{ readonly a?: T; b: U }`
    Object(Vec<Property>),
    /// `A | B`
    Union(Vec<TypeDesc>),
}

/// One property of an object descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub readonly: bool,
    pub optional: bool,
    pub ty: TypeDesc,
}

impl TypeDesc {
    pub fn plain(name: impl Into<String>) -> Self {
        TypeDesc::Plain(name.into())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, TypeDesc::Plain(name) if name == NUMBER_PLACEHOLDER)
    }

    /// Returns true if any leaf of the tree is the numeric placeholder.
    pub fn contains_placeholder(&self) -> bool {
        match self {
            TypeDesc::Plain(_) => self.is_placeholder(),
            TypeDesc::Array(elem) => elem.contains_placeholder(),
            TypeDesc::Tuple(items) | TypeDesc::Union(items) => {
                items.iter().any(TypeDesc::contains_placeholder)
            }
            TypeDesc::Generic { args, .. } => args.iter().any(TypeDesc::contains_placeholder),
            TypeDesc::Object(props) => props.iter().any(|p| p.ty.contains_placeholder()),
        }
    }
}

/// Returns true if `name` can be written as a bare identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Parses descriptor text into a [`TypeDesc`].
pub fn parse_descriptor(text: &str) -> Result<TypeDesc, DescriptorError> {
    let tokens = lex(text)?;
    if tokens.is_empty() {
        return Err(DescriptorError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let desc = parser.union()?;
    match parser.peek() {
        None => Ok(desc),
        Some(tok) => Err(tok.unexpected("end of descriptor")),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Identifier, dotted name or numeric literal.
    Word(String),
    /// String literal, quotes included.
    Str(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

impl Token {
    fn unexpected(&self, expected: &'static str) -> DescriptorError {
        let found = match &self.tok {
            Tok::Word(w) | Tok::Str(w) => w.clone(),
            Tok::Punct(c) => c.to_string(),
        };
        DescriptorError::UnexpectedToken {
            offset: self.offset,
            found,
            expected,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.')
}

fn lex(text: &str) -> Result<Vec<Token>, DescriptorError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if is_word_char(c) {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if !is_word_char(c) {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token {
                tok: Tok::Word(word),
                offset,
            });
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut literal = String::from(quote);
            chars.next();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                literal.push(c);
                if c == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        literal.push(escaped);
                    }
                } else if c == quote {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(DescriptorError::UnterminatedString { offset });
            }
            tokens.push(Token {
                tok: Tok::Str(literal),
                offset,
            });
        } else {
            tokens.push(Token {
                tok: Tok::Punct(c),
                offset,
            });
            chars.next();
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, DescriptorError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(DescriptorError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek_at(0) == Some(&Tok::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: char, expected: &'static str) -> Result<(), DescriptorError> {
        let tok = self.next(expected)?;
        if tok.tok == Tok::Punct(punct) {
            Ok(())
        } else {
            Err(tok.unexpected(expected))
        }
    }

    fn union(&mut self) -> Result<TypeDesc, DescriptorError> {
        self.eat('|');
        let mut members = vec![self.postfix()?];
        while self.eat('|') {
            members.push(self.postfix()?);
        }
        if members.len() == 1 {
            Ok(members.remove(0))
        } else {
            Ok(TypeDesc::Union(members))
        }
    }

    fn postfix(&mut self) -> Result<TypeDesc, DescriptorError> {
        let mut desc = self.primary()?;
        while self.peek_at(0) == Some(&Tok::Punct('['))
            && self.peek_at(1) == Some(&Tok::Punct(']'))
        {
            self.pos += 2;
            desc = TypeDesc::Array(Box::new(desc));
        }
        Ok(desc)
    }

    fn primary(&mut self) -> Result<TypeDesc, DescriptorError> {
        let tok = self.next("a type")?;
        match tok.tok {
            Tok::Word(name) => {
                if self.eat('<') {
                    let args = self.list('>', "type argument list")?;
                    Ok(TypeDesc::Generic { name, args })
                } else {
                    Ok(TypeDesc::Plain(name))
                }
            }
            Tok::Str(literal) => Ok(TypeDesc::Plain(literal)),
            Tok::Punct('[') => Ok(TypeDesc::Tuple(self.list(']', "tuple element")?)),
            Tok::Punct('{') => self.object(),
            Tok::Punct('(') => {
                let inner = self.union()?;
                self.expect(')', "')'")?;
                Ok(inner)
            }
            Tok::Punct(_) => Err(tok.unexpected("a type")),
        }
    }

    /// Comma-separated types up to `close`; a trailing comma is allowed.
    fn list(&mut self, close: char, expected: &'static str) -> Result<Vec<TypeDesc>, DescriptorError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.union()?);
            if !self.eat(',') {
                let tok = self.next(expected)?;
                if tok.tok != Tok::Punct(close) {
                    return Err(tok.unexpected(expected));
                }
                return Ok(items);
            }
        }
    }

    fn object(&mut self) -> Result<TypeDesc, DescriptorError> {
        let mut props = Vec::new();
        loop {
            if self.eat('}') {
                return Ok(TypeDesc::Object(props));
            }

            // `readonly` is a modifier unless it is itself the property name.
            let readonly = matches!(self.peek_at(0), Some(Tok::Word(w)) if w == "readonly")
                && matches!(self.peek_at(1), Some(Tok::Word(_) | Tok::Str(_)));
            if readonly {
                self.pos += 1;
            }

            let tok = self.next("property name")?;
            let name = match tok.tok {
                Tok::Word(w) => w,
                Tok::Str(s) => unquote(&s),
                Tok::Punct(_) => return Err(tok.unexpected("property name")),
            };
            let optional = self.eat('?');
            self.expect(':', "':'")?;
            let ty = self.union()?;
            props.push(Property {
                name,
                readonly,
                optional,
                ty,
            });

            if !self.eat(';') && !self.eat(',') {
                self.expect('}', "'}'")?;
                return Ok(TypeDesc::Object(props));
            }
        }
    }
}

fn unquote(literal: &str) -> String {
    literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default().replace("\\\"", "\"").replace("\\'", "'")
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Plain(name) => f.write_str(name),
            TypeDesc::Array(elem) => match elem.as_ref() {
                TypeDesc::Union(_) => write!(f, "({elem})[]"),
                _ => write!(f, "{elem}[]"),
            },
            TypeDesc::Tuple(items) => {
                f.write_str("[")?;
                write_joined(f, items, ", ")?;
                f.write_str("]")
            }
            TypeDesc::Generic { name, args } => {
                write!(f, "{name}<")?;
                write_joined(f, args, ", ")?;
                f.write_str(">")
            }
            TypeDesc::Object(props) => {
                if props.is_empty() {
                    return f.write_str("{}");
                }
                f.write_str("{ ")?;
                for (i, prop) in props.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{prop}")?;
                }
                f.write_str(" }")
            }
            TypeDesc::Union(members) => write_joined(f, members, " | "),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.readonly {
            f.write_str("readonly ")?;
        }
        if is_identifier(&self.name) {
            f.write_str(&self.name)?;
        } else {
            write!(f, "\"{}\"", self.name.replace('"', "\\\""))?;
        }
        if self.optional {
            f.write_str("?")?;
        }
        write!(f, ": {}", self.ty)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeDesc], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
