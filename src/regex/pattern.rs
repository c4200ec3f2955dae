// Copyright 2024 Nathan Hoos
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Regex text -> pattern AST.
//!
//! Grammar, leaves first:
//! ```text
//! Pattern     -> Alternation
//! Alternation -> Concat ('|' Concat)*
//! Concat      -> Element*
//! Element     -> Atom Quantifier?
//! Atom        -> Literal | '.' | CharClass | Group | Anchor | Escape
//! Quantifier  -> '*' | '+' | '?' | '{m}' | '{m,}' | '{m,n}'   (optional lazy '?')
//! ```
//! Lookaround, backreferences and word boundaries are recognized and
//! rejected with `UnsupportedPattern`; anchors and flag groups parse into
//! inert wrappers.

use crate::error::{Error, Result};
use crate::regex::charset::{digit_set, space_set, word_set, CharSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Start,
    End,
}

/// Pattern AST. Only the regular-language subset influences the FSM;
/// `Capture`, `Group`, `Flagged` and `Anchor` are structure-preserving
/// wrappers with no effect on the recognized language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    Literal(char),
    CharGroup(CharSet),
    Repeated {
        element: Box<Ast>,
        min: u32,
        max: Option<u32>,
    },
    Concat(Vec<Ast>),
    Alternation(Vec<Ast>),
    Capture(Box<Ast>),
    Group(Box<Ast>),
    Flagged { flags: String, element: Box<Ast> },
    Anchor(Anchor),
}

/// Parse a regex into its AST. Fails with `BadPattern` on syntax errors and
/// `UnsupportedPattern` on constructs outside regular languages.
pub fn parse_pattern(input: &str) -> Result<Ast> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let ast = parser.alternation()?;
    if parser.pos != parser.chars.len() {
        return Err(Error::BadPattern(format!(
            "unexpected `{}` at position {}",
            parser.chars[parser.pos], parser.pos
        )));
    }
    Ok(ast)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn bad(&self, msg: impl Into<String>) -> Error {
        Error::BadPattern(msg.into())
    }

    fn alternation(&mut self) -> Result<Ast> {
        let mut options = vec![self.concat()?];
        while self.eat('|') {
            options.push(self.concat()?);
        }
        Ok(if options.len() == 1 {
            options.pop().unwrap()
        } else {
            Ast::Alternation(options)
        })
    }

    fn concat(&mut self) -> Result<Ast> {
        let mut elements = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            elements.push(self.element()?);
        }
        Ok(if elements.len() == 1 {
            elements.pop().unwrap()
        } else {
            Ast::Concat(elements)
        })
    }

    fn element(&mut self) -> Result<Ast> {
        let atom = self.atom()?;
        match self.quantifier()? {
            Some((min, max)) => {
                // Lazy variants recognize the same language as their greedy
                // forms; the suffix is consumed and discarded.
                self.eat('?');
                if matches!(self.peek(), Some('*') | Some('+')) {
                    return Err(self.bad("multiple repeat"));
                }
                Ok(Ast::Repeated {
                    element: Box::new(atom),
                    min,
                    max,
                })
            }
            None => Ok(atom),
        }
    }

    fn quantifier(&mut self) -> Result<Option<(u32, Option<u32>)>> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(Some((0, None)))
            }
            Some('+') => {
                self.pos += 1;
                Ok(Some((1, None)))
            }
            Some('?') => {
                self.pos += 1;
                Ok(Some((0, Some(1))))
            }
            Some('{') => self.bounded_quantifier(),
            _ => Ok(None),
        }
    }

    /// `{m}`, `{m,}` or `{m,n}`. An opening brace that does not parse as a
    /// quantifier is a literal, so the position is restored on failure.
    fn bounded_quantifier(&mut self) -> Result<Option<(u32, Option<u32>)>> {
        let start = self.pos;
        self.pos += 1; // '{'
        let min = match self.number() {
            Some(n) => n,
            None => {
                self.pos = start;
                return Ok(None);
            }
        };
        if self.eat('}') {
            return Ok(Some((min, Some(min))));
        }
        if !self.eat(',') {
            self.pos = start;
            return Ok(None);
        }
        let max = self.number();
        if !self.eat('}') {
            self.pos = start;
            return Ok(None);
        }
        if let Some(max) = max {
            if min > max {
                return Err(self.bad("min repeat greater than max repeat"));
            }
        }
        Ok(Some((min, max)))
    }

    fn number(&mut self) -> Option<u32> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        digits.parse().ok()
    }

    fn atom(&mut self) -> Result<Ast> {
        match self.peek() {
            Some('(') => self.group(),
            Some('[') => self.char_class(),
            Some('.') => {
                self.pos += 1;
                Ok(Ast::CharGroup(CharSet::single('\n').complement()))
            }
            Some('^') => {
                self.pos += 1;
                Ok(Ast::Anchor(Anchor::Start))
            }
            Some('$') => {
                self.pos += 1;
                Ok(Ast::Anchor(Anchor::End))
            }
            Some('\\') => self.escape_atom(),
            Some(c @ ('*' | '+' | '?')) => Err(self.bad(format!("nothing to repeat before `{}`", c))),
            Some(c) => {
                self.pos += 1;
                Ok(Ast::Literal(c))
            }
            None => Err(self.bad("unexpected end of pattern")),
        }
    }

    fn group(&mut self) -> Result<Ast> {
        self.pos += 1; // '('
        if self.eat('?') {
            return self.group_extension();
        }
        let inner = self.alternation()?;
        if !self.eat(')') {
            return Err(self.bad("missing `)`, unterminated subpattern"));
        }
        Ok(Ast::Capture(Box::new(inner)))
    }

    fn group_extension(&mut self) -> Result<Ast> {
        match self.peek() {
            Some(':') => {
                self.pos += 1;
                let inner = self.alternation()?;
                if !self.eat(')') {
                    return Err(self.bad("missing `)`, unterminated subpattern"));
                }
                Ok(Ast::Group(Box::new(inner)))
            }
            Some('P') => match self.peek_at(1) {
                Some('<') => {
                    self.pos += 2;
                    while let Some(c) = self.bump() {
                        if c == '>' {
                            let inner = self.alternation()?;
                            if !self.eat(')') {
                                return Err(self.bad("missing `)`, unterminated subpattern"));
                            }
                            return Ok(Ast::Capture(Box::new(inner)));
                        }
                    }
                    Err(self.bad("unterminated group name"))
                }
                Some('=') => Err(Error::UnsupportedPattern(
                    "named backreferences are not supported".into(),
                )),
                _ => Err(self.bad("unknown extension `?P`")),
            },
            Some('=') | Some('!') => Err(Error::UnsupportedPattern(
                "lookahead assertions are not supported".into(),
            )),
            Some('<') => match self.peek_at(1) {
                Some('=') | Some('!') => Err(Error::UnsupportedPattern(
                    "lookbehind assertions are not supported".into(),
                )),
                _ => Err(self.bad("unknown extension `?<`")),
            },
            _ => self.flag_group(),
        }
    }

    /// `(?flags:...)` wraps its body; `(?flags)` wraps an empty body. Either
    /// way the flags are inert.
    fn flag_group(&mut self) -> Result<Ast> {
        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, 'a' | 'i' | 'L' | 'm' | 's' | 'u' | 'x' | '-') {
                flags.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if flags.is_empty() {
            return Err(self.bad("unknown group extension"));
        }
        let element = if self.eat(':') {
            self.alternation()?
        } else {
            Ast::Concat(Vec::new())
        };
        if !self.eat(')') {
            return Err(self.bad("missing `)`, unterminated subpattern"));
        }
        Ok(Ast::Flagged {
            flags,
            element: Box::new(element),
        })
    }

    fn escape_atom(&mut self) -> Result<Ast> {
        self.pos += 1; // '\'
        let c = self
            .peek()
            .ok_or_else(|| self.bad("pattern ends with a bare backslash"))?;
        match c {
            'd' | 'D' | 'w' | 'W' | 's' | 'S' => {
                self.pos += 1;
                Ok(Ast::CharGroup(perl_class(c)))
            }
            'b' | 'B' => Err(Error::UnsupportedPattern(
                "word-boundary assertions are not supported".into(),
            )),
            '1'..='9' => Err(Error::UnsupportedPattern(
                "backreferences are not supported".into(),
            )),
            'A' => {
                self.pos += 1;
                Ok(Ast::Anchor(Anchor::Start))
            }
            'Z' | 'z' => {
                self.pos += 1;
                Ok(Ast::Anchor(Anchor::End))
            }
            _ => Ok(Ast::Literal(self.escape_char()?)),
        }
    }

    /// Single-character escapes shared between top-level atoms and bracket
    /// classes. The leading backslash is already consumed.
    fn escape_char(&mut self) -> Result<char> {
        let c = self
            .bump()
            .ok_or_else(|| self.bad("pattern ends with a bare backslash"))?;
        match c {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'f' => Ok('\x0C'),
            'v' => Ok('\x0B'),
            'a' => Ok('\x07'),
            '0' => Ok('\0'),
            'x' => self.hex_char(2),
            'u' => self.hex_char(4),
            c if c.is_ascii_alphanumeric() => Err(self.bad(format!("bad escape `\\{}`", c))),
            c => Ok(c),
        }
    }

    fn hex_char(&mut self, digits: usize) -> Result<char> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.bad("invalid hex escape"))?;
            value = value * 16 + d;
        }
        char::from_u32(value).ok_or_else(|| self.bad("hex escape is not a valid character"))
    }

    fn char_class(&mut self) -> Result<Ast> {
        self.pos += 1; // '['
        let negated = self.eat('^');
        let mut set = CharSet::empty();
        let mut first = true;

        loop {
            let c = self
                .peek()
                .ok_or_else(|| self.bad("unterminated character class"))?;
            if c == ']' && !first {
                self.pos += 1;
                break;
            }
            first = false;

            let item = self.class_item()?;
            // A trailing `-` is a literal; anything else after one opens a
            // range.
            if self.peek() == Some('-') && self.peek_at(1) != Some(']') && self.peek_at(1).is_some()
            {
                self.pos += 1;
                let lo = match item {
                    ClassItem::Char(lo) => lo,
                    ClassItem::Set(_) => {
                        return Err(self.bad("bad character range: class cannot bound a range"))
                    }
                };
                let hi = match self.class_item()? {
                    ClassItem::Char(hi) => hi,
                    ClassItem::Set(_) => {
                        return Err(self.bad("bad character range: class cannot bound a range"))
                    }
                };
                if lo > hi {
                    return Err(self.bad(format!("bad character range {}-{}", lo, hi)));
                }
                set = set.union(CharSet::from_range(lo, hi));
            } else {
                set = set.union(match item {
                    ClassItem::Char(c) => CharSet::single(c),
                    ClassItem::Set(s) => s,
                });
            }
        }

        Ok(Ast::CharGroup(if negated { set.complement() } else { set }))
    }

    fn class_item(&mut self) -> Result<ClassItem> {
        let c = self
            .peek()
            .ok_or_else(|| self.bad("unterminated character class"))?;
        if c == '\\' {
            self.pos += 1;
            let e = self
                .peek()
                .ok_or_else(|| self.bad("pattern ends with a bare backslash"))?;
            if matches!(e, 'd' | 'D' | 'w' | 'W' | 's' | 'S') {
                self.pos += 1;
                return Ok(ClassItem::Set(perl_class(e)));
            }
            return Ok(ClassItem::Char(self.escape_char()?));
        }
        self.pos += 1;
        Ok(ClassItem::Char(c))
    }
}

enum ClassItem {
    Char(char),
    Set(CharSet),
}

fn perl_class(c: char) -> CharSet {
    match c {
        'd' => digit_set(),
        'D' => digit_set().complement(),
        'w' => word_set(),
        'W' => word_set().complement(),
        's' => space_set(),
        'S' => space_set().complement(),
        _ => unreachable!("caller only passes perl class letters"),
    }
}
