//! Tokenizer: converts raw source text into a queue of positioned tokens.
//!
//! The scan is total and never backtracks: every character either extends the
//! token currently being accumulated, closes it, or is illegal in the current
//! state. Newlines emit statement terminators unless the previous line ended
//! with a `\` continuation marker. `#` comments run to end of line, quoted
//! strings become description tokens, and a `:` after `in`, `out`, `maneuver`
//! or `alarm` produces the corresponding keyword token.

use std::collections::VecDeque;

use log::trace;

use crate::errors::{LexError, SourcePos};
use crate::token::{Token, TokenKind};

/// Tokenizes `text`, reporting positions relative to `source_id`.
pub fn tokenize(text: &str, source_id: &str) -> Result<VecDeque<Token>, LexError> {
    Lexer::new(text, source_id).run()
}

/// A token still being accumulated; only numbers and identifiers span
/// multiple characters.
struct Partial {
    kind: TokenKind,
    text: String,
    pos: SourcePos,
}

struct Lexer<'a> {
    chars: Vec<char>,
    i: usize,
    line: u32,
    col: u32,
    source: &'a str,
    tokens: VecDeque<Token>,
    partial: Option<Partial>,
    continuation: bool,
}

impl<'a> Lexer<'a> {
    fn new(text: &str, source_id: &'a str) -> Lexer<'a> {
        Lexer {
            chars: text.chars().collect(),
            i: 0,
            line: 1,
            col: 1,
            source: source_id,
            tokens: VecDeque::new(),
            partial: None,
            continuation: false,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.source, self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.i + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.i];
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    /// Emits the partially accumulated token, if any.
    fn close(&mut self) {
        if let Some(p) = self.partial.take() {
            self.emit(Token::new(p.kind, p.text, p.pos));
        }
    }

    fn emit(&mut self, token: Token) {
        trace!("token {:?} '{}'", token.kind, token.text);
        // Only a trailing `\` continues the line; any token produced after
        // one cancels it.
        self.continuation = false;
        self.tokens.push_back(token);
    }

    fn start_or_extend(&mut self, kind: TokenKind, c: char) -> Result<(), LexError> {
        match &mut self.partial {
            None => {
                self.partial = Some(Partial {
                    kind,
                    text: c.to_string(),
                    pos: self.pos(),
                });
            }
            Some(p) => {
                // A number cannot turn into an identifier mid-token (`2x`).
                if p.kind == TokenKind::Number && kind == TokenKind::Identifier {
                    return Err(LexError::IllegalChar { ch: c, pos: self.pos() });
                }
                p.text.push(c);
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<VecDeque<Token>, LexError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.close();
                    self.advance();
                }

                '\n' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    if self.continuation {
                        self.continuation = false;
                    } else {
                        self.emit(Token::new(TokenKind::End, "\n", pos));
                    }
                }

                '\\' => {
                    self.close();
                    self.advance();
                    self.continuation = true;
                }

                '#' => {
                    self.close();
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }

                '"' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    let mut text = String::new();
                    loop {
                        match self.peek() {
                            None => return Err(LexError::UnterminatedString { pos }),
                            Some('\\') => {
                                self.advance();
                                if self.peek().is_none() {
                                    return Err(LexError::UnterminatedString { pos });
                                }
                                text.push(self.advance());
                            }
                            Some('"') => {
                                self.advance();
                                break;
                            }
                            Some(_) => text.push(self.advance()),
                        }
                    }
                    self.emit(Token::new(TokenKind::Text, text, pos));
                }

                '0'..='9' => {
                    self.start_or_extend(TokenKind::Number, c)?;
                    self.advance();
                }

                'e' | 'E' => {
                    let in_number = self
                        .partial
                        .as_ref()
                        .is_some_and(|p| p.kind == TokenKind::Number);
                    if in_number {
                        // Exponent marker; `1e-5`: the minus right after it
                        // belongs to the number, not the operator table.
                        self.advance();
                        if let Some(p) = &mut self.partial {
                            p.text.push(c);
                        }
                        if self.peek() == Some('-') {
                            let minus = self.advance();
                            if let Some(p) = &mut self.partial {
                                p.text.push(minus);
                            }
                        }
                    } else {
                        self.start_or_extend(TokenKind::Identifier, c)?;
                        self.advance();
                    }
                }

                '.' => match &mut self.partial {
                    None => {
                        self.start_or_extend(TokenKind::Number, c)?;
                        self.advance();
                    }
                    Some(p) if p.kind == TokenKind::Number => {
                        if p.text.contains('.') {
                            return Err(LexError::DuplicateDecimalPoint { pos: self.pos() });
                        }
                        p.text.push(c);
                        self.advance();
                    }
                    // Dotted identifiers (`Craft.Pos`) stay one token.
                    Some(p) => {
                        p.text.push(c);
                        self.advance();
                    }
                },

                '+' | '-' | '*' | '·' | '×' | '/' | '÷' | '√' | '%' | '^' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    self.emit(Token::new(TokenKind::Operator, c, pos));
                }

                '<' | '>' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        self.emit(Token::new(TokenKind::Operator, format!("{c}="), pos));
                    } else {
                        self.emit(Token::new(TokenKind::Operator, c, pos));
                    }
                }

                '!' => {
                    self.close();
                    let pos = self.pos();
                    if self.peek2() == Some('=') {
                        self.advance();
                        self.advance();
                        self.emit(Token::new(TokenKind::Operator, "!=", pos));
                    } else {
                        return Err(LexError::IllegalChar { ch: '!', pos });
                    }
                }

                '=' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    match self.peek() {
                        Some('=') => {
                            self.advance();
                            self.emit(Token::new(TokenKind::Operator, "==", pos));
                        }
                        Some('{') => {
                            let brace_pos = self.pos();
                            self.advance();
                            self.emit(Token::new(TokenKind::Assign, "=", pos));
                            self.emit(Token::new(TokenKind::Piecewise, "={", brace_pos));
                        }
                        _ => self.emit(Token::new(TokenKind::Assign, "=", pos)),
                    }
                }

                '[' | ']' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    self.emit(Token::new(TokenKind::List, c, pos));
                }

                '(' | ')' | '{' | '}' | '⌊' | '⌋' | '⌈' | '⌉' | '|' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    self.emit(Token::new(TokenKind::Brace, c, pos));
                }

                ':' => {
                    let keyword = match &self.partial {
                        Some(p) if p.kind == TokenKind::Identifier => match p.text.as_str() {
                            "in" => Some(TokenKind::In),
                            "out" => Some(TokenKind::Out),
                            "maneuver" => Some(TokenKind::Maneuver),
                            "alarm" => Some(TokenKind::Alarm),
                            _ => None,
                        },
                        _ => None,
                    };
                    match keyword {
                        Some(kind) => {
                            let p = self.partial.take().unwrap();
                            self.advance();
                            self.emit(Token::new(kind, p.text, p.pos));
                        }
                        None => {
                            // Solve-statement marker; the identifier before it
                            // is emitted as usual.
                            self.close();
                            let pos = self.pos();
                            self.advance();
                            self.emit(Token::new(TokenKind::Colon, ":", pos));
                        }
                    }
                }

                ',' => {
                    self.close();
                    let pos = self.pos();
                    self.advance();
                    self.emit(Token::new(TokenKind::Comma, c, pos));
                }

                _ => {
                    self.start_or_extend(TokenKind::Identifier, c)?;
                    self.advance();
                }
            }
        }

        self.close();
        Ok(reclassify(self.tokens))
    }
}

/// Reclassifies word operators and reserved conditionals after the scan, so
/// the character-class dispatch does not need keyword lookahead.
fn reclassify(tokens: VecDeque<Token>) -> VecDeque<Token> {
    tokens
        .into_iter()
        .map(|t| {
            if t.kind != TokenKind::Identifier {
                return t;
            }
            match t.text.as_str() {
                "and" | "or" | "not" => Token { kind: TokenKind::Operator, ..t },
                "if" | "otherwise" => Token { kind: TokenKind::Conditional, ..t },
                _ => t,
            }
        })
        .collect()
}
