use crate::diagnostics::Diagnostics;
use crate::token::{Literal, Token, TokenKind};

/// Cursor-based scanner producing the flat token list consumed by the parser.
///
/// Lexical errors are reported into the shared [`Diagnostics`] buffer and
/// scanning continues with the next character, so the output always ends
/// with an `Eof` token even for malformed input.
pub struct Lexer<'a, 'd> {
    input: &'a str,
    pos: usize,
    line: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'a, 'd> Lexer<'a, 'd> {
    pub fn new(input: &'a str, diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            diagnostics,
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens.push(Token::new(TokenKind::Eof, "", Literal::None, self.line));
        tokens
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let start = self.pos;
            let ch = self.consume_char()?;
            match ch {
                ' ' | '\t' | '\r' => continue,
                '\n' => {
                    self.line += 1;
                    continue;
                }
                '/' if self.peek_char() == Some('/') => {
                    self.consume_while(|c| c != '\n');
                    continue;
                }
                '(' => return Some(self.simple(TokenKind::LeftParen, start)),
                ')' => return Some(self.simple(TokenKind::RightParen, start)),
                '{' => return Some(self.simple(TokenKind::LeftBrace, start)),
                '}' => return Some(self.simple(TokenKind::RightBrace, start)),
                ',' => return Some(self.simple(TokenKind::Comma, start)),
                '.' => return Some(self.simple(TokenKind::Dot, start)),
                '-' => return Some(self.simple(TokenKind::Minus, start)),
                '+' => return Some(self.simple(TokenKind::Plus, start)),
                ';' => return Some(self.simple(TokenKind::Semicolon, start)),
                '%' => return Some(self.simple(TokenKind::Percent, start)),
                '/' => return Some(self.simple(TokenKind::Slash, start)),
                '*' => {
                    // `**` wins over two consecutive `*` tokens.
                    let kind = if self.match_char('*') {
                        TokenKind::StarStar
                    } else {
                        TokenKind::Star
                    };
                    return Some(self.simple(kind, start));
                }
                '!' => {
                    let kind = if self.match_char('=') {
                        TokenKind::BangEqual
                    } else {
                        TokenKind::Bang
                    };
                    return Some(self.simple(kind, start));
                }
                '=' => {
                    let kind = if self.match_char('=') {
                        TokenKind::EqualEqual
                    } else {
                        TokenKind::Equal
                    };
                    return Some(self.simple(kind, start));
                }
                '<' => {
                    let kind = if self.match_char('=') {
                        TokenKind::LessEqual
                    } else {
                        TokenKind::Less
                    };
                    return Some(self.simple(kind, start));
                }
                '>' => {
                    let kind = if self.match_char('=') {
                        TokenKind::GreaterEqual
                    } else {
                        TokenKind::Greater
                    };
                    return Some(self.simple(kind, start));
                }
                '\'' | '"' => match self.read_string(start) {
                    Some(token) => return Some(token),
                    None => continue,
                },
                c if c.is_ascii_digit() => return Some(self.read_number(start)),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    return Some(self.read_identifier(start));
                }
                _ => {
                    self.diagnostics.error(self.line, "Unexpected character");
                    continue;
                }
            }
        }
    }

    fn simple(&self, kind: TokenKind, start: usize) -> Token {
        Token::new(kind, &self.input[start..self.pos], Literal::None, self.line)
    }

    /// Strings open with either quote character and close at the next quote
    /// of either kind. Embedded newlines are allowed and counted.
    fn read_string(&mut self, start: usize) -> Option<Token> {
        let open_line = self.line;
        let content_start = self.pos;
        loop {
            match self.consume_char() {
                Some('\'') | Some('"') => {
                    let content = &self.input[content_start..self.pos - 1];
                    return Some(Token::new(
                        TokenKind::String,
                        &self.input[start..self.pos],
                        Literal::String(content.to_string()),
                        self.line,
                    ));
                }
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => {
                    self.diagnostics.error(open_line, "Unterminated string");
                    return None;
                }
            }
        }
    }

    fn read_number(&mut self, start: usize) -> Token {
        self.consume_while(|c| c.is_ascii_digit());
        // A trailing dot without digits stays unconsumed.
        if self.peek_char() == Some('.')
            && self
                .char_at(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit())
        {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        let value: f64 = text.parse().unwrap_or_default();
        Token::new(TokenKind::Number, text, Literal::Number(value), self.line)
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let text = &self.input[start..self.pos];
        let kind = match text {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "class" => TokenKind::Class,
            "continue" => TokenKind::Continue,
            "delete" => TokenKind::Delete,
            "else" => TokenKind::Else,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "fun" => TokenKind::Fun,
            "if" => TokenKind::If,
            "nil" => TokenKind::Nil,
            "or" => TokenKind::Or,
            "print" => TokenKind::Print,
            "return" => TokenKind::Return,
            "static" => TokenKind::Static,
            "super" => TokenKind::Super,
            "this" => TokenKind::This,
            "true" => TokenKind::True,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, Literal::None, self.line)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.consume_char();
            true
        } else {
            false
        }
    }

    fn consume_while<P>(&mut self, keep_predicate: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Scan `input` into a token list, reporting lexical errors into
/// `diagnostics`. Always returns a list terminated by `Eof`.
pub fn scan(input: &str, diagnostics: &mut Diagnostics) -> Vec<Token> {
    Lexer::new(input, diagnostics).scan_tokens()
}
