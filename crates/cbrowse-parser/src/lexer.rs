use crate::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    /// String or character literal, contents dropped.
    Literal,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Semi,
    Colon,
    ColonColon,
    Comma,
    Eq,
    Star,
    Arrow,
    Include { target: String, angled: bool },
    Other,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) position: usize,
    pub(crate) len: usize,
}

impl Token {
    pub(crate) fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn is_ident(&self, expected: &str) -> bool {
        self.ident() == Some(expected)
    }
}

/// Splits the whole input into tokens, ending with a single [`TokenKind::Eof`].
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if eof {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    /// Only whitespace seen since the last newline.
    line_start: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            input: src.as_bytes(),
            pos: 0,
            line_start: true,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 2;
        loop {
            match (self.peek(), self.peek2()) {
                (Some(b'*'), Some(b'/')) => {
                    self.pos += 2;
                    return Ok(());
                }
                (Some(_), _) => self.pos += 1,
                (None, _) => return Err(ParseError::UnterminatedComment { position: start }),
            }
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b'\n') => {
                    self.pos += 1;
                    self.line_start = true;
                }
                Some(b' ' | b'\t' | b'\r' | 0x0B | 0x0C) => self.pos += 1,
                // Line splice outside a directive.
                Some(b'\\') if matches!(self.peek2(), Some(b'\n' | b'\r')) => self.pos += 1,
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        loop {
            self.skip_ws_and_comments()?;
            let position = self.pos;
            let Some(b) = self.peek() else {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    position,
                    len: 0,
                });
            };

            if b == b'#' && self.line_start {
                if let Some(token) = self.lex_directive()? {
                    return Ok(token);
                }
                continue;
            }
            self.line_start = false;

            let kind = match b {
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'[' => self.single(TokenKind::LBracket),
                b']' => self.single(TokenKind::RBracket),
                b'<' => self.single(TokenKind::Lt),
                b'>' => self.single(TokenKind::Gt),
                b';' => self.single(TokenKind::Semi),
                b',' => self.single(TokenKind::Comma),
                b'=' => self.single(TokenKind::Eq),
                b'*' => self.single(TokenKind::Star),
                b':' if self.peek2() == Some(b':') => {
                    self.pos += 2;
                    TokenKind::ColonColon
                }
                b':' => self.single(TokenKind::Colon),
                b'-' if self.peek2() == Some(b'>') => {
                    self.pos += 2;
                    TokenKind::Arrow
                }
                b'"' | b'\'' => {
                    self.lex_quoted(b);
                    TokenKind::Literal
                }
                b if b.is_ascii_digit() => {
                    self.lex_number();
                    TokenKind::Other
                }
                b if is_ident_start(b) => {
                    let ident = self.lex_ident();
                    if is_raw_string_prefix(&ident) && self.peek() == Some(b'"') {
                        self.lex_raw_string();
                        TokenKind::Literal
                    } else {
                        TokenKind::Ident(ident)
                    }
                }
                _ => self.single(TokenKind::Other),
            };

            return Ok(Token {
                kind,
                position,
                len: self.pos - position,
            });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn lex_ident(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_ident_part(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn lex_number(&mut self) {
        while let Some(b) = self.peek() {
            let exponent_sign = matches!(b, b'+' | b'-')
                && matches!(
                    self.input.get(self.pos.wrapping_sub(1)),
                    Some(b'e' | b'E' | b'p' | b'P')
                );
            if is_ident_part(b) || b == b'.' || b == b'\'' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Unterminated literals end at the line break.
    fn lex_quoted(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => return,
                b if b == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.input.len());
    }

    /// `R"delim( ... )delim"`
    fn lex_raw_string(&mut self) {
        self.pos += 1;
        let delim_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'(' || b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        let mut terminator = Vec::with_capacity(self.pos - delim_start + 2);
        terminator.push(b')');
        terminator.extend_from_slice(&self.input[delim_start..self.pos]);
        terminator.push(b'"');

        match self.input[self.pos..]
            .windows(terminator.len())
            .position(|window| window == terminator.as_slice())
        {
            Some(offset) => self.pos += offset + terminator.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn skip_horizontal_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    /// Consumes one preprocessor directive. Only inclusions produce a token.
    fn lex_directive(&mut self) -> Result<Option<Token>, ParseError> {
        let position = self.pos;
        self.pos += 1;
        self.skip_horizontal_ws();
        let name = if self.peek().is_some_and(is_ident_start) {
            self.lex_ident()
        } else {
            String::new()
        };

        let mut include = None;
        if matches!(name.as_str(), "include" | "include_next" | "import") {
            self.skip_horizontal_ws();
            let close = match self.peek() {
                Some(b'"') => Some(b'"'),
                Some(b'<') => Some(b'>'),
                _ => None,
            };
            if let Some(close) = close {
                self.pos += 1;
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == close || b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                let target = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                include = Some(TokenKind::Include {
                    target,
                    angled: close == b'>',
                });
            }
        }

        self.skip_logical_line()?;
        Ok(include.map(|kind| Token {
            kind,
            position,
            len: self.pos - position,
        }))
    }

    fn skip_logical_line(&mut self) -> Result<(), ParseError> {
        while let Some(b) = self.peek() {
            match b {
                b'\n' => return Ok(()),
                b'\\' if self.peek2() == Some(b'\n') => self.pos += 2,
                b'\\' if self.peek2() == Some(b'\r') => self.pos += 3,
                b'/' if self.peek2() == Some(b'*') => self.skip_block_comment()?,
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.input.len());
        Ok(())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_part(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

fn is_raw_string_prefix(ident: &str) -> bool {
    matches!(ident, "R" | "LR" | "uR" | "UR" | "u8R")
}
