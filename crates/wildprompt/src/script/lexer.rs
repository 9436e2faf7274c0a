use super::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),

    // Keywords
    If,
    Elif,
    Else,
    For,
    In,
    While,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,
    None,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,

    // Operators
    Assign,
    PlusAssign,
    MinusAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    /// Statement separator: newline or `;`.
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    /// Open `(` and `[`; newlines inside them do not end a statement.
    nesting: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            nesting: 0,
            tokens: Vec::new(),
        }
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn next_is(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => {
                    if self.nesting == 0 {
                        self.push(TokenKind::Newline);
                    }
                    self.line += 1;
                }
                ';' => self.push(TokenKind::Newline),
                c if c.is_whitespace() => {}
                '#' => {
                    while let Some(&next) = self.chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '"' | '\'' => {
                    let value = self.string(c)?;
                    self.push(TokenKind::Str(value));
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number(c)?;
                    self.push(kind);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let word = self.word(c);
                    self.push(keyword_or_ident(word));
                }
                '(' => {
                    self.nesting += 1;
                    self.push(TokenKind::LParen);
                }
                ')' => {
                    self.nesting = self.nesting.saturating_sub(1);
                    self.push(TokenKind::RParen);
                }
                '[' => {
                    self.nesting += 1;
                    self.push(TokenKind::LBracket);
                }
                ']' => {
                    self.nesting = self.nesting.saturating_sub(1);
                    self.push(TokenKind::RBracket);
                }
                '{' => self.push(TokenKind::LBrace),
                '}' => self.push(TokenKind::RBrace),
                ',' => self.push(TokenKind::Comma),
                '.' => self.push(TokenKind::Dot),
                ':' => self.push(TokenKind::Colon),
                '+' => {
                    let kind = if self.next_is('=') {
                        TokenKind::PlusAssign
                    } else {
                        TokenKind::Plus
                    };
                    self.push(kind);
                }
                '-' => {
                    let kind = if self.next_is('=') {
                        TokenKind::MinusAssign
                    } else {
                        TokenKind::Minus
                    };
                    self.push(kind);
                }
                '*' => self.push(TokenKind::Star),
                '/' => self.push(TokenKind::Slash),
                '%' => self.push(TokenKind::Percent),
                '=' => {
                    let kind = if self.next_is('=') {
                        TokenKind::Eq
                    } else {
                        TokenKind::Assign
                    };
                    self.push(kind);
                }
                '!' => {
                    if self.next_is('=') {
                        self.push(TokenKind::NotEq);
                    } else {
                        return Err(self.error("unexpected '!', use 'not'"));
                    }
                }
                '<' => {
                    let kind = if self.next_is('=') {
                        TokenKind::LtEq
                    } else {
                        TokenKind::Lt
                    };
                    self.push(kind);
                }
                '>' => {
                    let kind = if self.next_is('=') {
                        TokenKind::GtEq
                    } else {
                        TokenKind::Gt
                    };
                    self.push(kind);
                }
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            }
        }

        self.push(TokenKind::Newline);
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some('\n') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => match self.chars.next() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    // Unknown escapes stay literal so `\m/`-style tags survive
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self, first: char) -> Result<TokenKind, ScriptError> {
        let mut text = String::from(first);
        let mut is_float = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
            } else if c == '.' && !is_float {
                // `1.` followed by a method name is not a float
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    text.push(c);
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.error(format!("integer out of range '{}'", text)))
        }
    }

    fn word(&mut self, first: char) -> String {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }
}

fn keyword_or_ident(word: String) -> TokenKind {
    match word.as_str() {
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "while" => TokenKind::While,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "true" | "True" => TokenKind::True,
        "false" | "False" => TokenKind::False,
        "none" | "None" => TokenKind::None,
        _ => TokenKind::Ident(word),
    }
}
