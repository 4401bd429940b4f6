//! SQL lexer
//!
//! Converts statement text into a stream of tokens. Keywords are
//! case-insensitive and carried as their own variants for O(1) matching in
//! the parser. Each token tracks its byte offset so parse errors can report
//! the remaining input tail.

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start in the original source.
    pub offset: usize,
}

/// Token discriminant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    // Literals
    Long(i64),
    Double(f64),
    Str(String),
    /// Unquoted identifier (never a keyword).
    Ident(String),

    // Keywords. `ts`, `dim` and `val` are soft: the parser recognizes them
    // positionally so they stay usable as identifiers.
    Select,
    From,
    Where,
    Group,
    By,
    Order,
    Desc,
    Limit,
    Insert,
    Into,
    Delete,
    Drop,
    Sum,
    Min,
    Max,
    Count,
    Not,
    And,
    Or,
    In,
    Now,

    // Operators and punctuation
    Star,
    Comma,
    LParen,
    RParen,
    Eq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Plus,
    Minus,
    Semicolon,

    Eof,
}

impl TokenKind {
    /// Human-readable rendering used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Long(v) => format!("number {v}"),
            TokenKind::Double(v) => format!("number {v}"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::Ident(s) => format!("identifier {s}"),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{other:?}").to_uppercase(),
        }
    }
}

/// Lexical errors, surfaced as parse failures by the caller.
#[derive(Debug)]
pub(crate) struct LexError {
    pub message: String,
    pub offset: usize,
}

pub(crate) struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the entire input, ending with an Eof token.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start = self.pos;
        if self.pos >= self.src.len() {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset: start,
            });
        }

        let ch = self.src[self.pos];
        let kind = match ch {
            b'\'' => self.lex_string()?,
            b'0'..=b'9' => self.lex_number()?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_identifier(),
            b'*' => {
                self.pos += 1;
                TokenKind::Star
            }
            b',' => {
                self.pos += 1;
                TokenKind::Comma
            }
            b'(' => {
                self.pos += 1;
                TokenKind::LParen
            }
            b')' => {
                self.pos += 1;
                TokenKind::RParen
            }
            b'=' => {
                self.pos += 1;
                TokenKind::Eq
            }
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            b'<' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            b'+' => {
                self.pos += 1;
                TokenKind::Plus
            }
            b'-' => {
                self.pos += 1;
                TokenKind::Minus
            }
            b';' => {
                self.pos += 1;
                TokenKind::Semicolon
            }
            other => {
                return Err(LexError {
                    message: format!("unexpected character {:?}", other as char),
                    offset: start,
                });
            }
        };

        Ok(Token {
            kind,
            offset: start,
        })
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let content_start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == b'\'' {
                let content = &self.src[content_start..self.pos];
                self.pos += 1; // closing quote
                let text = std::str::from_utf8(content)
                    .map_err(|_| LexError {
                        message: "string literal is not valid UTF-8".to_string(),
                        offset: start,
                    })?
                    .to_string();
                return Ok(TokenKind::Str(text));
            }
            self.pos += 1;
        }
        Err(LexError {
            message: "unterminated string literal".to_string(),
            offset: start,
        })
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }

        // A float needs digits on both sides of the dot.
        let is_float = self.peek() == Some(b'.')
            && self
                .src
                .get(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("digits are ASCII");
        if is_float {
            text.parse()
                .map(TokenKind::Double)
                .map_err(|_| LexError {
                    message: format!("invalid float literal {text:?}"),
                    offset: start,
                })
        } else {
            text.parse().map(TokenKind::Long).map_err(|_| LexError {
                message: format!("integer literal {text:?} is out of range"),
                offset: start,
            })
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).expect("ident bytes are ASCII");
        keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()))
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text.to_ascii_uppercase().as_str() {
        "SELECT" => TokenKind::Select,
        "FROM" => TokenKind::From,
        "WHERE" => TokenKind::Where,
        "GROUP" => TokenKind::Group,
        "BY" => TokenKind::By,
        "ORDER" => TokenKind::Order,
        "DESC" => TokenKind::Desc,
        "LIMIT" => TokenKind::Limit,
        "INSERT" => TokenKind::Insert,
        "INTO" => TokenKind::Into,
        "DELETE" => TokenKind::Delete,
        "DROP" => TokenKind::Drop,
        "SUM" => TokenKind::Sum,
        "MIN" => TokenKind::Min,
        "MAX" => TokenKind::Max,
        "COUNT" => TokenKind::Count,
        "NOT" => TokenKind::Not,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "IN" => TokenKind::In,
        "NOW" => TokenKind::Now,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("select FROM Where"),
            vec![
                TokenKind::Select,
                TokenKind::From,
                TokenKind::Where,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 4.2"),
            vec![TokenKind::Long(42), TokenKind::Double(4.2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_delta_suffix_splits_into_number_and_ident() {
        assert_eq!(
            kinds("NOW-1h"),
            vec![
                TokenKind::Now,
                TokenKind::Minus,
                TokenKind::Long(1),
                TokenKind::Ident("h".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            kinds("'hello world'"),
            vec![TokenKind::Str("hello world".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::tokenize("'oops").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds(">= <= > <"),
            vec![
                TokenKind::GtEq,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_offsets_track_source_positions() {
        let tokens = Lexer::tokenize("SELECT *").unwrap();
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 7);
    }
}
