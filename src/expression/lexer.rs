// Expression lexer - tokenizes filter expressions

use super::token::{SpannedToken, Token};
use anyhow::{bail, Result};

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let input: Vec<char> = input.chars().collect();
        let current_char = input.first().copied();
        Lexer {
            input,
            position: 0,
            current_char,
        }
    }

    /// Tokenize the whole input; the last token is always `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.position;
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(SpannedToken {
                token,
                start,
                end: self.position,
            });
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Get the next token from the input
    fn next_token(&mut self) -> Result<Token> {
        let Some(ch) = self.current_char else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '%' => self.single(Token::Percent),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '*' => self.double('*', Token::Star, Token::DoubleStar),
            '/' => self.double('/', Token::Slash, Token::DoubleSlash),
            '<' => self.double('=', Token::Less, Token::LessEqual),
            '>' => self.double('=', Token::Greater, Token::GreaterEqual),
            '=' => self.double('=', Token::Assign, Token::Equal),
            '!' => {
                self.advance();
                if self.current_char != Some('=') {
                    bail!("Unexpected character '!' at position {}", self.position - 1);
                }
                self.advance();
                Token::NotEqual
            }
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            '.' => self.single(Token::Dot),
            '\'' | '"' => self.read_string(ch)?,
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            c => bail!("Unexpected character '{}' at position {}", c, self.position),
        };

        Ok(token)
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// `first` alone, or `second` when followed by `next`.
    fn double(&mut self, next: char, first: Token, second: Token) -> Token {
        self.advance();
        if self.current_char == Some(next) {
            self.advance();
            second
        } else {
            first
        }
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::keyword_from_str(&identifier).unwrap_or(Token::Identifier(identifier))
    }

    /// Read a string literal delimited by `quote`
    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start = self.position;
        self.advance(); // Skip opening quote
        let mut value = String::new();

        loop {
            match self.current_char {
                None => bail!("Unterminated string starting at position {}", start),
                Some(ch) if ch == quote => {
                    self.advance();
                    return Ok(Token::String(value));
                }
                Some('\\') => {
                    self.advance();
                    match self.current_char {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('0') => value.push('\0'),
                        Some(c @ ('\\' | '\'' | '"')) => value.push(c),
                        Some(c) => {
                            value.push('\\');
                            value.push(c);
                        }
                        None => bail!("Unterminated string starting at position {}", start),
                    }
                    self.advance();
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    /// Read an integer or float literal, including exponents
    fn read_number(&mut self) -> Token {
        let mut number = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() || ch == '.' || ch == '_' {
                if ch != '_' {
                    number.push(ch);
                }
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
            {
                number.push(ch);
                self.advance();
                if let Some(sign @ ('-' | '+')) = self.current_char {
                    number.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        Token::Number(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            tokens("QUAL >= 30"),
            vec![
                Token::Identifier("QUAL".to_string()),
                Token::GreaterEqual,
                Token::Number("30".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_subscript_and_strings() {
        assert_eq!(
            tokens("ANN['Gene_Name'] == \"BR\\\"CA1\""),
            vec![
                Token::Identifier("ANN".to_string()),
                Token::LeftBracket,
                Token::String("Gene_Name".to_string()),
                Token::RightBracket,
                Token::Equal,
                Token::String("BR\"CA1".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_operators() {
        assert_eq!(
            tokens("not x is None and y // 2 ** 3 != .5e-1"),
            vec![
                Token::Not,
                Token::Identifier("x".to_string()),
                Token::Is,
                Token::None,
                Token::And,
                Token::Identifier("y".to_string()),
                Token::DoubleSlash,
                Token::Number("2".to_string()),
                Token::DoubleStar,
                Token::Number("3".to_string()),
                Token::NotEqual,
                Token::Number(".5e-1".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keyword_arguments_and_lambda() {
        assert_eq!(
            tokens("sorted(x, key=lambda v: -v)"),
            vec![
                Token::Identifier("sorted".to_string()),
                Token::LeftParen,
                Token::Identifier("x".to_string()),
                Token::Comma,
                Token::Identifier("key".to_string()),
                Token::Assign,
                Token::Lambda,
                Token::Identifier("v".to_string()),
                Token::Colon,
                Token::Minus,
                Token::Identifier("v".to_string()),
                Token::RightParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("CHROM, POS").tokenize().unwrap();
        assert_eq!((tokens[0].start, tokens[0].end), (0, 5));
        assert_eq!((tokens[2].start, tokens[2].end), (7, 10));
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("x $ 1").tokenize().is_err());
        assert!(Lexer::new("'open").tokenize().is_err());
        assert!(Lexer::new("x ; y").tokenize().is_err());
    }
}
