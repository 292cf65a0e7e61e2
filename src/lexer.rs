use crate::Position;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::Chars,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Assign,
    Asterisk,
    Bang,
    Comma,
    Else,
    EndOfFile,
    Equal,
    False,
    Function,
    GreaterThan,
    GreaterThanEqual,
    Identifier(String),
    If,
    Illegal(String),
    Integer(String),
    LeftBrace,
    LeftBracket,
    LeftParentheses,
    LessThan,
    LessThanEqual,
    LogicalAnd,
    LogicalOr,
    Minus,
    NotEqual,
    Null,
    Percent,
    Plus,
    Return,
    RightBrace,
    RightBracket,
    RightParentheses,
    Semicolon,
    Slash,
    String(String),
    True,
}

impl TokenKind {
    /// Whether a newline directly after this token is skipped instead of
    /// ending the statement.
    fn continues_line(&self) -> bool {
        !matches!(
            self,
            TokenKind::Identifier(_)
                | TokenKind::Integer(_)
                | TokenKind::String(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::Return
                | TokenKind::RightParentheses
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::Illegal(_)
        )
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let text = match self {
            TokenKind::Assign => "=",
            TokenKind::Asterisk => "*",
            TokenKind::Bang => "!",
            TokenKind::Comma => ",",
            TokenKind::Else => "else",
            TokenKind::EndOfFile => "end of file",
            TokenKind::Equal => "==",
            TokenKind::False => "false",
            TokenKind::Function => "fn",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterThanEqual => ">=",
            TokenKind::Identifier(name) => return write!(f, "identifier '{}'", name),
            TokenKind::If => "if",
            TokenKind::Illegal(message) => return write!(f, "illegal token ({})", message),
            TokenKind::Integer(digits) => digits,
            TokenKind::LeftBrace => "{",
            TokenKind::LeftBracket => "[",
            TokenKind::LeftParentheses => "(",
            TokenKind::LessThan => "<",
            TokenKind::LessThanEqual => "<=",
            TokenKind::LogicalAnd => "&&",
            TokenKind::LogicalOr => "||",
            TokenKind::Minus => "-",
            TokenKind::NotEqual => "!=",
            TokenKind::Null => "null",
            TokenKind::Percent => "%",
            TokenKind::Plus => "+",
            TokenKind::Return => "return",
            TokenKind::RightBrace => "}",
            TokenKind::RightBracket => "]",
            TokenKind::RightParentheses => ")",
            TokenKind::Semicolon => ";",
            TokenKind::Slash => "/",
            TokenKind::String(value) => return write!(f, "{:?}", value),
            TokenKind::True => "true",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

pub const EOF_CHAR: char = '\0';

pub struct Lexer<'a> {
    chars: Chars<'a>,
    line: usize,
    column: usize,
    continues_line: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Lexer<'a> {
        Self {
            chars: input.chars(),
            line: 1,
            column: 1,
            continues_line: true,
        }
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.scan();
        self.continues_line = token.kind.continues_line();
        token
    }

    /// Lexes the whole input. The last token is always `EndOfFile`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::EndOfFile;
            tokens.push(token);
            if done {
                break tokens;
            }
        }
    }

    fn scan(&mut self) -> Token {
        loop {
            self.skip_while(Self::is_whitespace);
            if self.peek_nth(0) == '\n' && !self.is_eof() {
                let position = self.position();
                self.read_char();
                if !self.continues_line {
                    return Token::new(TokenKind::Semicolon, position);
                }
                continue;
            }
            break;
        }

        let position = self.position();
        if self.is_eof() {
            return Token::new(TokenKind::EndOfFile, position);
        }

        let kind = match self.read_char() {
            '=' => self.next_char_or(TokenKind::Assign, '=', TokenKind::Equal),
            '!' => self.next_char_or(TokenKind::Bang, '=', TokenKind::NotEqual),
            '<' => self.next_char_or(TokenKind::LessThan, '=', TokenKind::LessThanEqual),
            '>' => self.next_char_or(TokenKind::GreaterThan, '=', TokenKind::GreaterThanEqual),
            '&' => self.next_char_or(
                TokenKind::Illegal("expected '&&'".to_string()),
                '&',
                TokenKind::LogicalAnd,
            ),
            '|' => self.next_char_or(
                TokenKind::Illegal("expected '||'".to_string()),
                '|',
                TokenKind::LogicalOr,
            ),
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LeftParentheses,
            ')' => TokenKind::RightParentheses,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '"' => self.read_string(),
            c if Self::is_letter(c) => {
                let mut identifier = c.to_string();
                identifier.push_str(&self.take_while(Self::is_identifier_char));
                Self::lookup_identifier(&identifier)
            }
            c if Self::is_digit(c) => {
                let mut number = c.to_string();
                number.push_str(&self.take_while(Self::is_digit));
                TokenKind::Integer(number)
            }
            illegal => TokenKind::Illegal(format!("unexpected character {:?}", illegal)),
        };
        Token::new(kind, position)
    }

    fn read_string(&mut self) -> TokenKind {
        let mut value = String::new();
        loop {
            if self.is_eof() || self.peek_nth(0) == '\n' {
                return TokenKind::Illegal("unterminated string".to_string());
            }
            match self.read_char() {
                '"' => return TokenKind::String(value),
                '\\' => match self.read_char() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    other => {
                        return TokenKind::Illegal(format!("unknown escape sequence \\{}", other))
                    }
                },
                c => value.push(c),
            }
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn read_char(&mut self) -> char {
        match self.chars.next() {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
                '\n'
            }
            Some(c) => {
                self.column += 1;
                c
            }
            None => EOF_CHAR,
        }
    }

    fn peek_nth(&self, n: usize) -> char {
        self.chars.clone().nth(n).unwrap_or(EOF_CHAR)
    }

    fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> String {
        let mut chars = String::new();
        while predicate(self.peek_nth(0)) && !self.is_eof() {
            chars.push(self.read_char());
        }
        chars
    }

    fn skip_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.peek_nth(0)) && !self.is_eof() {
            self.read_char();
        }
    }

    fn is_letter(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_'
    }

    fn is_identifier_char(c: char) -> bool {
        Self::is_letter(c) || Self::is_digit(c)
    }

    fn is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    fn is_whitespace(c: char) -> bool {
        c == ' ' || c == '\t' || c == '\r'
    }

    fn lookup_identifier(identifier: &str) -> TokenKind {
        match identifier {
            "fn" => TokenKind::Function,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            _ => TokenKind::Identifier(identifier.to_string()),
        }
    }

    fn next_char_or(&mut self, default: TokenKind, next_char: char, token: TokenKind) -> TokenKind {
        match self.peek_nth(0) {
            c if c == next_char => {
                self.read_char();
                token
            }
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    fn ident(name: &str) -> TokenKind {
        Identifier(name.to_string())
    }

    fn int(digits: &str) -> TokenKind {
        Integer(digits.to_string())
    }

    #[test]
    fn test_next_token() {
        let input = r#"five = 5;
add = fn(x, y) {
x + y;
};
result = add(five, [1, 2][0]);
!-/*%5;
5 < 10 > 5 <= 4 >= 3;

if (5 < 10) {
    return true;
} else {
    return false;
}

10 == 10 && 10 != 9 || null;
"a\tb\"c"
"#;

        let expected = vec![
            // five = 5;
            ident("five"),
            Assign,
            int("5"),
            Semicolon,
            // add = fn(x, y) { x + y; };
            ident("add"),
            Assign,
            Function,
            LeftParentheses,
            ident("x"),
            Comma,
            ident("y"),
            RightParentheses,
            LeftBrace,
            ident("x"),
            Plus,
            ident("y"),
            Semicolon,
            RightBrace,
            Semicolon,
            // result = add(five, [1, 2][0]);
            ident("result"),
            Assign,
            ident("add"),
            LeftParentheses,
            ident("five"),
            Comma,
            LeftBracket,
            int("1"),
            Comma,
            int("2"),
            RightBracket,
            LeftBracket,
            int("0"),
            RightBracket,
            RightParentheses,
            Semicolon,
            // !-/*%5;
            Bang,
            Minus,
            Slash,
            Asterisk,
            Percent,
            int("5"),
            Semicolon,
            // 5 < 10 > 5 <= 4 >= 3;
            int("5"),
            LessThan,
            int("10"),
            GreaterThan,
            int("5"),
            LessThanEqual,
            int("4"),
            GreaterThanEqual,
            int("3"),
            Semicolon,
            // if (5 < 10) { return true; } else { return false; }
            If,
            LeftParentheses,
            int("5"),
            LessThan,
            int("10"),
            RightParentheses,
            LeftBrace,
            Return,
            True,
            Semicolon,
            RightBrace,
            Semicolon,
            Else,
            LeftBrace,
            Return,
            False,
            Semicolon,
            RightBrace,
            Semicolon,
            // 10 == 10 && 10 != 9 || null;
            int("10"),
            Equal,
            int("10"),
            LogicalAnd,
            int("10"),
            NotEqual,
            int("9"),
            LogicalOr,
            Null,
            Semicolon,
            // "a\tb\"c"
            String("a\tb\"c".to_string()),
            Semicolon,
            EndOfFile,
        ];

        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn test_newlines_end_statements() {
        let tests = [
            ("a\nb", vec![ident("a"), Semicolon, ident("b"), EndOfFile]),
            ("\n\na", vec![ident("a"), EndOfFile]),
            ("a +\nb", vec![ident("a"), Plus, ident("b"), EndOfFile]),
            (
                "f(\n1,\n2\n)",
                vec![
                    ident("f"),
                    LeftParentheses,
                    int("1"),
                    Comma,
                    int("2"),
                    Semicolon,
                    RightParentheses,
                    EndOfFile,
                ],
            ),
            ("a;\n\nb", vec![ident("a"), Semicolon, ident("b"), EndOfFile]),
            ("return\n", vec![Return, Semicolon, EndOfFile]),
        ];

        for (input, expected) in tests {
            assert_eq!(kinds(input), expected, "Failed for input: {:?}", input);
        }
    }

    #[test]
    fn test_illegal_tokens() {
        let tests = [
            ("@", "unexpected character '@'"),
            ("&", "expected '&&'"),
            ("\"open", "unterminated string"),
            ("\"line\nbreak\"", "unterminated string"),
            ("\"\\q\"", "unknown escape sequence \\q"),
        ];

        for (input, message) in tests {
            let tokens = Lexer::new(input).tokenize();
            assert_eq!(
                tokens[0].kind,
                Illegal(message.to_string()),
                "Failed for input: {:?}",
                input
            );
        }
    }

    #[test]
    fn test_token_positions() {
        let tokens = Lexer::new("x = 1\n  föo + \"é\" + y").tokenize();
        let positions = tokens
            .iter()
            .map(|token| (token.position.line, token.position.column))
            .collect::<Vec<_>>();
        // the second line lexes `f`, then an illegal `ö`, then `o`
        assert_eq!(
            positions,
            vec![
                (1, 1),
                (1, 3),
                (1, 5),
                (1, 6),
                (2, 3),
                (2, 4),
                (2, 5),
                (2, 7),
                (2, 9),
                (2, 13),
                (2, 15),
                (2, 16),
            ]
        );
    }
}
