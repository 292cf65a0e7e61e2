use crate::{flatten, Diagnostic, ErrorKind, Position, Token, TokenKind};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    slice::Iter,
};

pub type Program = Vec<Statement>;

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Return(Option<Expression>, Position),
    Expression(Expression),
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Self::Return(_, position) => *position,
            Self::Expression(expression) => expression.position(),
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Return(Some(expression), _) => write!(f, "return {}", expression),
            Self::Return(None, _) => write!(f, "return"),
            Self::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct Block(pub Vec<Statement>);

impl Display for Block {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        if self.0.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{ {} }}", flatten(&self.0, "; "))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal, Position),
    Prefix(Prefix),
    Infix(Infix),
    Assign(Assign),
    If(If),
    Function(Function),
    Call(Call),
    List(Vec<Expression>, Position),
    Index(Index),
}

impl Expression {
    pub fn position(&self) -> Position {
        match self {
            Self::Identifier(identifier) => identifier.position,
            Self::Literal(_, position) | Self::List(_, position) => *position,
            Self::Prefix(prefix) => prefix.position,
            Self::Infix(infix) => infix.position,
            Self::Assign(assign) => assign.position,
            Self::If(if_expression) => if_expression.position,
            Self::Function(function) => function.position,
            Self::Call(call) => call.position,
            Self::Index(index) => index.position,
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Identifier(identifier) => write!(f, "{}", identifier),
            Self::Literal(literal, _) => write!(f, "{}", literal),
            Self::Prefix(prefix) => write!(f, "{}", prefix),
            Self::Infix(infix) => write!(f, "{}", infix),
            Self::Assign(assign) => write!(f, "{}", assign),
            Self::If(if_expression) => write!(f, "{}", if_expression),
            Self::Function(function) => write!(f, "{}", function),
            Self::Call(call) => write!(f, "{}", call),
            Self::List(elements, _) => write!(f, "[{}]", flatten(elements, ", ")),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Identifier {
    pub name: String,
    pub position: Position,
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Integer(i64),
    Bool(bool),
    String(String),
    Null,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Literal::Integer(x) => write!(f, "{}", x),
            Literal::Bool(x) => write!(f, "{}", x),
            Literal::String(x) => write!(f, "{:?}", x),
            Literal::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PrefixOperator {
    Minus,
    Bang,
}

impl Display for PrefixOperator {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Minus => write!(f, "-"),
            Self::Bang => write!(f, "!"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Prefix {
    pub operator: PrefixOperator,
    pub right: Box<Expression>,
    pub position: Position,
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "({}{})", self.operator, self.right)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InfixOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Or,
}

impl InfixOperator {
    fn from_token(kind: &TokenKind) -> Option<Self> {
        let operator = match kind {
            TokenKind::Plus => Self::Plus,
            TokenKind::Minus => Self::Minus,
            TokenKind::Asterisk => Self::Multiply,
            TokenKind::Slash => Self::Divide,
            TokenKind::Percent => Self::Modulo,
            TokenKind::Equal => Self::Equal,
            TokenKind::NotEqual => Self::NotEqual,
            TokenKind::LessThan => Self::LessThan,
            TokenKind::LessThanEqual => Self::LessThanEqual,
            TokenKind::GreaterThan => Self::GreaterThan,
            TokenKind::GreaterThanEqual => Self::GreaterThanEqual,
            TokenKind::LogicalAnd => Self::And,
            TokenKind::LogicalOr => Self::Or,
            _ => return None,
        };
        Some(operator)
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let operator = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::And => "&&",
            Self::Or => "||",
        };
        write!(f, "{}", operator)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Infix {
    pub left: Box<Expression>,
    pub operator: InfixOperator,
    pub right: Box<Expression>,
    pub position: Position,
}

impl Display for Infix {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "({} {} {})", self.left, self.operator, self.right)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Assign {
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub position: Position,
}

impl Display for Assign {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{} = {}", self.target, self.value)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct If {
    pub condition: Box<Expression>,
    pub consequence: Block,
    pub alternative: Option<Block>,
    pub position: Position,
}

impl Display for If {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "if {} {}", self.condition, self.consequence)?;
        if let Some(alternative) = &self.alternative {
            write!(f, " else {}", alternative)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub parameters: Vec<Identifier>,
    pub body: Block,
    pub position: Position,
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "fn({}) {}", flatten(&self.parameters, ", "), self.body)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Call {
    pub function: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub position: Position,
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}({})", self.function, flatten(&self.arguments, ", "))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Index {
    pub left: Box<Expression>,
    pub index: Box<Expression>,
    pub position: Position,
}

impl Display for Index {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "({}[{}])", self.left, self.index)
    }
}

#[derive(Debug, PartialEq, PartialOrd, Copy, Clone)]
pub enum Precedence {
    Lowest,
    Assignment,
    LogicalOr,
    LogicalAnd,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Prefix,
    Call,
    Index,
}

impl Precedence {
    pub fn of_token(token: &TokenKind) -> Self {
        match token {
            TokenKind::Assign => Self::Assignment,
            TokenKind::LogicalOr => Self::LogicalOr,
            TokenKind::LogicalAnd => Self::LogicalAnd,
            TokenKind::Equal | TokenKind::NotEqual => Self::Equality,
            TokenKind::LessThan
            | TokenKind::LessThanEqual
            | TokenKind::GreaterThan
            | TokenKind::GreaterThanEqual => Self::Relational,
            TokenKind::Plus | TokenKind::Minus => Self::Additive,
            TokenKind::Asterisk | TokenKind::Slash | TokenKind::Percent => Self::Multiplicative,
            TokenKind::LeftParentheses => Self::Call,
            TokenKind::LeftBracket => Self::Index,
            _ => Self::Lowest,
        }
    }
}

type ParseResult<T> = std::result::Result<T, Diagnostic>;

/// Deepest expression tree the parser will build.
pub const MAX_NESTING: usize = 256;

pub struct Parser<'a> {
    tokens: Iter<'a, Token>,
    end_of_file: Token,
    depth: usize,
    nesting: usize,
    errors: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        let end_of_file = tokens
            .last()
            .filter(|token| token.kind == TokenKind::EndOfFile)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::EndOfFile, Position::new(1, 1)));
        Self {
            tokens: tokens.iter(),
            end_of_file,
            depth: 0,
            nesting: 0,
            errors: Vec::new(),
        }
    }

    /// Parses every statement it can. Failed statements are skipped and
    /// reported through `errors`.
    pub fn parse(&mut self) -> Program {
        let mut program = Program::new();
        loop {
            match self.peek_kind() {
                TokenKind::EndOfFile => break,
                TokenKind::Semicolon => {
                    self.read_token();
                }
                _ => match self.parse_statement() {
                    Ok(statement) => program.push(statement),
                    Err(diagnostic) => {
                        self.errors.push(diagnostic);
                        self.nesting = 0;
                        self.synchronize();
                    }
                },
            }
        }
        program
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }

    fn synchronize(&mut self) {
        let mut balance = std::mem::take(&mut self.depth) as isize;
        loop {
            match self.read_token().kind {
                TokenKind::EndOfFile => break,
                TokenKind::LeftBrace => balance += 1,
                TokenKind::RightBrace => balance -= 1,
                TokenKind::Semicolon if balance <= 0 => break,
                _ => {}
            }
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let statement = match self.peek_kind() {
            TokenKind::Return => self.parse_return_statement()?,
            _ => Statement::Expression(self.parse_expression(Precedence::Lowest)?),
        };

        match self.peek_kind() {
            TokenKind::Semicolon => {
                self.read_token();
            }
            TokenKind::RightBrace | TokenKind::EndOfFile => {}
            _ => return Err(self.unexpected("';' or newline")),
        }
        Ok(statement)
    }

    fn parse_return_statement(&mut self) -> ParseResult<Statement> {
        let position = self.read_token().position;
        let value = match self.peek_kind() {
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::EndOfFile => None,
            _ => Some(self.parse_expression(Precedence::Lowest)?),
        };
        Ok(Statement::Return(value, position))
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::LeftBrace)?;
        self.depth += 1;
        let mut statements = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RightBrace => break,
                TokenKind::Semicolon => {
                    self.read_token();
                }
                TokenKind::EndOfFile => return Err(self.unexpected("'}'")),
                _ => statements.push(self.parse_statement()?),
            }
        }
        self.read_token();
        self.depth -= 1;
        Ok(Block(statements))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> ParseResult<Expression> {
        let outer = self.nesting;
        self.nest()?;
        let mut expression = self.parse_prefix()?;
        while precedence < Precedence::of_token(self.peek_kind()) {
            self.nest()?;
            expression = self.parse_infix(expression)?;
        }
        self.nesting = outer;
        Ok(expression)
    }

    /// Counts one more level of expression tree. Compilation walks the tree
    /// recursively, so its depth is capped.
    fn nest(&mut self) -> ParseResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(Diagnostic::new(
                self.peek_nth(0).position,
                ErrorKind::NestingTooDeep(MAX_NESTING),
            ));
        }
        Ok(())
    }

    fn parse_prefix(&mut self) -> ParseResult<Expression> {
        let token = self.peek_nth(0).clone();
        let position = token.position;
        let expression = match token.kind {
            TokenKind::Identifier(name) => {
                self.read_token();
                Expression::Identifier(Identifier { name, position })
            }
            TokenKind::Integer(digits) => {
                self.read_token();
                let value = digits
                    .parse::<i64>()
                    .map_err(|_| Diagnostic::new(position, ErrorKind::InvalidInteger(digits)))?;
                Expression::Literal(Literal::Integer(value), position)
            }
            TokenKind::String(value) => {
                self.read_token();
                Expression::Literal(Literal::String(value), position)
            }
            TokenKind::True | TokenKind::False => {
                self.read_token();
                Expression::Literal(Literal::Bool(token.kind == TokenKind::True), position)
            }
            TokenKind::Null => {
                self.read_token();
                Expression::Literal(Literal::Null, position)
            }
            TokenKind::Bang | TokenKind::Minus => {
                self.read_token();
                let operator = match token.kind {
                    TokenKind::Bang => PrefixOperator::Bang,
                    _ => PrefixOperator::Minus,
                };
                Expression::Prefix(Prefix {
                    operator,
                    right: Box::new(self.parse_expression(Precedence::Prefix)?),
                    position,
                })
            }
            TokenKind::LeftParentheses => {
                self.read_token();
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RightParentheses)?;
                expression
            }
            TokenKind::LeftBracket => {
                let elements = self.parse_expression_list(TokenKind::RightBracket)?;
                Expression::List(elements, position)
            }
            TokenKind::If => self.parse_if_expression()?,
            TokenKind::Function => self.parse_function_literal()?,
            TokenKind::Illegal(message) => {
                self.read_token();
                return Err(Diagnostic::new(position, ErrorKind::IllegalToken(message)));
            }
            other => {
                return Err(Diagnostic::new(
                    position,
                    ErrorKind::NoPrefixParse(other.to_string()),
                ))
            }
        };
        Ok(expression)
    }

    fn parse_infix(&mut self, left: Expression) -> ParseResult<Expression> {
        let token = self.peek_nth(0).clone();
        let position = token.position;
        let expression = match token.kind {
            TokenKind::Assign => {
                self.read_token();
                // right associative
                let value = self.parse_expression(Precedence::Lowest)?;
                Expression::Assign(Assign {
                    target: Box::new(left),
                    value: Box::new(value),
                    position,
                })
            }
            TokenKind::LeftParentheses => {
                let arguments = self.parse_expression_list(TokenKind::RightParentheses)?;
                Expression::Call(Call {
                    function: Box::new(left),
                    arguments,
                    position,
                })
            }
            TokenKind::LeftBracket => {
                self.read_token();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RightBracket)?;
                Expression::Index(Index {
                    left: Box::new(left),
                    index: Box::new(index),
                    position,
                })
            }
            kind => {
                let operator = InfixOperator::from_token(&kind)
                    .ok_or_else(|| self.unexpected("an operator"))?;
                self.read_token();
                let right = self.parse_expression(Precedence::of_token(&kind))?;
                Expression::Infix(Infix {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right),
                    position,
                })
            }
        };
        Ok(expression)
    }

    /// Parses `opener element, element closer`. Newlines inside the list are
    /// ignored.
    fn parse_expression_list(&mut self, closer: TokenKind) -> ParseResult<Vec<Expression>> {
        self.read_token();
        let mut elements = Vec::new();
        self.skip_semicolons();
        if *self.peek_kind() == closer {
            self.read_token();
            return Ok(elements);
        }

        loop {
            elements.push(self.parse_expression(Precedence::Lowest)?);
            self.skip_semicolons();
            if *self.peek_kind() == TokenKind::Comma {
                self.read_token();
                self.skip_semicolons();
                continue;
            }
            self.expect(closer.clone())?;
            break Ok(elements);
        }
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expression> {
        let position = self.read_token().position;
        let condition = self.parse_expression(Precedence::Lowest)?;
        let consequence = self.parse_block()?;

        if *self.peek_kind() == TokenKind::Semicolon && self.peek_nth(1).kind == TokenKind::Else {
            self.read_token();
        }

        let alternative = if *self.peek_kind() == TokenKind::Else {
            self.read_token();
            if *self.peek_kind() == TokenKind::If {
                let nested = self.parse_if_expression()?;
                Some(Block(vec![Statement::Expression(nested)]))
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Expression::If(If {
            condition: Box::new(condition),
            consequence,
            alternative,
            position,
        }))
    }

    fn parse_function_literal(&mut self) -> ParseResult<Expression> {
        let position = self.read_token().position;
        self.expect(TokenKind::LeftParentheses)?;

        let mut parameters = Vec::new();
        if *self.peek_kind() != TokenKind::RightParentheses {
            loop {
                let token = self.read_token();
                match token.kind {
                    TokenKind::Identifier(name) => parameters.push(Identifier {
                        name,
                        position: token.position,
                    }),
                    found => {
                        return Err(Diagnostic::new(
                            token.position,
                            ErrorKind::UnexpectedToken {
                                expected: "a parameter name".to_string(),
                                found: found.to_string(),
                            },
                        ))
                    }
                }
                if *self.peek_kind() != TokenKind::Comma {
                    break;
                }
                self.read_token();
            }
        }
        self.expect(TokenKind::RightParentheses)?;

        let body = self.parse_block()?;
        Ok(Expression::Function(Function {
            parameters,
            body,
            position,
        }))
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if *self.peek_kind() != kind {
            return Err(self.unexpected(&format!("'{}'", kind)));
        }
        Ok(self.read_token())
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        let token = self.peek_nth(0);
        Diagnostic::new(
            token.position,
            ErrorKind::UnexpectedToken {
                expected: expected.to_string(),
                found: token.kind.to_string(),
            },
        )
    }

    fn skip_semicolons(&mut self) {
        while *self.peek_kind() == TokenKind::Semicolon {
            self.read_token();
        }
    }

    fn read_token(&mut self) -> Token {
        self.tokens
            .next()
            .cloned()
            .unwrap_or_else(|| self.end_of_file.clone())
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.clone().nth(n).unwrap_or(&self.end_of_file)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek_nth(0).kind
    }
}
