use crate::{flatten, lexer::Token};
use anyhow::{bail, Result};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    slice::Iter,
};

pub type Identifier = String;

pub type Block = Vec<Statement>;

pub type Program = Vec<Statement>;

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Let(Identifier, Expression),
    Return(Expression),
    Expression(Expression),
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Let(name, value) => write!(f, "let {} = {};", name, value),
            Self::Return(value) => write!(f, "return {};", value),
            Self::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    LessThan,
    GreaterThan,
    Equal,
    NotEqual,
    Not,
    Negate,
}

impl Operator {
    pub fn from_token(token: &Token, prefix: bool) -> Result<Self> {
        if prefix {
            return Ok(match token {
                Token::Bang => Self::Not,
                Token::Minus => Self::Negate,
                token => bail!("unknown prefix operator: {:?}", token),
            });
        }
        Ok(match token {
            Token::Plus => Self::Add,
            Token::Minus => Self::Subtract,
            Token::Asterisk => Self::Multiply,
            Token::Slash => Self::Divide,
            Token::LessThan => Self::LessThan,
            Token::GreaterThan => Self::GreaterThan,
            Token::Equal => Self::Equal,
            Token::NotEqual => Self::NotEqual,
            token => bail!("unknown infix operator: {:?}", token),
        })
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let operator = match self {
            Self::Add => "+",
            Self::Subtract | Self::Negate => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Not => "!",
        };
        write!(f, "{}", operator)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Integer(i64),
    String(String),
    Boolean(bool),
    Prefix(Operator, Box<Expression>),
    Infix(Box<Expression>, Operator, Box<Expression>),
    If(Box<Expression>, Block, Option<Block>),
    Function(Vec<Identifier>, Block),
    Call(Box<Expression>, Vec<Expression>),
    Array(Vec<Expression>),
    Hash(Vec<(Expression, Expression)>),
    Index(Box<Expression>, Box<Expression>),
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let expression = match self {
            Self::Identifier(name) => name.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::String(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Prefix(operator, right) => {
                format!("({}{})", operator, right)
            }
            Self::Infix(left, operator, right) => {
                format!("({} {} {})", left, operator, right)
            }
            Self::If(condition, consequence, alternative) => {
                let mut rendered = format!(
                    "if {} {{ {} }}",
                    condition,
                    flatten(consequence, " ")
                );
                if let Some(alternative) = alternative {
                    rendered.push_str(&format!(
                        " else {{ {} }}",
                        flatten(alternative, " ")
                    ));
                }
                rendered
            }
            Self::Function(parameters, body) => {
                format!(
                    "fn({}) {{ {} }}",
                    flatten(parameters, ", "),
                    flatten(body, " ")
                )
            }
            Self::Call(function, arguments) => {
                format!("{}({})", function, flatten(arguments, ", "))
            }
            Self::Array(elements) => {
                format!("[{}]", flatten(elements, ", "))
            }
            Self::Hash(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Self::Index(left, index) => format!("({}[{}])", left, index),
        };
        write!(f, "{}", expression)
    }
}

#[derive(Debug, PartialEq, PartialOrd, Copy, Clone)]
pub enum Precedence {
    Lowest,
    Equals,
    LessThanGreaterThan,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

impl From<&Token> for Precedence {
    fn from(token: &Token) -> Self {
        match token {
            Token::Equal => Self::Equals,
            Token::NotEqual => Self::Equals,
            Token::LessThan => Self::LessThanGreaterThan,
            Token::GreaterThan => Self::LessThanGreaterThan,
            Token::Plus => Self::Sum,
            Token::Minus => Self::Sum,
            Token::Slash => Self::Product,
            Token::Asterisk => Self::Product,
            Token::LeftParentheses => Self::Call,
            Token::LeftBracket => Self::Index,
            _ => Self::Lowest,
        }
    }
}

pub struct Parser<'a> {
    pub tokens: Iter<'a, Token>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens: tokens.iter(),
        }
    }

    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program::new();
        while let Some(statement) = self.parse_statement()? {
            program.push(statement);
        }
        Ok(program)
    }

    pub fn parse_statement(&mut self) -> Result<Option<Statement>> {
        Ok(match self.peek_nth(0) {
            Token::EndOfFile => None,
            Token::Let => Some(self.parse_let_statement()?),
            Token::Return => Some(self.parse_return_statement()?),
            _ => Some(self.parse_expression_statement()?),
        })
    }

    fn parse_let_statement(&mut self) -> Result<Statement> {
        self.read_token();
        let name = match self.read_token() {
            Token::Identifier(name) => name.to_string(),
            token => bail!("Expected identifier after 'let', found {:?}", token),
        };
        if !matches!(self.read_token(), Token::Assign) {
            bail!("Expected '=' after 'let {}'", name);
        }
        let value = self.parse_expression(Precedence::Lowest)?;
        if matches!(self.peek_nth(0), Token::Semicolon) {
            self.read_token();
        }
        Ok(Statement::Let(name, value))
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        self.read_token();
        let value = self.parse_expression(Precedence::Lowest)?;
        if matches!(self.peek_nth(0), Token::Semicolon) {
            self.read_token();
        }
        Ok(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let expression = self.parse_expression(Precedence::Lowest)?;
        if matches!(self.peek_nth(0), Token::Semicolon) {
            self.read_token();
        }
        Ok(Statement::Expression(expression))
    }

    fn parse_expression(
        &mut self,
        precedence: Precedence,
    ) -> Result<Expression> {
        let mut advance = true;
        let mut expression = match self.peek_nth(0) {
            Token::Identifier(identifier) => {
                Expression::Identifier(identifier.to_string())
            }
            Token::Integer(value) => Expression::Integer(*value),
            Token::StringLiteral(string) => {
                Expression::String(string.to_string())
            }
            Token::True => Expression::Boolean(true),
            Token::False => Expression::Boolean(false),
            Token::Bang | Token::Minus => {
                advance = false;
                self.parse_prefix_expression()?
            }
            Token::LeftParentheses => {
                advance = false;
                self.parse_grouped_expression()?
            }
            Token::LeftBracket => {
                advance = false;
                self.parse_array_literal()?
            }
            Token::LeftBrace => {
                advance = false;
                self.parse_hash_literal()?
            }
            Token::If => {
                advance = false;
                self.parse_if_expression()?
            }
            Token::Function => {
                advance = false;
                self.parse_function_literal()?
            }
            Token::EndOfFile => {
                bail!("Unexpected end of file")
            }
            token => bail!("Token not valid for an expression: {:?}", token),
        };

        if advance {
            self.read_token();
        }

        while self.peek_nth(0) != &Token::Semicolon
            && precedence < Precedence::from(self.peek_nth(0))
        {
            match self.peek_nth(0) {
                Token::Plus
                | Token::Minus
                | Token::Slash
                | Token::Asterisk
                | Token::Equal
                | Token::NotEqual
                | Token::LessThan
                | Token::GreaterThan => {
                    expression =
                        self.parse_infix_expression(expression.clone())?;
                }
                Token::LeftParentheses => {
                    expression =
                        self.parse_call_expression(expression.clone())?;
                }
                Token::LeftBracket => {
                    expression =
                        self.parse_index_expression(expression.clone())?;
                }
                _ => return Ok(expression),
            };
        }

        Ok(expression)
    }

    fn parse_prefix_expression(&mut self) -> Result<Expression> {
        let operator = Operator::from_token(self.peek_nth(0), true)?;
        self.read_token();
        Ok(Expression::Prefix(
            operator,
            Box::new(self.parse_expression(Precedence::Prefix)?),
        ))
    }

    fn parse_infix_expression(
        &mut self,
        left_expression: Expression,
    ) -> Result<Expression> {
        let operator = Operator::from_token(self.peek_nth(0), false)?;
        let precedence = Precedence::from(self.peek_nth(0));
        self.read_token();
        Ok(Expression::Infix(
            Box::new(left_expression),
            operator,
            Box::new(self.parse_expression(precedence)?),
        ))
    }

    fn parse_grouped_expression(&mut self) -> Result<Expression> {
        self.read_token();
        let expression = self.parse_expression(Precedence::Lowest)?;
        if !matches!(self.read_token(), Token::RightParentheses) {
            bail!("Expected ')' after grouped expression");
        }
        Ok(expression)
    }

    fn parse_if_expression(&mut self) -> Result<Expression> {
        self.read_token();
        if !matches!(self.read_token(), Token::LeftParentheses) {
            bail!("Expected '(' after 'if'");
        }
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !matches!(self.read_token(), Token::RightParentheses) {
            bail!("Expected ')' after if condition");
        }
        let consequence = self.parse_block()?;
        let alternative = if matches!(self.peek_nth(0), Token::Else) {
            self.read_token();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Expression::If(Box::new(condition), consequence, alternative))
    }

    fn parse_function_literal(&mut self) -> Result<Expression> {
        self.read_token();
        if !matches!(self.read_token(), Token::LeftParentheses) {
            bail!("Expected '(' after 'fn'");
        }
        let mut parameters = Vec::new();
        while self.peek_nth(0) != &Token::RightParentheses {
            match self.read_token() {
                Token::Identifier(name) => parameters.push(name.to_string()),
                token => bail!("Expected parameter name, found {:?}", token),
            }
            if matches!(self.peek_nth(0), Token::Comma) {
                self.read_token();
            }
        }
        self.read_token();
        let body = self.parse_block()?;
        Ok(Expression::Function(parameters, body))
    }

    fn parse_block(&mut self) -> Result<Block> {
        if !matches!(self.read_token(), Token::LeftBrace) {
            bail!("Expected '{{' to open a block");
        }
        let mut block = Block::new();
        while self.peek_nth(0) != &Token::RightBrace {
            match self.parse_statement()? {
                Some(statement) => block.push(statement),
                None => bail!("Unexpected end of file in block"),
            }
        }
        self.read_token();
        Ok(block)
    }

    fn parse_array_literal(&mut self) -> Result<Expression> {
        let elements = self.parse_expression_list(&Token::RightBracket)?;
        Ok(Expression::Array(elements))
    }

    fn parse_hash_literal(&mut self) -> Result<Expression> {
        self.read_token();
        let mut pairs = Vec::new();
        while self.peek_nth(0) != &Token::RightBrace {
            let key = self.parse_expression(Precedence::Lowest)?;
            if !matches!(self.read_token(), Token::Colon) {
                bail!("Expected ':' after hash key");
            }
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if matches!(self.peek_nth(0), Token::Comma) {
                self.read_token();
            }
        }
        self.read_token();
        Ok(Expression::Hash(pairs))
    }

    fn parse_call_expression(
        &mut self,
        expression: Expression,
    ) -> Result<Expression> {
        let arguments = self.parse_expression_list(&Token::RightParentheses)?;
        Ok(Expression::Call(Box::new(expression), arguments))
    }

    fn parse_index_expression(
        &mut self,
        expression: Expression,
    ) -> Result<Expression> {
        self.read_token();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !matches!(self.read_token(), Token::RightBracket) {
            bail!("Expected ']' after index expression");
        }
        Ok(Expression::Index(Box::new(expression), Box::new(index)))
    }

    fn parse_expression_list(&mut self, end: &Token) -> Result<Vec<Expression>> {
        self.read_token();
        let mut expressions = Vec::new();
        while self.peek_nth(0) != end {
            expressions.push(self.parse_expression(Precedence::Lowest)?);
            if matches!(self.peek_nth(0), Token::Comma) {
                self.read_token();
            }
        }
        self.read_token();
        Ok(expressions)
    }

    fn read_token(&mut self) -> &Token {
        self.tokens.next().unwrap_or(&Token::EndOfFile)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.clone().nth(n).unwrap_or(&Token::EndOfFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lexer;

    fn parse_source(input: &str) -> Result<Program> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Parser::new(&tokens);
        parser.parse()
    }

    #[test]
    fn test_let_statements() -> Result<()> {
        let program = parse_source("let x = 5; let y = x;")?;
        assert_eq!(
            program,
            vec![
                Statement::Let("x".to_string(), Expression::Integer(5)),
                Statement::Let(
                    "y".to_string(),
                    Expression::Identifier("x".to_string())
                ),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_operator_precedence() -> Result<()> {
        let tests = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b * c", "((a * b) * c)"),
            ("a + b / c", "(a + (b / c))"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("3 + 4 * 5 == 3 * 1 + 4 * 5", "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))"),
            ("(5 + 5) * 2", "((5 + 5) * 2)"),
            ("2 / (5 + 5)", "(2 / (5 + 5))"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
            ("add(a * b[2], b[1], 2 * [1, 2][1])", "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))"),
        ];

        for (input, expected) in tests {
            let program = parse_source(input)?;
            let rendered = program
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join("");
            assert_eq!(rendered, expected, "Failed for input: {}", input);
        }

        Ok(())
    }

    #[test]
    fn test_if_expression() -> Result<()> {
        let program = parse_source("if (x < y) { x } else { y }")?;
        assert_eq!(
            program,
            vec![Statement::Expression(Expression::If(
                Box::new(Expression::Infix(
                    Box::new(Expression::Identifier("x".to_string())),
                    Operator::LessThan,
                    Box::new(Expression::Identifier("y".to_string())),
                )),
                vec![Statement::Expression(Expression::Identifier(
                    "x".to_string()
                ))],
                Some(vec![Statement::Expression(Expression::Identifier(
                    "y".to_string()
                ))]),
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_function_literal() -> Result<()> {
        let program = parse_source("fn(x, y) { x + y; }")?;
        assert_eq!(
            program,
            vec![Statement::Expression(Expression::Function(
                vec!["x".to_string(), "y".to_string()],
                vec![Statement::Expression(Expression::Infix(
                    Box::new(Expression::Identifier("x".to_string())),
                    Operator::Add,
                    Box::new(Expression::Identifier("y".to_string())),
                ))],
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_call_expression() -> Result<()> {
        let program = parse_source("add(1, 2 * 3);")?;
        assert_eq!(
            program,
            vec![Statement::Expression(Expression::Call(
                Box::new(Expression::Identifier("add".to_string())),
                vec![
                    Expression::Integer(1),
                    Expression::Infix(
                        Box::new(Expression::Integer(2)),
                        Operator::Multiply,
                        Box::new(Expression::Integer(3)),
                    ),
                ],
            ))]
        );
        Ok(())
    }

    #[test]
    fn test_array_and_hash_literals() -> Result<()> {
        let program = parse_source(r#"[1, "two"]; {"one": 1, "two": 2}"#)?;
        assert_eq!(
            program,
            vec![
                Statement::Expression(Expression::Array(vec![
                    Expression::Integer(1),
                    Expression::String("two".to_string()),
                ])),
                Statement::Expression(Expression::Hash(vec![
                    (
                        Expression::String("one".to_string()),
                        Expression::Integer(1)
                    ),
                    (
                        Expression::String("two".to_string()),
                        Expression::Integer(2)
                    ),
                ])),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_empty_hash_literal() -> Result<()> {
        let program = parse_source("{}")?;
        assert_eq!(
            program,
            vec![Statement::Expression(Expression::Hash(vec![]))]
        );
        Ok(())
    }

    #[test]
    fn test_return_statement() -> Result<()> {
        let program = parse_source("return 5 + 5;")?;
        assert_eq!(
            program,
            vec![Statement::Return(Expression::Infix(
                Box::new(Expression::Integer(5)),
                Operator::Add,
                Box::new(Expression::Integer(5)),
            ))]
        );
        Ok(())
    }
}
