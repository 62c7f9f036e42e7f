//! Sandboxed arithmetic evaluator for the calculation path.
//!
//! Only numbers, the operators `+ - * / % ^ **`, parentheses, a fixed set
//! of single-argument functions and the constants `pi` / `e` are accepted.
//! Nothing is ever executed beyond that grammar.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Nesting bound for parentheses, unary signs and function calls
const MAX_DEPTH: usize = 64;

/// Integral results below this magnitude print without a fraction
const INTEGER_DISPLAY_LIMIT: f64 = 1e15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,

    #[error("expression nested too deeply")]
    TooDeep,
}

static FILLER_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:calculate|compute|what\s+is|what's|solve|the|result|of|please)\b|[=?!]")
        .expect("static pattern")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Strip natural-language filler to isolate the arithmetic expression.
/// Falls back to the trimmed query when nothing is left.
pub fn extract_expression(query: &str) -> String {
    let stripped = FILLER_WORDS.replace_all(query, " ");
    let expression = WHITESPACE.replace_all(&stripped, " ").trim().to_string();

    if expression.is_empty() {
        query.trim().to_string()
    } else {
        expression
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.parse_expr()?;

    if let Some(token) = parser.peek() {
        return Err(EvalError::UnexpectedToken(token.describe()));
    }
    if !value.is_finite() {
        return Err(EvalError::NonFinite);
    }
    Ok(value)
}

/// Render a result the way users expect: `8`, not `8.0`
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < INTEGER_DISPLAY_LIMIT {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LeftParen,
    RightParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("'{}'", n),
            Token::Ident(name) => format!("'{}'", name),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // exponent only when digits follow: "2e3", "2e-3"; "2e" stays 2 * e territory
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&sign) = lookahead.peek().filter(|c| **c == '+' || **c == '-') {
                        exponent.push(sign);
                        lookahead.next();
                    }
                    if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                        while let Some(&c) = lookahead.peek() {
                            if !c.is_ascii_digit() {
                                break;
                            }
                            exponent.push(c);
                            lookahead.next();
                        }
                        literal.push_str(&exponent);
                        chars = lookahead;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| EvalError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name.to_lowercase()));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' | '−' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' | '×' => {
                chars.next();
                if ch == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Caret);
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' | '÷' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LeftParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RightParen);
            }
            other => return Err(EvalError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.parse_term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    value *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let divisor = self.parse_unary()?;
                    if divisor == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.advance();
                    let divisor = self.parse_unary()?;
                    if divisor == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // unary := ('+' | '-') unary | power
    fn parse_unary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                self.enter()?;
                let value = self.parse_unary()?;
                self.leave();
                Ok(-value)
            }
            Some(Token::Plus) => {
                self.advance();
                self.enter()?;
                let value = self.parse_unary()?;
                self.leave();
                Ok(value)
            }
            _ => self.parse_power(),
        }
    }

    // power := primary ('^' unary)?   (right-associative, binds tighter than unary minus on the left)
    fn parse_power(&mut self) -> Result<f64, EvalError> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.advance();
            self.enter()?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary := number | constant | function '(' expr ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, EvalError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LeftParen) => {
                self.enter()?;
                let value = self.parse_expr()?;
                self.leave();
                self.expect_right_paren()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if let Some(value) = constant(&name) {
                    return Ok(value);
                }
                let function = function(&name).ok_or(EvalError::UnknownIdentifier(name))?;
                match self.advance() {
                    Some(Token::LeftParen) => {}
                    Some(token) => return Err(EvalError::UnexpectedToken(token.describe())),
                    None => return Err(EvalError::UnexpectedEnd),
                }
                self.enter()?;
                let argument = self.parse_expr()?;
                self.leave();
                self.expect_right_paren()?;
                Ok(function(argument))
            }
            Some(token) => Err(EvalError::UnexpectedToken(token.describe())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn expect_right_paren(&mut self) -> Result<(), EvalError> {
        match self.advance() {
            Some(Token::RightParen) => Ok(()),
            Some(token) => Err(EvalError::UnexpectedToken(token.describe())),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn function(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "sqrt" => f64::sqrt,
        "abs" => f64::abs,
        "ln" | "log" => f64::ln,
        "log10" => f64::log10,
        "exp" => f64::exp,
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" | "arcsin" => f64::asin,
        "acos" | "arccos" => f64::acos,
        "atan" | "arctan" => f64::atan,
        "floor" => f64::floor,
        "ceil" => f64::ceil,
        "round" => f64::round,
        _ => return None,
    };
    Some(f)
}
