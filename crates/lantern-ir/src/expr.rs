use std::fmt;

use serde::Serialize;

/// Expression AST used by `Function`, `Expr` and templated `Output` checks.
///
/// References are written `$(Sprite.member)` where `member` names either an
/// attribute or a variable of the sprite. Names are resolved when the check
/// is bound to a live program, never here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Literal(Literal),
    Member {
        sprite: String,
        member: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        write!(f, "{s}")
    }
}

impl Expr {
    /// All `(sprite, member)` references in evaluation order.
    pub fn references(&self) -> Vec<(&str, &str)> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Member { sprite, member } => refs.push((sprite.as_str(), member.as_str())),
            Expr::Unary { operand, .. } => operand.collect_references(refs),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(refs);
                rhs.collect_references(refs);
            }
        }
    }
}

/// Whether a piece of check text should be read as an expression rather
/// than a literal.
pub fn has_reference(text: &str) -> bool {
    text.contains("$(")
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ExprParseError {
    pub message: String,
    pub offset: usize,
}

impl ExprParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

// ── Lexer ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Member(String, String),
    Op(&'static str),
    LParen,
    RParen,
}

const OPERATORS: [&str; 17] = [
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "=", "+", "-", "*", "/", "%", "!", "(", ")",
];

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ExprParseError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut j = 0;
    // Advance `j` to the first char at or after byte offset `pos`.
    let seek = |j: &mut usize, pos: usize| {
        while *j < chars.len() && chars[*j].0 < pos {
            *j += 1;
        }
    };
    while j < chars.len() {
        let (start, c) = chars[j];
        let rest = &src[start..];
        if c.is_whitespace() {
            j += 1;
        } else if rest.starts_with("$(") {
            let close = rest
                .find(')')
                .ok_or_else(|| ExprParseError::new("unterminated reference", start))?;
            let (sprite, member) = rest[2..close]
                .split_once('.')
                .ok_or_else(|| ExprParseError::new("reference must be $(Sprite.member)", start))?;
            if sprite.trim().is_empty() || member.trim().is_empty() {
                return Err(ExprParseError::new("empty sprite or member in reference", start));
            }
            tokens.push((Token::Member(sprite.trim().to_string(), member.trim().to_string()), start));
            seek(&mut j, start + close + 1);
        } else if c == '\'' || c == '"' {
            let body = &rest[1..];
            let end = body
                .find(c)
                .ok_or_else(|| ExprParseError::new("unterminated string literal", start))?;
            tokens.push((Token::Text(body[..end].to_string()), start));
            seek(&mut j, start + 1 + end + 1);
        } else if c.is_ascii_digit() || (c == '.' && chars.get(j + 1).is_some_and(|(_, n)| n.is_ascii_digit())) {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
                .unwrap_or(rest.len());
            let text = &rest[..len];
            let n = text
                .parse::<f64>()
                .map_err(|_| ExprParseError::new(format!("invalid number '{text}'"), start))?;
            tokens.push((Token::Number(n), start));
            seek(&mut j, start + len);
        } else if c.is_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            tokens.push((Token::Ident(rest[..len].to_string()), start));
            seek(&mut j, start + len);
        } else {
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| ExprParseError::new(format!("unexpected character '{c}'"), start))?;
            let token = match *op {
                "(" => Token::LParen,
                ")" => Token::RParen,
                other => Token::Op(other),
            };
            tokens.push((token, start));
            seek(&mut j, start + op.len());
        }
    }
    Ok(tokens)
}

// ── Parser ───────────────────────────────────────────────────────────

/// Parse expression text into an [`Expr`].
pub fn parse_expr(src: &str) -> Result<Expr, ExprParseError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprParseError::new("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
    };
    let expr = parser.or()?;
    if let Some((token, offset)) = parser.tokens.get(parser.pos) {
        return Err(ExprParseError::new(format!("unexpected trailing token {token:?}"), *offset));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some((Token::Op(op), _)) => Some(*op),
            _ => None,
        }
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |(_, o)| *o)
    }

    /// Parse one left-associative precedence level.
    fn level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Parser) -> Result<Expr, ExprParseError>,
    ) -> Result<Expr, ExprParseError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek_op() {
            let Some((_, kind)) = ops.iter().find(|(s, _)| *s == op) else {
                break;
            };
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op: *kind,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, ExprParseError> {
        self.level(&[("||", BinaryOp::Or)], Parser::and)
    }

    fn and(&mut self) -> Result<Expr, ExprParseError> {
        self.level(&[("&&", BinaryOp::And)], Parser::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExprParseError> {
        self.level(
            &[("==", BinaryOp::Eq), ("=", BinaryOp::Eq), ("!=", BinaryOp::Neq)],
            Parser::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprParseError> {
        self.level(
            &[
                ("<", BinaryOp::Lt),
                ("<=", BinaryOp::Lte),
                (">", BinaryOp::Gt),
                (">=", BinaryOp::Gte),
            ],
            Parser::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprParseError> {
        self.level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Parser::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprParseError> {
        self.level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Parser::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprParseError> {
        let op = match self.peek_op() {
            Some("!") => UnaryOp::Not,
            Some("-") => UnaryOp::Neg,
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr, ExprParseError> {
        let offset = self.offset();
        let Some((token, _)) = self.tokens.get(self.pos).cloned() else {
            return Err(ExprParseError::new("unexpected end of expression", offset));
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Text(s) => Ok(Expr::Literal(Literal::Text(s))),
            Token::Member(sprite, member) => Ok(Expr::Member { sprite, member }),
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                other => Err(ExprParseError::new(format!("unknown identifier '{other}'"), offset)),
            },
            Token::LParen => {
                let inner = self.or()?;
                match self.tokens.get(self.pos) {
                    Some((Token::RParen, _)) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ExprParseError::new("expected ')'", self.offset())),
                }
            }
            other => Err(ExprParseError::new(format!("unexpected token {other:?}"), offset)),
        }
    }
}
