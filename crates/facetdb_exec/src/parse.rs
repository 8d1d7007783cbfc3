//! Statement parsing and predicate evaluation for the in-memory executor.
//!
//! This is not a general SQL parser. It covers exactly the parameterized
//! statement shapes the engine emits: single-table SELECT / INSERT /
//! UPDATE / DELETE with `?` placeholders, and WHERE clauses built from
//! `col OP ?`, `UPPER(col) OP ?`, `col IS [NOT] NULL`, `col [NOT] IN
//! (?, ...)`, `col LIKE ?`, parenthesized groups, and `AND`/`OR` with
//! the usual precedence (AND binds tighter).

use crate::error::{ExecError, ExecResult};
use facetdb_schema::FieldValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stored row: column name to value.
pub(crate) type MemRow = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Placeholder,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
}

fn tokenize(sql: &str) -> ExecResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '?' => {
                chars.next();
                tokens.push(Token::Placeholder);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Le);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ExecError::syntax(format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(tokens)
}

/// Comparison operator in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpSym {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed WHERE expression. Bind values are referenced by index into
/// the statement's bind list.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        column: String,
        fold: bool,
        op: CmpSym,
        bind: usize,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    InList {
        column: String,
        fold: bool,
        binds: Vec<usize>,
        negated: bool,
    },
    Like {
        column: String,
        fold: bool,
        bind: usize,
    },
}

/// Right-hand side of an UPDATE assignment.
#[derive(Debug, Clone)]
pub(crate) enum SetValue {
    /// `col = ?`
    Bind(usize),
    /// `col = col + ?` (self-referential increment)
    Increment(usize),
}

/// A parsed statement.
#[derive(Debug, Clone)]
pub(crate) enum Statement {
    Select {
        columns: Vec<String>,
        table: String,
        filter: Option<Expr>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        binds: Vec<usize>,
    },
    Update {
        table: String,
        sets: Vec<(String, SetValue)>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
}

/// A statement plus its placeholder count, for bind validation.
#[derive(Debug, Clone)]
pub(crate) struct ParsedStatement {
    pub statement: Statement,
    pub placeholders: usize,
}

/// Parses one statement.
pub(crate) fn parse_statement(sql: &str) -> ExecResult<ParsedStatement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        placeholders: 0,
    };
    let statement = parser.statement()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExecError::syntax("trailing tokens after statement"));
    }
    Ok(ParsedStatement {
        statement,
        placeholders: parser.placeholders,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    placeholders: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> ExecResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ExecError::syntax("unexpected end of statement"))?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(word))
    }

    fn expect_keyword(&mut self, word: &str) -> ExecResult<()> {
        match self.next()? {
            Token::Ident(s) if s.eq_ignore_ascii_case(word) => Ok(()),
            other => Err(ExecError::syntax(format!("expected {word}, got {other:?}"))),
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> ExecResult<String> {
        match self.next()? {
            Token::Ident(s) => Ok(s),
            other => Err(ExecError::syntax(format!(
                "expected identifier, got {other:?}"
            ))),
        }
    }

    fn expect(&mut self, token: &Token) -> ExecResult<()> {
        let got = self.next()?;
        if &got == token {
            Ok(())
        } else {
            Err(ExecError::syntax(format!(
                "expected {token:?}, got {got:?}"
            )))
        }
    }

    fn placeholder(&mut self) -> ExecResult<usize> {
        self.expect(&Token::Placeholder)?;
        let index = self.placeholders;
        self.placeholders += 1;
        Ok(index)
    }

    fn statement(&mut self) -> ExecResult<Statement> {
        if self.eat_keyword("SELECT") {
            self.select()
        } else if self.eat_keyword("INSERT") {
            self.insert()
        } else if self.eat_keyword("UPDATE") {
            self.update()
        } else if self.eat_keyword("DELETE") {
            self.delete()
        } else {
            Err(ExecError::syntax("expected SELECT, INSERT, UPDATE or DELETE"))
        }
    }

    fn select(&mut self) -> ExecResult<Statement> {
        let mut columns = vec![self.ident()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            columns.push(self.ident()?);
        }
        self.expect_keyword("FROM")?;
        let table = self.ident()?;
        let filter = self.optional_where()?;
        Ok(Statement::Select {
            columns,
            table,
            filter,
        })
    }

    fn insert(&mut self) -> ExecResult<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut columns = vec![self.ident()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            columns.push(self.ident()?);
        }
        self.expect(&Token::RParen)?;
        self.expect_keyword("VALUES")?;
        self.expect(&Token::LParen)?;
        let mut binds = vec![self.placeholder()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            binds.push(self.placeholder()?);
        }
        self.expect(&Token::RParen)?;
        if binds.len() != columns.len() {
            return Err(ExecError::syntax(
                "INSERT column and value counts differ",
            ));
        }
        Ok(Statement::Insert {
            table,
            columns,
            binds,
        })
    }

    fn update(&mut self) -> ExecResult<Statement> {
        let table = self.ident()?;
        self.expect_keyword("SET")?;
        let mut sets = vec![self.assignment()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            sets.push(self.assignment()?);
        }
        let filter = self.optional_where()?;
        Ok(Statement::Update {
            table,
            sets,
            filter,
        })
    }

    fn assignment(&mut self) -> ExecResult<(String, SetValue)> {
        let column = self.ident()?;
        self.expect(&Token::Eq)?;
        // `col = col + ?` increments in place; anything else is a bind.
        if let Some(Token::Ident(rhs)) = self.peek() {
            if *rhs == column {
                self.pos += 1;
                self.expect(&Token::Plus)?;
                let bind = self.placeholder()?;
                return Ok((column, SetValue::Increment(bind)));
            }
            return Err(ExecError::syntax(format!(
                "unsupported assignment source {rhs}"
            )));
        }
        let bind = self.placeholder()?;
        Ok((column, SetValue::Bind(bind)))
    }

    fn delete(&mut self) -> ExecResult<Statement> {
        self.expect_keyword("FROM")?;
        let table = self.ident()?;
        let filter = self.optional_where()?;
        Ok(Statement::Delete { table, filter })
    }

    fn optional_where(&mut self) -> ExecResult<Option<Expr>> {
        if self.eat_keyword("WHERE") {
            Ok(Some(self.or_expr()?))
        } else {
            Ok(None)
        }
    }

    fn or_expr(&mut self) -> ExecResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("OR") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> ExecResult<Expr> {
        let mut left = self.primary()?;
        while self.eat_keyword("AND") {
            let right = self.primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> ExecResult<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        let fold = self.eat_keyword("UPPER");
        let column = if fold {
            self.expect(&Token::LParen)?;
            let column = self.ident()?;
            self.expect(&Token::RParen)?;
            column
        } else {
            self.ident()?
        };

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull { column, negated });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(&Token::LParen)?;
            let mut binds = vec![self.placeholder()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                binds.push(self.placeholder()?);
            }
            self.expect(&Token::RParen)?;
            return Ok(Expr::InList {
                column,
                fold,
                binds,
                negated,
            });
        }
        if negated {
            return Err(ExecError::syntax("NOT is only supported before IN"));
        }

        if self.eat_keyword("LIKE") {
            let bind = self.placeholder()?;
            return Ok(Expr::Like { column, fold, bind });
        }

        let op = match self.next()? {
            Token::Eq => CmpSym::Eq,
            Token::Ne => CmpSym::Ne,
            Token::Lt => CmpSym::Lt,
            Token::Le => CmpSym::Le,
            Token::Gt => CmpSym::Gt,
            Token::Ge => CmpSym::Ge,
            other => {
                return Err(ExecError::syntax(format!(
                    "expected comparison operator, got {other:?}"
                )));
            }
        };
        let bind = self.placeholder()?;
        Ok(Expr::Cmp {
            column,
            fold,
            op,
            bind,
        })
    }
}

fn column_value(row: &MemRow, column: &str, fold: bool) -> FieldValue {
    let value = row.get(column).cloned().unwrap_or(FieldValue::Null);
    if fold {
        value.uppercased()
    } else {
        value
    }
}

/// Evaluates a predicate against one row.
pub(crate) fn eval(expr: &Expr, row: &MemRow, binds: &[FieldValue]) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, row, binds) && eval(b, row, binds),
        Expr::Or(a, b) => eval(a, row, binds) || eval(b, row, binds),
        Expr::Cmp {
            column,
            fold,
            op,
            bind,
        } => {
            let left = column_value(row, column, *fold);
            let right = &binds[*bind];
            match left.compare(right) {
                Some(ord) => match op {
                    CmpSym::Eq => ord == Ordering::Equal,
                    CmpSym::Ne => ord != Ordering::Equal,
                    CmpSym::Lt => ord == Ordering::Less,
                    CmpSym::Le => ord != Ordering::Greater,
                    CmpSym::Gt => ord == Ordering::Greater,
                    CmpSym::Ge => ord != Ordering::Less,
                },
                // Null or incomparable types never match, as in SQL.
                None => false,
            }
        }
        Expr::IsNull { column, negated } => {
            let is_null = column_value(row, column, false).is_null();
            is_null != *negated
        }
        Expr::InList {
            column,
            fold,
            binds: indices,
            negated,
        } => {
            let left = column_value(row, column, *fold);
            if left.is_null() {
                return false;
            }
            let found = indices
                .iter()
                .any(|i| left.compare(&binds[*i]) == Some(Ordering::Equal));
            found != *negated
        }
        Expr::Like { column, fold, bind } => {
            let left = column_value(row, column, *fold);
            match (left.as_text(), binds[*bind].as_text()) {
                (Some(text), Some(pattern)) => like_match(text, pattern),
                _ => false,
            }
        }
    }
}

/// SQL LIKE matching with `%` (any run) and `_` (any single character).
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    fn matches(text: &[char], pattern: &[char]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some('%') => (0..=text.len()).any(|skip| matches(&text[skip..], &pattern[1..])),
            Some('_') => !text.is_empty() && matches(&text[1..], &pattern[1..]),
            Some(p) => text.first() == Some(p) && matches(&text[1..], &pattern[1..]),
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    matches(&text, &pattern)
}
