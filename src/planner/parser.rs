//! Recursive-descent parser for the supported SQL subset.
//!
//! Tokens come from `sqlparser`'s tokenizer (SQLite dialect); the grammar
//! itself is handled here so that every statement maps directly onto a
//! `Statement` and errors point at the offending token.

use sqlparser::{
    dialect::SQLiteDialect,
    tokenizer::{Location, Token, TokenWithSpan, Tokenizer, Word},
};

use crate::{
    planner::{
        error::PlannerError,
        expression::{BinaryOperator, ColumnRef, Expression, FunctionExpression, UnaryOperator},
        statement::{
            Assignment, ColumnDefinition, CreateIndexPlan, CreateTablePlan, DeletePlan, DropIndexPlan,
            DropTablePlan, InsertPlan, OrderByItem, SelectItem, SelectPlan, Statement, TableRef,
            UpdatePlan,
        },
    },
    types::{
        error::DatabaseError,
        value::{DataType, Value},
    },
};

/// Words that cannot be used as bare identifiers or implicit aliases.
const RESERVED: &[&str] = &[
    "AND", "AS", "ASC", "BETWEEN", "BY", "CREATE", "DEFAULT", "DELETE", "DESC", "DROP", "FALSE",
    "FROM", "IN", "INDEX", "INSERT", "INTO", "IS", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON",
    "OR", "ORDER", "PRIMARY", "SELECT", "SET", "TABLE", "TRUE", "UNIQUE", "UPDATE", "VALUES",
    "WHERE",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParser;

impl SqlParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse exactly one statement, optionally followed by `;`.
    pub fn parse(&self, sql: &str) -> Result<Statement, DatabaseError> {
        let mut stream = TokenStream::new(sql)?;
        while stream.consume_token(&Token::SemiColon) {}
        let statement = stream.parse_statement()?;
        while stream.consume_token(&Token::SemiColon) {}
        if !stream.is_eof() {
            return Err(stream.unexpected("end of statement").into());
        }
        Ok(statement)
    }

    /// Parse a `;`-separated script. Either every statement parses or none
    /// is returned.
    pub fn parse_script(&self, sql: &str) -> Result<Vec<Statement>, DatabaseError> {
        let mut stream = TokenStream::new(sql)?;
        let mut statements = Vec::new();
        loop {
            while stream.consume_token(&Token::SemiColon) {}
            if stream.is_eof() {
                break;
            }
            statements.push(stream.parse_statement()?);
            if !stream.is_eof() && !stream.check_token(&Token::SemiColon) {
                return Err(stream.unexpected("';' or end of script").into());
            }
        }
        Ok(statements)
    }
}

struct TokenStream {
    tokens: Vec<TokenWithSpan>,
    pos: usize,
    end: Location,
}

impl TokenStream {
    fn new(sql: &str) -> Result<Self, PlannerError> {
        let dialect = SQLiteDialect {};
        let tokens: Vec<TokenWithSpan> = Tokenizer::new(&dialect, sql)
            .tokenize_with_location()?
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
            .collect();
        let end = tokens
            .last()
            .map(|t| t.span.end)
            .unwrap_or(Location { line: 1, column: 1 });
        Ok(Self {
            tokens,
            pos: 0,
            end,
        })
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn location(&self) -> Location {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.end)
    }

    fn unexpected(&self, expected: &str) -> PlannerError {
        PlannerError::unexpected(self.location(), expected, self.peek())
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| is_keyword(t, keyword))
    }

    fn check_keyword_nth(&self, n: usize, keyword: &str) -> bool {
        self.peek_nth(n).is_some_and(|t| is_keyword(t, keyword))
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), PlannerError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn check_token(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn consume_token(&mut self, token: &Token) -> bool {
        if self.check_token(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> Result<(), PlannerError> {
        if self.consume_token(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{token}'")))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, PlannerError> {
        match self.peek() {
            Some(Token::Word(word)) if is_identifier(word) => {
                let name = word.value.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>, PlannerError> {
        self.expect_token(&Token::LParen)?;
        let mut names = vec![self.expect_identifier()?];
        while self.consume_token(&Token::Comma) {
            names.push(self.expect_identifier()?);
        }
        self.expect_token(&Token::RParen)?;
        Ok(names)
    }

    fn parse_if_not_exists(&mut self) -> Result<bool, PlannerError> {
        if self.consume_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_if_exists(&mut self) -> Result<bool, PlannerError> {
        if self.consume_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_statement(&mut self) -> Result<Statement, PlannerError> {
        if self.consume_keyword("CREATE") {
            if self.consume_keyword("TABLE") {
                return self.parse_create_table_stmt();
            }
            let unique = self.consume_keyword("UNIQUE");
            if self.consume_keyword("INDEX") {
                return self.parse_create_index_stmt(unique);
            }
            return Err(self.unexpected(if unique { "INDEX" } else { "TABLE or INDEX" }));
        }
        if self.consume_keyword("DROP") {
            if self.consume_keyword("TABLE") {
                let if_exists = self.parse_if_exists()?;
                let table_name = self.expect_identifier()?;
                return Ok(Statement::DropTable(DropTablePlan {
                    table_name,
                    if_exists,
                }));
            }
            if self.consume_keyword("INDEX") {
                let if_exists = self.parse_if_exists()?;
                let index_name = self.expect_identifier()?;
                return Ok(Statement::DropIndex(DropIndexPlan {
                    index_name,
                    if_exists,
                }));
            }
            return Err(self.unexpected("TABLE or INDEX"));
        }
        if self.consume_keyword("INSERT") {
            return self.parse_insert_stmt();
        }
        if self.consume_keyword("SELECT") {
            return self.parse_select_stmt().map(Statement::Select);
        }
        if self.consume_keyword("UPDATE") {
            return self.parse_update_stmt();
        }
        if self.consume_keyword("DELETE") {
            return self.parse_delete_stmt();
        }
        Err(self.unexpected("a statement"))
    }

    fn parse_create_table_stmt(&mut self) -> Result<Statement, PlannerError> {
        let if_not_exists = self.parse_if_not_exists()?;
        let table_name = self.expect_identifier()?;
        self.expect_token(&Token::LParen)?;
        let mut columns = vec![self.parse_column_def()?];
        while self.consume_token(&Token::Comma) {
            columns.push(self.parse_column_def()?);
        }
        self.expect_token(&Token::RParen)?;
        Ok(Statement::CreateTable(CreateTablePlan {
            table_name,
            columns,
            if_not_exists,
        }))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDefinition, PlannerError> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_data_type()?;
        let mut column = ColumnDefinition::new(name, data_type);
        loop {
            if self.consume_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                column.primary_key = true;
                column.nullable = false;
            } else if self.consume_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.nullable = false;
            } else if self.consume_keyword("NULL") {
                if column.primary_key {
                    return Err(self.unexpected("a constraint other than NULL on a primary key"));
                }
                column.nullable = true;
            } else if self.consume_keyword("UNIQUE") {
                column.unique = true;
            } else if self.consume_keyword("DEFAULT") {
                column.default_value = Some(self.parse_literal_value()?);
            } else {
                break;
            }
        }
        Ok(column)
    }

    fn parse_data_type(&mut self) -> Result<DataType, PlannerError> {
        let location = self.location();
        let name = match self.peek() {
            Some(Token::Word(word)) if word.quote_style.is_none() => word.value.to_ascii_uppercase(),
            _ => return Err(self.unexpected("a column type")),
        };
        self.pos += 1;
        let data_type = DataType::from_name(&name)
            .ok_or(PlannerError::UnsupportedDataType { location, name: name.clone() })?;
        if name == "DOUBLE" {
            self.consume_keyword("PRECISION");
        }
        // Length and precision arguments are accepted and ignored
        if self.consume_token(&Token::LParen) {
            loop {
                if !matches!(self.peek(), Some(Token::Number(_, _))) {
                    return Err(self.unexpected("a type length"));
                }
                self.pos += 1;
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen)?;
        }
        Ok(data_type)
    }

    /// Literal with an optional sign, as allowed after DEFAULT.
    fn parse_literal_value(&mut self) -> Result<Value, PlannerError> {
        let start = self.pos;
        let negative = if self.consume_token(&Token::Minus) {
            true
        } else {
            self.consume_token(&Token::Plus);
            false
        };
        match self.parse_primary()? {
            Expression::Literal(value) if !negative => Ok(value),
            Expression::Literal(Value::Integer(n)) => Ok(Value::Integer(n.wrapping_neg())),
            Expression::Literal(Value::Real(r)) => Ok(Value::Real(-r)),
            _ => {
                self.pos = start;
                Err(self.unexpected("a literal"))
            }
        }
    }

    fn parse_create_index_stmt(&mut self, unique: bool) -> Result<Statement, PlannerError> {
        let if_not_exists = self.parse_if_not_exists()?;
        let index_name = self.expect_identifier()?;
        self.expect_keyword("ON")?;
        let table_name = self.expect_identifier()?;
        let columns = self.parse_identifier_list()?;
        Ok(Statement::CreateIndex(CreateIndexPlan {
            index_name,
            table_name,
            columns,
            unique,
            if_not_exists,
        }))
    }

    fn parse_insert_stmt(&mut self) -> Result<Statement, PlannerError> {
        self.expect_keyword("INTO")?;
        let table_name = self.expect_identifier()?;
        let columns = if self.check_token(&Token::LParen) {
            Some(self.parse_identifier_list()?)
        } else {
            None
        };
        self.expect_keyword("VALUES")?;
        let mut values = vec![self.parse_value_row()?];
        while self.consume_token(&Token::Comma) {
            values.push(self.parse_value_row()?);
        }
        Ok(Statement::Insert(InsertPlan {
            table_name,
            columns,
            values,
        }))
    }

    fn parse_value_row(&mut self) -> Result<Vec<Expression>, PlannerError> {
        self.expect_token(&Token::LParen)?;
        let row = self.parse_expr_list()?;
        self.expect_token(&Token::RParen)?;
        Ok(row)
    }

    fn parse_select_stmt(&mut self) -> Result<SelectPlan, PlannerError> {
        let mut projection = vec![self.parse_select_item()?];
        while self.consume_token(&Token::Comma) {
            projection.push(self.parse_select_item()?);
        }

        let from = if self.consume_keyword("FROM") {
            let name = self.expect_identifier()?;
            let alias = self.parse_alias()?;
            Some(TableRef { name, alias })
        } else {
            None
        };

        let condition = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.consume_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expression = self.parse_expr()?;
                let descending = if self.consume_keyword("DESC") {
                    true
                } else {
                    self.consume_keyword("ASC");
                    false
                };
                order_by.push(OrderByItem {
                    expression,
                    descending,
                });
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
        }

        let (mut limit, mut offset) = (None, None);
        if self.consume_keyword("LIMIT") {
            limit = Some(self.parse_expr()?);
            if self.consume_keyword("OFFSET") {
                offset = Some(self.parse_expr()?);
            } else if self.consume_token(&Token::Comma) {
                // LIMIT offset, count
                offset = limit.take();
                limit = Some(self.parse_expr()?);
            }
        }

        Ok(SelectPlan {
            projection,
            from,
            condition,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, PlannerError> {
        if self.consume_token(&Token::Mul) {
            return Ok(SelectItem::Wildcard);
        }
        let expression = self.parse_expr()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expression { expression, alias })
    }

    fn parse_alias(&mut self) -> Result<Option<String>, PlannerError> {
        if self.consume_keyword("AS") {
            return self.expect_identifier().map(Some);
        }
        match self.peek() {
            Some(Token::Word(word)) if is_identifier(word) => {
                let alias = word.value.clone();
                self.pos += 1;
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    fn parse_update_stmt(&mut self) -> Result<Statement, PlannerError> {
        let table_name = self.expect_identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            if !self.consume_token(&Token::Eq) {
                self.expect_token(&Token::DoubleEq)?;
            }
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        let condition = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update(UpdatePlan {
            table_name,
            assignments,
            condition,
        }))
    }

    fn parse_delete_stmt(&mut self) -> Result<Statement, PlannerError> {
        self.expect_keyword("FROM")?;
        let table_name = self.expect_identifier()?;
        let condition = if self.consume_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(DeletePlan {
            table_name,
            condition,
        }))
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expression>, PlannerError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.consume_token(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // Precedence, loosest first: OR, AND, NOT, equality/IS/IN/LIKE/BETWEEN,
    // relational, additive, multiplicative, ||, unary.

    fn parse_expr(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_and()?;
        while self.consume_keyword("OR") {
            let right = self.parse_and()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_not()?;
        while self.consume_keyword("AND") {
            let right = self.parse_not()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, PlannerError> {
        if self.consume_keyword("NOT") {
            let inner = self.parse_not()?;
            return Ok(Expression::unary(UnaryOperator::Not, inner));
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_relational()?;
        loop {
            if self.consume_token(&Token::Eq) || self.consume_token(&Token::DoubleEq) {
                let right = self.parse_relational()?;
                left = Expression::binary(left, BinaryOperator::Equal, right);
            } else if self.consume_token(&Token::Neq) {
                let right = self.parse_relational()?;
                left = Expression::binary(left, BinaryOperator::NotEqual, right);
            } else if self.consume_keyword("IS") {
                let negated = self.consume_keyword("NOT");
                self.expect_keyword("NULL")?;
                left = Expression::IsNull {
                    expression: Box::new(left),
                    negated,
                };
            } else {
                let negated = self.check_keyword("NOT")
                    && (self.check_keyword_nth(1, "LIKE")
                        || self.check_keyword_nth(1, "IN")
                        || self.check_keyword_nth(1, "BETWEEN"));
                if negated {
                    self.pos += 1;
                }
                if self.consume_keyword("LIKE") {
                    let right = self.parse_relational()?;
                    let operator = if negated {
                        BinaryOperator::NotLike
                    } else {
                        BinaryOperator::Like
                    };
                    left = Expression::binary(left, operator, right);
                } else if self.consume_keyword("IN") {
                    self.expect_token(&Token::LParen)?;
                    let list = if self.check_token(&Token::RParen) {
                        Vec::new()
                    } else {
                        self.parse_expr_list()?
                    };
                    self.expect_token(&Token::RParen)?;
                    left = Expression::InList {
                        expression: Box::new(left),
                        list,
                        negated,
                    };
                } else if self.consume_keyword("BETWEEN") {
                    let low = self.parse_relational()?;
                    self.expect_keyword("AND")?;
                    let high = self.parse_relational()?;
                    left = Expression::Between {
                        expression: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    };
                } else {
                    return Ok(left);
                }
            }
        }
    }

    fn parse_relational(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Lt) => BinaryOperator::LessThan,
                Some(Token::LtEq) => BinaryOperator::LessThanOrEqual,
                Some(Token::Gt) => BinaryOperator::GreaterThan,
                Some(Token::GtEq) => BinaryOperator::GreaterThanOrEqual,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expression::binary(left, operator, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expression::binary(left, operator, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_concat()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Mul) => BinaryOperator::Multiply,
                Some(Token::Div) => BinaryOperator::Divide,
                Some(Token::Mod) => BinaryOperator::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_concat()?;
            left = Expression::binary(left, operator, right);
        }
    }

    fn parse_concat(&mut self) -> Result<Expression, PlannerError> {
        let mut left = self.parse_unary()?;
        while self.consume_token(&Token::StringConcat) {
            let right = self.parse_unary()?;
            left = Expression::binary(left, BinaryOperator::Concat, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, PlannerError> {
        if self.consume_token(&Token::Minus) {
            // Fold the sign into numeric literals so i64::MIN is representable
            if let Some(Token::Number(text, _)) = self.peek() {
                let text = format!("-{text}");
                let location = self.location();
                self.pos += 1;
                return parse_number(location, &text).map(Expression::Literal);
            }
            let inner = self.parse_unary()?;
            return Ok(Expression::unary(UnaryOperator::Minus, inner));
        }
        if self.consume_token(&Token::Plus) {
            let inner = self.parse_unary()?;
            return Ok(Expression::unary(UnaryOperator::Plus, inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, PlannerError> {
        let location = self.location();
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        match token {
            Token::Number(text, _) => {
                self.pos += 1;
                parse_number(location, &text).map(Expression::Literal)
            }
            Token::SingleQuotedString(text) => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Text(text)))
            }
            Token::HexStringLiteral(hex) => {
                self.pos += 1;
                decode_hex(location, &hex).map(|bytes| Expression::Literal(Value::Blob(bytes)))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_token(&Token::RParen)?;
                Ok(inner)
            }
            Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("NULL") => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Null))
            }
            Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("TRUE") => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Integer(1)))
            }
            Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("FALSE") => {
                self.pos += 1;
                Ok(Expression::Literal(Value::Integer(0)))
            }
            Token::Word(word) if is_identifier(&word) => {
                self.pos += 1;
                if self.consume_token(&Token::LParen) {
                    let args = if self.check_token(&Token::RParen) {
                        Vec::new()
                    } else {
                        self.parse_expr_list()?
                    };
                    self.expect_token(&Token::RParen)?;
                    return Ok(Expression::Function(FunctionExpression {
                        name: word.value.to_ascii_uppercase(),
                        args,
                    }));
                }
                if self.consume_token(&Token::Period) {
                    let column = self.expect_identifier()?;
                    return Ok(Expression::Column(ColumnRef {
                        table: Some(word.value),
                        column,
                    }));
                }
                Ok(Expression::Column(ColumnRef {
                    table: None,
                    column: word.value,
                }))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case(keyword))
}

fn is_identifier(word: &Word) -> bool {
    word.quote_style.is_some()
        || !RESERVED
            .iter()
            .any(|reserved| word.value.eq_ignore_ascii_case(reserved))
}

fn parse_number(location: Location, text: &str) -> Result<Value, PlannerError> {
    let is_integral = !text.contains(['.', 'e', 'E']);
    if is_integral {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Integer(n));
        }
    }
    // Integers too large for i64 degrade to REAL
    let invalid = |reason: String| PlannerError::InvalidLiteral {
        location,
        text: text.to_string(),
        reason,
    };
    let real = text.parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if !real.is_finite() {
        return Err(invalid("number is out of range".to_string()));
    }
    Ok(Value::Real(real))
}

fn decode_hex(location: Location, hex: &str) -> Result<Vec<u8>, PlannerError> {
    let invalid = |reason: &str| PlannerError::InvalidLiteral {
        location,
        text: format!("X'{hex}'"),
        reason: reason.to_string(),
    };
    if hex.len() % 2 != 0 {
        return Err(invalid("odd number of hex digits"));
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| invalid("invalid hex digit"))
        })
        .collect()
}
