// SPDX-License-Identifier: Apache-2.0

//! SQL statement classification
//!
//! Drivers need to know up front whether a statement yields a result set
//! (prepare + iterate) or not (plain execute). Classification goes through
//! `sqlparser` with the connection's dialect; callers fall back to
//! `is_select_prefix` when the parser rejects the text.

use sqlparser::ast::Statement;
use sqlparser::dialect::{
    BigQueryDialect, Dialect as SqlDialect, DuckDbDialect, GenericDialect, MsSqlDialect,
    PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

use crate::engine::types::Dialect;

fn parser_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::BigQuery => Box::new(BigQueryDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::Snowflake => Box::new(SnowflakeDialect {}),
        Dialect::SqlServer => Box::new(MsSqlDialect {}),
        Dialect::Presto | Dialect::Trino => Box::new(GenericDialect {}),
    }
}

/// Parses `sql` and reports whether its last statement returns rows.
pub fn returns_rows(dialect: Dialect, sql: &str) -> Result<bool, String> {
    let statements = Parser::parse_sql(parser_dialect(dialect).as_ref(), sql.trim())
        .map_err(|e| e.to_string())?;

    let Some(last) = statements.last() else {
        return Ok(false);
    };

    Ok(match last {
        Statement::Query { .. }
        | Statement::Explain { .. }
        | Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowViews { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowCreate { .. }
        | Statement::Pragma { .. }
        | Statement::Call(_) => true,
        Statement::Insert(insert) => insert.returning.is_some(),
        Statement::Update(update) => update.returning.is_some(),
        Statement::Delete(delete) => delete.returning.is_some(),
        _ => false,
    })
}

/// Keyword sniffing for text the parser cannot handle.
pub fn is_select_prefix(sql: &str) -> bool {
    const ROW_KEYWORDS: [&str; 11] = [
        "select", "with", "show", "describe", "explain", "pragma", "values", "summarize", "from",
        "table", "call",
    ];

    let first = strip_leading_comments(sql)
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .find(|token| !token.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase();

    ROW_KEYWORDS.contains(&first.as_str())
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else {
            return rest;
        }
    }
}
