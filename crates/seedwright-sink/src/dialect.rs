//! SQL text rendering for the MySQL and PostgreSQL dialects.

use std::fmt;

use serde::{Deserialize, Serialize};

use seedwright_generate::{GeneratedRecord, GeneratedValue};

const SQL_DATE_FORMAT: &str = "%Y-%m-%d";
const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Mysql,
}

impl SqlDialect {
    /// Dialect implied by a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    pub fn quote_string(&self, value: &str) -> String {
        match self {
            Self::Postgres => format!("'{}'", value.replace('\'', "''")),
            Self::Mysql => {
                let mut quoted = String::with_capacity(value.len() + 2);
                quoted.push('\'');
                for ch in value.chars() {
                    match ch {
                        '\\' => quoted.push_str("\\\\"),
                        '\'' => quoted.push_str("\\'"),
                        '\n' => quoted.push_str("\\n"),
                        '\r' => quoted.push_str("\\r"),
                        '\0' => quoted.push_str("\\0"),
                        '\u{1a}' => quoted.push_str("\\Z"),
                        other => quoted.push(other),
                    }
                }
                quoted.push('\'');
                quoted
            }
        }
    }

    pub fn literal(&self, value: &GeneratedValue) -> String {
        match value {
            GeneratedValue::Null => "NULL".to_string(),
            GeneratedValue::Bool(flag) => match (self, flag) {
                (Self::Postgres, true) => "TRUE".to_string(),
                (Self::Postgres, false) => "FALSE".to_string(),
                (Self::Mysql, true) => "1".to_string(),
                (Self::Mysql, false) => "0".to_string(),
            },
            GeneratedValue::Int(number) => number.to_string(),
            GeneratedValue::Decimal(number) => number.to_string(),
            GeneratedValue::Text(text) => self.quote_string(text),
            GeneratedValue::Date(date) => {
                let text = self.quote_string(&date.format(SQL_DATE_FORMAT).to_string());
                match self {
                    Self::Postgres => format!("DATE {text}"),
                    Self::Mysql => text,
                }
            }
            GeneratedValue::Timestamp(timestamp) => {
                let text = self.quote_string(&timestamp.format(SQL_TIMESTAMP_FORMAT).to_string());
                match self {
                    Self::Postgres => format!("TIMESTAMP {text}"),
                    Self::Mysql => text,
                }
            }
        }
    }

    pub fn begin(&self) -> &'static str {
        match self {
            Self::Postgres => "BEGIN;",
            Self::Mysql => "START TRANSACTION;",
        }
    }

    /// One multi-row `INSERT` statement, terminated by `;`.
    pub fn insert_statement(
        &self,
        table: &str,
        columns: &[String],
        records: &[GeneratedRecord],
    ) -> String {
        let columns = columns
            .iter()
            .map(|column| self.quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = records
            .iter()
            .map(|record| {
                let values = record
                    .values
                    .iter()
                    .map(|value| self.literal(value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("  ({values})")
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "INSERT INTO {} ({columns}) VALUES\n{rows};",
            self.quote_ident(table)
        )
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn quotes_identifiers_per_dialect() {
        assert_eq!(SqlDialect::Postgres.quote_ident("od\"d"), "\"od\"\"d\"");
        assert_eq!(SqlDialect::Mysql.quote_ident("or`der"), "`or``der`");
    }

    #[test]
    fn escapes_strings_per_dialect() {
        let value = GeneratedValue::Text("O'Brien\\n".into());
        assert_eq!(SqlDialect::Postgres.literal(&value), "'O''Brien\\n'");
        assert_eq!(SqlDialect::Mysql.literal(&value), "'O\\'Brien\\\\n'");
    }

    #[test]
    fn renders_booleans_and_dates() {
        let date = GeneratedValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"));
        assert_eq!(SqlDialect::Postgres.literal(&date), "DATE '2024-02-29'");
        assert_eq!(SqlDialect::Mysql.literal(&date), "'2024-02-29'");
        assert_eq!(SqlDialect::Postgres.literal(&GeneratedValue::Bool(true)), "TRUE");
        assert_eq!(SqlDialect::Mysql.literal(&GeneratedValue::Bool(false)), "0");
        assert_eq!(SqlDialect::Mysql.literal(&GeneratedValue::Null), "NULL");
    }

    #[test]
    fn dialect_from_url_scheme() {
        assert_eq!(
            SqlDialect::from_url("postgresql://localhost/db"),
            Some(SqlDialect::Postgres)
        );
        assert_eq!(SqlDialect::from_url("mysql://root@db/shop"), Some(SqlDialect::Mysql));
        assert_eq!(SqlDialect::from_url("sqlite::memory:"), None);
    }
}
