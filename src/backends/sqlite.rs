//! SQLite through sqlx.

use crate::db::{ConnectTarget, Driver, NativeType, SqliteDriver};
use crate::error::Result;
use crate::runner::{
    Backend, Configuration, ConfigurationSchema, LogicalType, OptionSpec, SchemaQuery, Session,
    TypeMapper,
};
use serde::Deserialize;
use std::sync::Arc;

const SCHEMA_SQL: &str = "\
SELECT
    m.name AS table_name,
    p.name AS column_name
FROM sqlite_master AS m
JOIN pragma_table_info(m.name) AS p
WHERE m.type IN ('table', 'view')
  AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, p.cid";

const MEMORY: &str = ":memory:";

/// Maps declared SQLite column types, following SQLite's affinity rules
/// where the declared type is not one of the well-known names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTypes;

impl TypeMapper for SqliteTypes {
    fn map(&self, native: &NativeType) -> LogicalType {
        let NativeType::Name(name) = native else {
            return LogicalType::Unknown;
        };
        let name = name.to_uppercase();

        match name.as_str() {
            "BOOLEAN" | "BOOL" => return LogicalType::Boolean,
            "DATETIME" | "TIMESTAMP" => return LogicalType::Datetime,
            "DATE" => return LogicalType::Date,
            "TIME" => return LogicalType::String,
            _ => {}
        }

        if name.contains("INT") {
            LogicalType::Integer
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|s| name.contains(s)) {
            LogicalType::String
        } else if name.contains("BLOB") {
            LogicalType::Binary
        } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|s| name.contains(s))
        {
            LogicalType::Float
        } else {
            LogicalType::Unknown
        }
    }
}

#[derive(Deserialize)]
struct SqliteOptions {
    database: String,
    #[serde(default)]
    startup_command: String,
}

/// The SQLite backend. Always enabled.
pub struct SqliteBackend {
    driver: Arc<dyn Driver>,
    types: SqliteTypes,
}

impl SqliteBackend {
    pub fn new() -> Self {
        Self::with_driver(Arc::new(SqliteDriver))
    }

    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            types: SqliteTypes,
        }
    }
}

impl Default for SqliteBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn connection_url(database: &str) -> String {
    if database == MEMORY {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{database}?mode=rwc")
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn type_identifier(&self) -> &'static str {
        "sqlite"
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new()
            .option(
                OptionSpec::string("database")
                    .title("Database Path")
                    .required(),
            )
            .option(OptionSpec::string("startup_command").title("Startup Command"))
    }

    fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    fn session(&self, config: &Configuration) -> Result<Session> {
        let opts: SqliteOptions = config.parse()?;
        let url = connection_url(&opts.database);

        Ok(Session::new(ConnectTarget::new(url.clone(), url))
            .with_startup_commands(&opts.startup_command))
    }

    fn schema_query(&self) -> SchemaQuery {
        SchemaQuery {
            sql: SCHEMA_SQL,
            table_column: "table_name",
            column_column: "column_name",
        }
    }
}
