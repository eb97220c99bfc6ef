//! Sybase ASE over ODBC.

use super::odbc_attribute;
use crate::db::{dbapi, BackendError, ConnectTarget, Driver, NativeType};
use crate::error::Result;
use crate::runner::{
    Backend, Charset, Configuration, ConfigurationSchema, LogicalType, OptionSpec, SchemaQuery,
    Session, TypeMapper,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

/// Catalog query over the ASE system tables.
///
/// Objects of type `S` are system tables and are left out.
const SCHEMA_SQL: &str = "\
SELECT
    so.name AS table_name,
    sc.name AS column_name
FROM dbo.sysobjects so
INNER JOIN dbo.syscolumns sc ON sc.id = so.id
INNER JOIN dbo.systypes st ON st.usertype = sc.usertype
WHERE so.type <> 'S'
ORDER BY so.name, sc.colid";

const DEFAULT_SERVER: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4001;
const DEFAULT_DRIVER: &str = "Adaptive Server Enterprise";

/// Installed ODBC driver descriptions that can talk to ASE.
#[cfg(feature = "odbc")]
const DRIVER_MARKERS: &[&str] = &["adaptive server", "sybase"];

// "State: 42000, Native error: 102, Message: [SAP][ASE ODBC Driver][Adaptive Server Enterprise]Incorrect syntax near 'x'."
static DIAGNOSTIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)Message:\s*(?:\[[^\]]*\]\s*)*(?P<text>.*)$").ok());

/// DB-API type classes reported by the ODBC layer.
///
/// Binary columns arrive as text and map to `String`. Numbers and decimals
/// both widen to `Float`, so integer columns come back as floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct SybaseTypes;

impl TypeMapper for SybaseTypes {
    fn map(&self, native: &NativeType) -> LogicalType {
        match native {
            NativeType::Code(dbapi::STRING) | NativeType::Code(dbapi::BINARY) => {
                LogicalType::String
            }
            NativeType::Code(dbapi::NUMBER) | NativeType::Code(dbapi::DECIMAL) => {
                LogicalType::Float
            }
            NativeType::Code(dbapi::DATETIME) => LogicalType::Datetime,
            _ => LogicalType::Unknown,
        }
    }
}

#[derive(Deserialize)]
struct SybaseOptions {
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: Option<String>,
    server: String,
    port: u16,
    driver: String,
    charset: String,
    db: String,
    #[serde(default)]
    extra_params: String,
    #[serde(default)]
    startup_command: String,
}

/// The Sybase ASE backend.
pub struct SybaseBackend {
    driver: Arc<dyn Driver>,
    types: SybaseTypes,
}

impl SybaseBackend {
    #[cfg(feature = "odbc")]
    pub fn new() -> Self {
        Self::with_driver(Arc::new(crate::db::OdbcDriver::new(DRIVER_MARKERS)))
    }

    #[cfg(not(feature = "odbc"))]
    pub fn new() -> Self {
        Self::with_driver(Arc::new(crate::db::UnavailableDriver::new(
            "odbc",
            "ODBC support is not compiled in; rebuild with --features odbc",
        )))
    }

    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            types: SybaseTypes,
        }
    }

    fn connect_target(opts: &SybaseOptions) -> ConnectTarget {
        let mut display = format!(
            "Driver={};Server={};Port={};Database={};",
            odbc_attribute(&opts.driver),
            odbc_attribute(&opts.server),
            opts.port,
            odbc_attribute(&opts.db),
        );
        if !opts.user.is_empty() {
            display.push_str(&format!("UID={};", odbc_attribute(&opts.user)));
        }
        // The server converts between its own charset and the client's.
        display.push_str(&format!("CharSet={};", Charset::WIRE.driver_name()));

        let mut full = display.clone();
        if let Some(password) = &opts.password {
            full.push_str(&format!("PWD={};", odbc_attribute(password)));
        }

        let extra = opts.extra_params.trim();
        if !extra.is_empty() {
            full.push_str(extra);
            display.push_str(extra);
        }

        ConnectTarget::new(full, display)
    }
}

impl Default for SybaseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SybaseBackend {
    fn name(&self) -> &'static str {
        "Sybase ASE"
    }

    fn type_identifier(&self) -> &'static str {
        "sybase"
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new()
            .option(OptionSpec::string("user"))
            .option(OptionSpec::string("password").secret())
            .option(OptionSpec::string("server").default_value(DEFAULT_SERVER))
            .option(OptionSpec::number("port").default_value(DEFAULT_PORT))
            .option(
                OptionSpec::string("driver")
                    .title("ODBC Driver")
                    .default_value(DEFAULT_DRIVER),
            )
            .option(
                OptionSpec::string("charset")
                    .title("Character Set")
                    .default_value("UTF-8"),
            )
            .option(OptionSpec::string("db").title("Database Name").required())
            .option(OptionSpec::string("extra_params").title("Extra connection parameters"))
            .option(OptionSpec::string("startup_command").title("Startup Command"))
    }

    fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    fn type_mapper(&self) -> &dyn TypeMapper {
        &self.types
    }

    fn session(&self, config: &Configuration) -> Result<Session> {
        let opts: SybaseOptions = config.parse()?;
        let charset = Charset::parse(&opts.charset)?;

        Ok(Session::new(Self::connect_target(&opts))
            .with_startup_commands(&opts.startup_command)
            .with_charset(charset))
    }

    fn schema_query(&self) -> SchemaQuery {
        SchemaQuery {
            sql: SCHEMA_SQL,
            table_column: "table_name",
            column_column: "column_name",
        }
    }

    fn error_message(&self, error: &BackendError) -> String {
        let extracted = DIAGNOSTIC
            .as_ref()
            .and_then(|re| re.captures(&error.message))
            .and_then(|caps| caps.name("text"))
            .map(|text| text.as_str().trim())
            .filter(|text| !text.is_empty());

        match extracted {
            Some(text) => text.to_string(),
            None => error.message.clone(),
        }
    }
}
