//! Built-in backends.

mod sqlite;
mod sybase;

pub use sqlite::{SqliteBackend, SqliteTypes};
pub use sybase::{SybaseBackend, SybaseTypes};

/// Quotes an ODBC connection-string attribute value when it needs it.
pub(crate) fn odbc_attribute(value: &str) -> String {
    let needs_braces = value.contains([';', '{', '}', '='])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_braces {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}
