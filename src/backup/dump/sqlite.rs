use crate::backup::dump::{quote_identifier, DatabaseSource, Row, SqlValue};
use crate::backup::result_error::result::Result;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::fmt::{Debug, Formatter};
use std::path::Path;

static LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
     ORDER BY name";
static CREATE_STATEMENT_SQL: &str =
    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// SQLite database read through `rusqlite`.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Opens the database file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(r) => SqlValue::Real(r),
            // SQLite does not enforce the encoding of TEXT values
            ValueRef::Text(t) => match std::str::from_utf8(t) {
                Ok(t) => SqlValue::Text(t.to_string()),
                Err(_) => SqlValue::RawText(t.to_vec()),
            },
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

impl DatabaseSource for SqliteDatabase {
    fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(LIST_TABLES_SQL)?;
        let tables = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }

    fn create_statement(&self, table: &str) -> Result<String> {
        Ok(self
            .conn
            .query_row(CREATE_STATEMENT_SQL, [table], |r| r.get::<_, String>(0))?)
    }

    fn for_each_row(&self, table: &str, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let row = columns
                .iter()
                .enumerate()
                .map(|(i, column)| Ok((column.clone(), r.get_ref(i)?.into())))
                .collect::<Result<Row>>()?;
            visit(row)?;
        }
        Ok(())
    }
}
