//! SQL script dump of a database.
//!
//! Tables come from a [`DatabaseSource`]; each one is written as its
//! creation statement followed by one `INSERT` per row, streamed straight to
//! the output file.

pub mod memory;
pub mod sqlite;

use crate::backup::finish::Finish;
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use chrono::Local;
use function_name::named;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A raw column value as stored by the database.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Text column whose bytes are not valid UTF-8.
    RawText(Vec<u8>),
    Blob(Vec<u8>),
}

/// One fetched row: column names with their values, in column order.
pub type Row = Vec<(String, SqlValue)>;

/// The narrow query surface the dumper needs from a database.
pub trait DatabaseSource {
    /// Names of every table to dump, in dump order.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// The DDL statement that recreates `table`.
    fn create_statement(&self, table: &str) -> Result<String>;

    /// Feeds every row of `table` to `visit`, in fetch order.
    ///
    /// Stops at the first error returned by `visit`.
    fn for_each_row(&self, table: &str, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()>;
}

impl<T: DatabaseSource + ?Sized> DatabaseSource for &T {
    fn list_tables(&self) -> Result<Vec<String>> {
        (**self).list_tables()
    }

    fn create_statement(&self, table: &str) -> Result<String> {
        (**self).create_statement(table)
    }

    fn for_each_row(&self, table: &str, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        (**self).for_each_row(table, visit)
    }
}

impl<T: DatabaseSource + ?Sized> DatabaseSource for Box<T> {
    fn list_tables(&self) -> Result<Vec<String>> {
        (**self).list_tables()
    }

    fn create_statement(&self, table: &str) -> Result<String> {
        (**self).create_statement(table)
    }

    fn for_each_row(&self, table: &str, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        (**self).for_each_row(table, visit)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn hex_literal(bytes: &[u8]) -> String {
    format!("X'{}'", bytes.iter().map(|byte| format!("{byte:02X}")).join(""))
}

impl Display for SqlValue {
    /// Renders the value as a SQL literal.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{i}"),
            SqlValue::Real(r) if r.is_nan() => f.write_str("NULL"),
            SqlValue::Real(r) if r.is_infinite() => {
                f.write_str(if *r > 0.0 { "9e999" } else { "-9e999" })
            }
            SqlValue::Real(r) => write!(f, "{r:?}"),
            SqlValue::Text(t) => f.write_str(&quote_literal(t)),
            SqlValue::RawText(b) => write!(f, "CAST({} AS TEXT)", hex_literal(b)),
            SqlValue::Blob(b) => f.write_str(&hex_literal(b)),
        }
    }
}

/// `INSERT INTO "t" ("a", "b") VALUES (1, 'x');`
pub fn insert_statement(table: &str, row: &[(String, SqlValue)]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_identifier(table),
        row.iter().map(|(column, _)| quote_identifier(column)).join(", "),
        row.iter().map(|(_, value)| value).join(", "),
    )
}

/// Writes the whole database as a SQL script at `path`.
///
/// The file is only created once at least one table is known, so an empty
/// database leaves nothing behind.
#[named]
pub fn dump_database<D: DatabaseSource + ?Sized>(db: &D, path: &Path) -> Result<PathBuf> {
    let tables = db
        .list_tables()
        .with_debug_object_and_fn_name(path.to_path_buf(), function_path!())?;
    if tables.is_empty() {
        return Err(Error::NoTablesFound);
    }
    tracing::info!("Dumping {} tables to {:?}", tables.len(), path);

    let out = File::create_new(path)
        .map(BufWriter::new)
        .map_err(|source| Error::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
    write_tables(db, &tables, out, path)?;

    Ok(path.to_path_buf())
}

/// Streams `tables` into `out`, then finishes it down to the synced file.
fn write_tables<D, W>(db: &D, tables: &[String], mut out: W, path: &Path) -> Result<()>
where
    D: DatabaseSource + ?Sized,
    W: Write + Finish<File>,
{
    let write_error = |source| Error::WriteError {
        path: path.to_path_buf(),
        source,
    };

    writeln!(
        out,
        "-- Database dump generated {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
    .map_err(write_error)?;

    for table in tables {
        let create = db
            .create_statement(table)
            .with_msg(format!("Reading creation statement of {table:?} failed"))?;
        writeln!(out, "\n{};\n", create.trim_end().trim_end_matches(';')).map_err(write_error)?;

        let mut row_count = 0usize;
        db.for_each_row(table, &mut |row| {
            writeln!(out, "{}", insert_statement(table, &row)).map_err(write_error)?;
            row_count += 1;
            Ok(())
        })
        .with_msg(format!("Dumping rows of {table:?} failed"))?;
        tracing::debug!("Dumped {} rows from {:?}", row_count, table);
    }

    out.finish()
        .and_then(Finish::finish)
        .map_err(|source| Error::DumpIncomplete {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
