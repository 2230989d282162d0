use crate::backup::dump::{DatabaseSource, Row};
use crate::backup::result_error::result::Result;
use std::io;

#[derive(Clone, Debug)]
struct MemoryTable {
    name: String,
    create: String,
    rows: Vec<Row>,
}

/// A database held entirely in memory, tables kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    tables: Vec<MemoryTable>,
}

impl MemoryDatabase {
    pub fn with_table<N: Into<String>, C: Into<String>>(
        mut self,
        name: N,
        create: C,
        rows: Vec<Row>,
    ) -> Self {
        self.tables.push(MemoryTable {
            name: name.into(),
            create: create.into(),
            rows,
        });
        self
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no table {name:?}")).into())
    }
}

impl DatabaseSource for MemoryDatabase {
    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn create_statement(&self, table: &str) -> Result<String> {
        Ok(self.table(table)?.create.clone())
    }

    fn for_each_row(&self, table: &str, visit: &mut dyn FnMut(Row) -> Result<()>) -> Result<()> {
        self.table(table)?
            .rows
            .iter()
            .cloned()
            .try_for_each(visit)
    }
}
