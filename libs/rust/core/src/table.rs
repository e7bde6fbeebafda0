//! Flat CSV tables: header plus string cells, read whole and written atomically.

use crate::error::{ServeError, ServeResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self { Self { headers, rows } }

    /// Read a headed CSV file. `what` names the file in diagnostics.
    pub fn read(path: &Path, what: &'static str) -> ServeResult<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ServeError::not_found(what, path)),
            Err(e) => return Err(e.into()),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(BufReader::new(file));
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(String::is_empty) {
            return Err(ServeError::EmptyInput(format!("{what} at {} is empty", path.display())));
        }
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] { &self.headers }
    pub fn rows(&self) -> &[Vec<String>] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn column_index(&self, name: &str) -> Option<usize> { self.headers.iter().position(|h| h == name) }

    /// Header indices of `names`, or a `Schema` error listing every absent column.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> ServeResult<Vec<usize>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for n in names {
            match self.column_index(n.as_ref()) {
                Some(i) => found.push(i),
                None => missing.push(format!("'{}'", n.as_ref())),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(ServeError::Schema(format!("missing required column(s): {}", missing.join(", "))))
        }
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |r| r.get(idx).map(String::as_str).unwrap_or(""))
    }

    /// Write to a temp file beside `path` and rename over it on success, so a
    /// failed write never leaves a partial file or clobbers an existing one.
    pub fn write_atomic(&self, path: &Path) -> ServeResult<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut w = csv::Writer::from_writer(tmp.as_file());
            w.write_record(&self.headers)?;
            for row in &self.rows { w.write_record(row)?; }
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ServeError::Io(e.error))?;
        Ok(())
    }
}
