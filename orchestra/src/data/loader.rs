use std::{
    fs::File,
    path::{Path, PathBuf},
};

use csv::StringRecord;
use log::{debug, info, warn};

use super::{DatasetMatrix, RowLayout, Sample};
use crate::{OrchestraErr, Result};

/// Streams normalized rows out of a CSV file, header skipped.
pub struct RowStream {
    path: PathBuf,
    reader: csv::Reader<File>,
    record: StringRecord,
    layout: RowLayout,
    rows: usize,
}

impl RowStream {
    /// Opens `path` for streaming.
    ///
    /// # Errors
    /// `OrchestraErr::Io` if the file can't be opened.
    pub fn open(path: impl AsRef<Path>, layout: RowLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| OrchestraErr::io(&path, e))?;
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        debug!("streaming rows from {}", path.display());

        Ok(Self {
            path,
            reader,
            record: StringRecord::new(),
            layout,
            rows: 0,
        })
    }

    /// Amount of rows read so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next record into the internal buffer, without normalizing it.
    fn advance(&mut self) -> Result<bool> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| OrchestraErr::csv(&self.path, e))?;

        if more {
            self.rows += 1;
        }

        Ok(more)
    }

    fn current(&self) -> Result<Sample> {
        self.layout
            .normalize_fields(self.record.iter())
            .map_err(|source| OrchestraErr::MalformedRow {
                row: self.rows,
                source,
            })
    }
}

impl Iterator for RowStream {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => Some(self.current()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Loads at most `capacity` rows of `path` into a new matrix.
///
/// Loading stops at capacity. If the file has more rows the matrix is marked truncated, the
/// extra rows are neither parsed nor kept.
pub fn load(path: impl AsRef<Path>, layout: RowLayout, capacity: usize) -> Result<DatasetMatrix> {
    let mut stream = RowStream::open(path, layout)?;
    let mut matrix = DatasetMatrix::new(capacity);

    while stream.advance()? {
        if matrix.is_full() {
            matrix.mark_truncated();
            break;
        }

        let sample = stream.current()?;
        let _ = matrix.push(&sample);
    }

    if matrix.truncated() {
        warn!(
            capacity = capacity;
            "{} has more rows than the matrix holds, the rest are ignored",
            stream.path().display()
        );
    }

    info!(rows = matrix.len(); "loaded {}", stream.path().display());
    Ok(matrix)
}
