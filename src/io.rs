use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::util::pretty::pretty_format_batches;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;


#[derive(Debug)]
pub enum IoError {
    Arrow(arrow::error::ArrowError),
    EmptyFolder(PathBuf),
    Fs { source: std::io::Error, path: PathBuf },
    NotFound(PathBuf),
    Parquet { source: ParquetError, path: PathBuf },
    SchemaMismatch { path: PathBuf },
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrow(_) => write!(f, "IoError: ArrowError"),
            Self::EmptyFolder(path) => write!(f, "IoError: No Parquet files in '{}'.", path.display()),
            Self::Fs { path, .. } => write!(f, "IoError: Failed to read '{}'.", path.display()),
            Self::NotFound(path) => write!(f, "IoError: No such file or directory: '{}'.", path.display()),
            Self::Parquet { path, .. } => write!(f, "IoError: '{}' is not a readable Parquet file.", path.display()),
            Self::SchemaMismatch { path } => write!(
                f, "IoError: Schema of '{}' differs from the first file of the folder.", path.display()
            ),
        }
    }
}

impl Error for IoError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Arrow(source) => Some(source),
			Self::Fs { source, .. } => Some(source),
			Self::Parquet { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<arrow::error::ArrowError> for IoError {
    fn from(error: arrow::error::ArrowError) -> Self {
        IoError::Arrow(error)
    }
}

/// Record batches read from one Parquet file or folder, sharing one schema.
#[derive(Clone, Debug)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn cell_count(&self) -> usize {
        self.num_rows() * self.num_columns()
    }

    /// Pretty-printed table with a `[N rows x M columns]` footer.
    pub fn render(&self) -> Result<String, IoError> {
        let table = if self.batches.is_empty() {
            pretty_format_batches(&[RecordBatch::new_empty(self.schema.clone())])?
        } else {
            pretty_format_batches(&self.batches)?
        };

        Ok(format!("{table}\n[{} rows x {} columns]", self.num_rows(), self.num_columns()))
    }
}

/// Load a Parquet file, or every Parquet part file of a folder.
///
/// In a folder, entries whose names start with `.` or `_` (`_SUCCESS`,
/// `.crc` sidecars, `_temporary`) are skipped and the rest are read in path
/// order. Subfolders are read too; a `key=value` folder name adds a `key`
/// string column holding `value` to every row below it.
pub fn load_table(path: impl AsRef<Path>) -> Result<Table, IoError> {
    let path = path.as_ref();

    let metadata = fs::metadata(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => IoError::NotFound(path.to_path_buf()),
        _ => IoError::Fs { source, path: path.to_path_buf() },
    })?;

    if !metadata.is_dir() {
        let (schema, batches) = read_parquet(path)?;
        return Ok(Table { schema, batches });
    }

    let mut files = vec![];
    part_files(path, &[], &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let mut files = files.iter();
    let first = files.next().ok_or_else(|| IoError::EmptyFolder(path.to_path_buf()))?;

    let (schema, mut batches) = first.read()?;
    for file in files {
        let (file_schema, file_batches) = file.read()?;
        // key-value metadata (pandas' index range, writer info) differs per file
        if file_schema.fields() != schema.fields() {
            return Err(IoError::SchemaMismatch { path: file.path.clone() });
        }
        batches.extend(file_batches);
    }

    Ok(Table { schema, batches })
}

/// A Parquet file inside a folder, with the partition values of its parents.
#[derive(Debug)]
struct PartFile {
    path: PathBuf,
    partitions: Vec<(String, String)>,
}

impl PartFile {
    fn read(&self) -> Result<(SchemaRef, Vec<RecordBatch>), IoError> {
        let (schema, batches) = read_parquet(&self.path)?;
        if self.partitions.is_empty() {
            return Ok((schema, batches));
        }

        let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
        fields.extend(
            self.partitions
                .iter()
                .map(|(key, _)| Arc::new(Field::new(key, DataType::Utf8, false))),
        );
        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));

        let batches = batches
            .into_iter()
            .map(|batch| {
                let mut columns = batch.columns().to_vec();
                for (_, value) in &self.partitions {
                    columns.push(Arc::new(StringArray::from(vec![value.as_str(); batch.num_rows()])) as ArrayRef);
                }
                RecordBatch::try_new(schema.clone(), columns)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((schema, batches))
    }
}

fn part_files(dir: &Path, partitions: &[(String, String)], files: &mut Vec<PartFile>) -> Result<(), IoError> {
    let fs_error = |source| IoError::Fs { source, path: dir.to_path_buf() };

    for entry in fs::read_dir(dir).map_err(fs_error)? {
        let entry = entry.map_err(fs_error)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }

        let file_type = entry.file_type().map_err(fs_error)?;
        if file_type.is_dir() {
            let mut nested = partitions.to_vec();
            if let Some((key, value)) = name.split_once('=') {
                nested.push((key.to_string(), value.to_string()));
            }
            part_files(&entry.path(), &nested, files)?;
        } else if file_type.is_file() {
            files.push(PartFile { path: entry.path(), partitions: partitions.to_vec() });
        }
    }

    Ok(())
}

fn read_parquet(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>), IoError> {
    let parquet_error = |source| IoError::Parquet { source, path: path.to_path_buf() };

    let file = File::open(path).map_err(|source| IoError::Fs { source, path: path.to_path_buf() })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(parquet_error)?;

    let schema = builder.schema().clone();
    let row_groups = builder.metadata().num_row_groups();
    let reader = builder.build().map_err(parquet_error)?;

    let mut batches: Vec<RecordBatch> = Vec::with_capacity(row_groups);
    for batch in reader {
        batches.push(batch?);
    }
    debug!(path = %path.display(), row_groups, batches = batches.len(), "read parquet file");

    Ok((schema, batches))
}
