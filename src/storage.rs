use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::info;

use crate::{
    error::StorageError,
    format::{Formatter, CSV_HEADER},
    model::OutputRow,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
    Markdown,
}

impl OutputFormat {
    /// Guesses the format from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format `{}`", other)),
        }
    }
}

// Utils to store the weekly table on local device.
pub struct LocalSaver;

impl LocalSaver {
    /// Writes all rows to a sibling temp file, then renames it over `path`.
    pub fn save(path: &Path, format: OutputFormat, rows: &[OutputRow]) -> Result<(), StorageError> {
        let tmp = temp_path(path);
        let written = match format {
            OutputFormat::Csv => Self::save_as_csv(&tmp, rows),
            OutputFormat::Jsonl => Self::save_as_jsonl(&tmp, rows),
            OutputFormat::Markdown => Self::save_as_readme(&tmp, rows),
        };
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, path).map_err(StorageError::from)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        info!(path = %path.display(), rows = rows.len(), ?format, "saved papers");
        Ok(())
    }

    pub fn save_as_csv(path: &Path, rows: &[OutputRow]) -> Result<(), StorageError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_as_jsonl(path: &Path, rows: &[OutputRow]) -> Result<(), StorageError> {
        let mut file = BufWriter::new(File::create(path)?);
        rows.iter().enumerate().try_for_each(|(index, row)| -> Result<(), StorageError> {
            file.write_all(Formatter::to_jsonl_with_id(index, row)?.as_bytes())?;
            Ok(())
        })?;
        file.flush()?;
        Ok(())
    }

    pub fn save_as_readme(path: &Path, rows: &[OutputRow]) -> Result<(), StorageError> {
        let mut file = BufWriter::new(File::create(path)?);
        if rows.is_empty() {
            file.write_all(Formatter::to_readme_empty().as_bytes())?;
        }
        rows.iter().try_for_each(|row| file.write_all(Formatter::to_readme(row).as_bytes()))?;
        file.flush()?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("papers"));
    name.push(".tmp");
    path.with_file_name(name)
}
