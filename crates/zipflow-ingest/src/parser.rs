//! Input file parser
//!
//! Input files are comma separated with a header row. The `zip` and `email`
//! columns are located by header name (case and surrounding whitespace are
//! ignored); any other column is ignored.
//!
//! Two levels of failure exist:
//! - a row whose `zip` or `email` is missing, empty or invalid is yielded as
//!   a [`MalformedRow`] and reading continues;
//! - a file that cannot be opened, is not valid UTF-8 CSV, or lacks one of the
//!   required columns fails as [`IngestError::FileUnreadable`]. The reader
//!   stops after that error.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use zipflow_common::{EmailAddress, PostalCode};

use crate::error::{IngestError, Result};

/// Header of the postal code column
pub const POSTAL_CODE_COLUMN: &str = "zip";

/// Header of the email column
pub const EMAIL_COLUMN: &str = "email";

/// A row with both required fields present and valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRow {
    /// 1-based position among data rows
    pub index: u64,
    /// Line in the source file
    pub line: u64,
    pub postal_code: PostalCode,
    pub email: EmailAddress,
}

/// A row that cannot be processed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed row: {reason}")]
pub struct MalformedRow {
    pub index: u64,
    pub line: u64,
    /// Postal code as found in the file, empty if absent
    pub raw_postal_code: String,
    /// Email as found in the file, empty if absent
    pub raw_email: String,
    pub reason: String,
}

impl MalformedRow {
    /// Lowercase description of the row failure
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Outcome of decoding one data row
pub type ParsedRow = std::result::Result<InputRow, MalformedRow>;

/// Opens input files
pub struct RecordParser;

impl RecordParser {
    /// Open `path` and validate its header.
    pub fn open(path: &Path) -> Result<RecordReader<File>> {
        let name = display_name(path);
        let file = File::open(path).map_err(|e| IngestError::file_unreadable(&name, e))?;
        RecordReader::from_reader(name, file)
    }

    /// Decode every row of `path`.
    ///
    /// All or nothing: a file-level error discards rows already decoded.
    pub fn read_all(path: &Path) -> Result<Vec<ParsedRow>> {
        Self::open(path)?.collect()
    }
}

/// Lazy, single-pass row sequence over one input
pub struct RecordReader<R: Read> {
    file: String,
    reader: csv::Reader<R>,
    postal_code_idx: usize,
    email_idx: usize,
    record: StringRecord,
    rows_read: u64,
    finished: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap any reader; `file` names the input in errors.
    pub fn from_reader(file: impl Into<String>, input: R) -> Result<Self> {
        let file = file.into();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| IngestError::file_unreadable(&file, e))?
            .clone();

        let column = |wanted: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| {
                    IngestError::file_unreadable(
                        &file,
                        format!("missing required column '{}'", wanted),
                    )
                })
        };

        let postal_code_idx = column(POSTAL_CODE_COLUMN)?;
        let email_idx = column(EMAIL_COLUMN)?;

        Ok(Self {
            file,
            reader,
            postal_code_idx,
            email_idx,
            record: StringRecord::new(),
            rows_read: 0,
            finished: false,
        })
    }

    fn decode_current(&self) -> ParsedRow {
        let index = self.rows_read;
        let line = self.record.position().map(|p| p.line()).unwrap_or(index + 1);
        let field = |idx: usize| self.record.get(idx).map(str::trim).unwrap_or("").to_string();

        let raw_postal_code = field(self.postal_code_idx);
        let raw_email = field(self.email_idx);

        let malformed = |reason: String| MalformedRow {
            index,
            line,
            raw_postal_code: raw_postal_code.clone(),
            raw_email: raw_email.clone(),
            reason,
        };

        match (raw_postal_code.is_empty(), raw_email.is_empty()) {
            (true, true) => return Err(malformed("missing zip code and email".to_string())),
            (true, false) => return Err(malformed("missing zip code".to_string())),
            (false, true) => return Err(malformed("missing email".to_string())),
            (false, false) => {},
        }

        let postal_code = raw_postal_code
            .parse::<PostalCode>()
            .map_err(|e| malformed(e.to_string()))?;
        let email = raw_email
            .parse::<EmailAddress>()
            .map_err(|e| malformed(e.to_string()))?;

        Ok(InputRow {
            index,
            line,
            postal_code,
            email,
        })
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<ParsedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                self.rows_read += 1;
                Some(Ok(self.decode_current()))
            },
            Ok(false) => {
                self.finished = true;
                None
            },
            Err(e) => {
                self.finished = true;
                Some(Err(IngestError::file_unreadable(&self.file, e)))
            },
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn read(input: &[u8]) -> Result<Vec<ParsedRow>> {
        RecordReader::from_reader("test.csv", input)?.collect()
    }

    #[test]
    fn test_reads_rows_in_order() {
        let rows = read(b"zip,email\n90210,user@example.com\n10001,b@example.com\n").unwrap();

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.line, 2);
        assert_eq!(first.postal_code.as_str(), "90210");
        assert_eq!(first.email.as_str(), "user@example.com");
        assert_eq!(rows[1].as_ref().unwrap().index, 2);
    }

    #[test]
    fn test_columns_matched_by_name() {
        let rows = read(b"name, Email ,ZIP\nAda,ada@example.com,02134\n").unwrap();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.postal_code.as_str(), "02134");
        assert_eq!(row.email.as_str(), "ada@example.com");
    }

    #[test]
    fn test_missing_fields_are_malformed_rows() {
        let rows = read(
            b"zip,email\n,test2@example.com\n10001,\n90210,ok@example.com\n,\n10001\n",
        )
        .unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].as_ref().unwrap_err().reason(), "missing zip code");
        assert_eq!(rows[1].as_ref().unwrap_err().reason(), "missing email");
        assert!(rows[2].is_ok());
        assert_eq!(rows[3].as_ref().unwrap_err().reason(), "missing zip code and email");
        // Short row: the email column is absent entirely
        let short = rows[4].as_ref().unwrap_err();
        assert_eq!(short.reason(), "missing email");
        assert_eq!(short.raw_postal_code, "10001");
        assert_eq!(short.index, 5);
    }

    #[test]
    fn test_invalid_values_are_malformed_rows() {
        let rows = read(b"zip,email\n9021,a@example.com\n90210,not-an-email\n").unwrap();

        let bad_zip = rows[0].as_ref().unwrap_err();
        assert!(bad_zip.reason().contains("invalid zip code '9021'"));
        assert_eq!(
            bad_zip.to_string(),
            "malformed row: invalid zip code '9021': expected exactly 5 digits"
        );

        let bad_email = rows[1].as_ref().unwrap_err();
        assert_eq!(bad_email.reason(), "invalid email address 'not-an-email'");
    }

    #[test]
    fn test_missing_header_is_unreadable() {
        let err = read(b"zipcode,email\n90210,a@example.com\n").unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { .. }));
        assert!(err.to_string().contains("missing required column 'zip'"));
    }

    #[test]
    fn test_empty_file_is_unreadable() {
        let err = read(b"").unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { .. }));
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        assert!(read(b"zip,email\n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_utf8_discards_whole_file() {
        let mut input = b"zip,email\n90210,a@example.com\n".to_vec();
        input.extend_from_slice(b"10001,\xff\xfe@example.com\n");

        let err = read(&input).unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { .. }));
    }

    #[test]
    fn test_reader_stops_after_error() {
        let mut input = b"zip,email\n".to_vec();
        input.extend_from_slice(b"\xff,a@example.com\n90210,b@example.com\n");

        let mut reader = RecordReader::from_reader("bad.csv", input.as_slice()).unwrap();
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_open_missing_file_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = RecordParser::read_all(&dir.path().join("gone.csv")).unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { ref file, .. } if file == "gone.csv"));
    }
}
