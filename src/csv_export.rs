use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8};

use crate::error::{Result, ScrapeError};

pub const CSV_HEADER: [&str; 7] = [
    "社名",
    "番号",
    "住所",
    "URL",
    "検索キーワード",
    "検索地域",
    "日時",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Target encoding of the CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEncoding {
    encoding: &'static Encoding,
    bom: bool,
}

impl OutputEncoding {
    /// Accepts WHATWG labels plus common codec aliases (`utf-8-sig`, `cp932`, `euc_jp`).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "utf-8-sig" | "utf_8_sig" | "utf8-sig" => {
                return Some(Self {
                    encoding: UTF_8,
                    bom: true,
                });
            }
            "cp932" | "mskanji" => return Self::from_label("windows-31j"),
            _ => {}
        }
        Encoding::for_label(label.as_bytes())
            .or_else(|| Encoding::for_label(label.replace('_', "-").as_bytes()))
            .map(|encoding| Self {
                encoding: encoding.output_encoding(),
                bom: false,
            })
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }
}

/// A CSV file opened for writing; the header row is written on creation.
pub struct CsvSink {
    path: PathBuf,
    writer: BufWriter<File>,
    encoding: OutputEncoding,
}

impl CsvSink {
    pub fn create(path: &Path, encoding: OutputEncoding) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        if encoding.bom {
            writer.write_all(UTF8_BOM)?;
        }
        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
            encoding,
        };
        sink.write_row(&CSV_HEADER)?;
        Ok(sink)
    }

    pub fn write_row<S: AsRef<str>>(&mut self, row: &[S]) -> Result<()> {
        let line = format_row(row);
        let (bytes, _, had_errors) = self.encoding.encoding.encode(&line);
        if had_errors {
            return Err(ScrapeError::Encoding {
                text: line.trim_end().to_string(),
                encoding: self.encoding.name(),
            });
        }
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.flush()?;
        Ok(self.path)
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// One CSV record terminated by CRLF.
pub fn format_row<S: AsRef<str>>(row: &[S]) -> String {
    let mut line = String::new();
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            line.push('"');
            line.push_str(&cell.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(cell);
        }
    }
    line.push_str("\r\n");
    line
}
