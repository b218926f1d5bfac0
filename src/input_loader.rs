use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use log::{error, info};

use crate::error::ParseError;
use crate::scheduler::WorkItem;

const ARTICLE_COLUMN: &str = "article";
const CODE_COLUMN: &str = "code";

/// One row of the uploaded table. Columns other than `article` and `code`
/// are carried through untouched for the export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArticleRecord {
    pub article: String,
    pub code: String,
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleTable {
    /// Normalized (trimmed, lower-cased) header names in file order.
    pub headers: Vec<String>,
    pub records: Vec<ArticleRecord>,
    article_col: usize,
    code_col: Option<usize>,
}

impl ArticleTable {
    pub fn from_rows<I>(raw_headers: Vec<String>, rows: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let headers: Vec<String> = raw_headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ParseError::MissingHeader);
        }

        let article_col = headers
            .iter()
            .position(|h| h == ARTICLE_COLUMN)
            .ok_or(ParseError::MissingColumn(ARTICLE_COLUMN))?;
        let code_col = headers.iter().position(|h| h == CODE_COLUMN);

        let mut records = Vec::new();
        for mut row in rows {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            row.resize(headers.len(), String::new());

            let mut record = ArticleRecord::default();
            for (col, cell) in row.into_iter().enumerate() {
                if col == article_col {
                    record.article = cell;
                } else if Some(col) == code_col {
                    record.code = cell;
                } else {
                    record.extra.push(cell);
                }
            }
            records.push(record);
        }

        Ok(ArticleTable {
            headers,
            records,
            article_col,
            code_col,
        })
    }

    /// Header row for the export. `code` is appended when the input had none.
    pub fn export_headers(&self) -> Vec<String> {
        let mut headers = self.headers.clone();
        if self.code_col.is_none() {
            headers.push(CODE_COLUMN.to_string());
        }
        headers
    }

    /// A record laid out in `export_headers` order.
    pub fn export_row(&self, record: &ArticleRecord) -> Vec<String> {
        let mut extra = record.extra.iter();
        let mut row = Vec::with_capacity(self.headers.len() + 1);
        for col in 0..self.headers.len() {
            if col == self.article_col {
                row.push(record.article.clone());
            } else if Some(col) == self.code_col {
                row.push(record.code.clone());
            } else {
                row.push(extra.next().cloned().unwrap_or_default());
            }
        }
        if self.code_col.is_none() {
            row.push(record.code.clone());
        }
        row
    }

    pub fn work_items(&self) -> Vec<WorkItem> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, r)| WorkItem::new(index, r.article.clone(), r.code.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputFormat {
    Csv,
    Tsv,
    Spreadsheet,
}

impl InputFormat {
    fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tsv" => InputFormat::Tsv,
            "xlsx" | "xls" | "ods" => InputFormat::Spreadsheet,
            _ => InputFormat::Csv,
        }
    }
}

pub fn load_records<P: AsRef<Path>>(filename: P) -> Result<ArticleTable, ParseError> {
    let path = filename.as_ref();

    let table = match InputFormat::detect(path) {
        InputFormat::Spreadsheet => load_spreadsheet(path),
        InputFormat::Tsv => load_delimited(File::open(path)?, b'\t'),
        InputFormat::Csv => load_delimited(File::open(path)?, b','),
    };

    match &table {
        Ok(t) => info!("Loaded {} records from {:?}", t.len(), path),
        Err(e) => error!("Could not load {:?}: {}", path, e),
    }
    table
}

/// Reads a header-first delimited table. One bad row rejects the whole input.
pub fn load_delimited<R: std::io::Read>(reader: R, delimiter: u8) -> Result<ArticleTable, ParseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    ArticleTable::from_rows(headers, rows)
}

fn load_spreadsheet(path: &Path) -> Result<ArticleTable, ParseError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ParseError::Excel(e.to_string()))?;

    let worksheets = workbook.worksheets();
    let (_name, range) = worksheets
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::Excel("workbook has no worksheet".to_string()))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>());
    let headers = rows.next().ok_or(ParseError::MissingHeader)?;

    ArticleTable::from_rows(headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_headers_are_normalized_and_blank_lines_skipped() {
        let input = " Article ,CODE,Origin\nbolt,,FR\n\n  ,  ,  \nnut,7318,DE\n";
        let table = load_delimited(input.as_bytes(), b',').unwrap();

        assert_eq!(table.headers, vec!["article", "code", "origin"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[1].article, "nut");
        assert_eq!(table.records[1].code, "7318");
        assert_eq!(table.records[1].extra, vec!["DE"]);
    }

    #[test]
    fn missing_article_column_is_a_parse_error() {
        let err = load_delimited("name,code\nbolt,1\n".as_bytes(), b',').unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn("article")));
    }

    #[test]
    fn short_rows_are_padded() {
        let table = load_delimited("article\tcode\tnote\nscrew\n".as_bytes(), b'\t').unwrap();
        assert_eq!(table.records[0].article, "screw");
        assert_eq!(table.records[0].code, "");
        assert_eq!(table.records[0].extra, vec![""]);
    }

    #[test]
    fn export_row_keeps_column_order_and_appends_code() {
        let table = load_delimited("ref,article\n1,washer\n".as_bytes(), b',').unwrap();
        assert_eq!(table.export_headers(), vec!["ref", "article", "code"]);

        let mut record = table.records[0].clone();
        record.code = "7318".to_string();
        assert_eq!(table.export_row(&record), vec!["1", "washer", "7318"]);
    }

    #[test]
    fn work_items_follow_row_order() {
        let table = load_delimited("article,code\na,1\nb,2\n".as_bytes(), b',').unwrap();
        let items = table.work_items();
        assert_eq!(items[0].index, 0);
        assert_eq!(items[1].search_key, "b");
        assert_eq!(items[1].fallback_value, "2");
    }

    #[test]
    fn delimiter_is_chosen_from_extension() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        write!(file, "article\tcode\nbolt, zinc\t7318\n").unwrap();

        let table = load_records(file.path()).unwrap();
        assert_eq!(table.records[0].article, "bolt, zinc");
        assert_eq!(table.records[0].code, "7318");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_records("does/not/exist.csv").unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
