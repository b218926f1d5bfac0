use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::ExportError;
use crate::input_loader::ArticleTable;

/// Download name for an uploaded file: `resultat-<stem>.tsv`.
pub fn export_file_name(uploaded_name: &str) -> String {
    let stem = Path::new(uploaded_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("articles");
    format!("resultat-{}.tsv", stem)
}

pub fn write_tsv<W: Write>(table: &ArticleTable, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);

    wtr.write_record(table.export_headers())?;
    for record in &table.records {
        wtr.write_record(table.export_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_file<P: AsRef<Path>>(table: &ArticleTable, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_tsv(table, file)?;
    info!("Exported {} records to {:?}", table.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_loader::{load_delimited, load_records};

    #[test]
    fn tsv_export_has_header_and_original_columns() {
        let mut table = load_delimited("article,origin\nbolt,FR\n".as_bytes(), b',').unwrap();
        table.records[0].code = "7318 15".to_string();

        let mut out = Vec::new();
        write_tsv(&table, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "article\torigin\tcode\nbolt\tFR\t7318 15\n");
    }

    #[test]
    fn exported_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let table = load_delimited("article,code\nhex bolt,7318\n".as_bytes(), b',').unwrap();
        let path = dir.path().join("out").join(export_file_name("lots.csv"));

        export_file(&table, &path).unwrap();
        let reloaded = load_records(&path).unwrap();
        assert_eq!(reloaded.records, table.records);
    }

    #[test]
    fn download_name_follows_upload() {
        assert_eq!(export_file_name("articles.csv"), "resultat-articles.tsv");
        assert_eq!(export_file_name("lots.xlsx"), "resultat-lots.tsv");
        assert_eq!(export_file_name(""), "resultat-articles.tsv");
    }
}
