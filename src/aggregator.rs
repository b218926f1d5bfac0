use crate::input_loader::ArticleRecord;
use crate::scheduler::ItemResult;

/// Writes each result's value into the `code` of the record at the same index.
pub fn merge(records: &[ArticleRecord], results: &[ItemResult]) -> Vec<ArticleRecord> {
    let mut merged = records.to_vec();
    for result in results {
        if let Some(record) = merged.get_mut(result.index) {
            record.code = result.value.clone();
        }
    }
    merged
}

/// Number of results that had to fall back to the original code.
pub fn failed_count(results: &[ItemResult]) -> usize {
    results.iter().filter(|r| r.failed).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(article: &str, code: &str) -> ArticleRecord {
        ArticleRecord {
            article: article.to_string(),
            code: code.to_string(),
            extra: vec!["keep".to_string()],
        }
    }

    fn result(index: usize, value: &str, failed: bool) -> ItemResult {
        ItemResult {
            index,
            value: value.to_string(),
            failed,
        }
    }

    #[test]
    fn codes_are_replaced_in_place() {
        let records = vec![record("bolt", ""), record("nut", "7318")];
        let results = vec![result(0, "7318 15", false), result(1, "7318", true)];

        let merged = merge(&records, &results);
        assert_eq!(merged[0].code, "7318 15");
        assert_eq!(merged[1].code, "7318");
        assert_eq!(merged[0].extra, vec!["keep"]);
        assert_eq!(failed_count(&results), 1);
    }

    #[test]
    fn merging_twice_changes_nothing() {
        let records = vec![record("a", "1"), record("b", "2")];
        let results = vec![result(0, "x", false), result(1, "y", false)];

        let once = merge(&records, &results);
        let twice = merge(&once, &results);
        assert_eq!(once, twice);
    }

    #[test]
    fn out_of_range_results_are_ignored() {
        let records = vec![record("a", "1")];
        let merged = merge(&records, &[result(4, "x", false)]);
        assert_eq!(merged, records);
    }
}
