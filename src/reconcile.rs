//! Merges of the report scan and the backend results into the record set.
//! Both are plain scan-and-match on `id`; the sets are small.

use crate::formats::{ArticleRecord, PageCountResult, SecondaryTableRow};

pub fn merge_activity(records: &mut [ArticleRecord], rows: &[SecondaryTableRow]) {
    for record in records.iter_mut() {
        record.is_active = rows.iter().any(|row| row.id == record.id);
    }
}

pub fn merge_page_counts(records: &mut [ArticleRecord], results: &[PageCountResult]) {
    for record in records.iter_mut() {
        record.page_count = results
            .iter()
            .find(|result| result.id == record.id)
            .map(|result| result.page_count)
            .unwrap_or(0);
    }
}
