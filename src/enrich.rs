use crate::cancel::CancellationToken;
use crate::config::{ENRICH_BATCH_SIZE, LIST_SEPARATOR, NOT_FOUND};
use crate::error::EnrichError;
use crate::models::IndexRecord;
use crate::scan::MatchTable;
use crate::stats::EnrichmentStats;
use crate::table::InputRow;
use crate::targets::normalize_key;
use anyhow::Result;
use rayon::prelude::*;

/// The five appended columns, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedFields {
    pub full_name: String,
    pub location: String,
    pub phones: String,
    pub emails: String,
    pub linkedin_url: String,
}

impl EnrichedFields {
    pub fn not_found() -> Self {
        Self {
            full_name: NOT_FOUND.to_string(),
            location: NOT_FOUND.to_string(),
            phones: NOT_FOUND.to_string(),
            emails: NOT_FOUND.to_string(),
            linkedin_url: NOT_FOUND.to_string(),
        }
    }

    /// Missing sub-fields project to empty strings, never to the sentinel.
    pub fn from_record(record: &IndexRecord) -> Self {
        Self {
            full_name: record.full_name.clone(),
            location: record.location.clone(),
            phones: record.phones.join(LIST_SEPARATOR),
            emails: record.emails.join(LIST_SEPARATOR),
            linkedin_url: record.linkedin_url.clone(),
        }
    }

    pub fn as_array(&self) -> [&str; 5] {
        [
            self.full_name.as_str(),
            self.location.as_str(),
            self.phones.as_str(),
            self.emails.as_str(),
            self.linkedin_url.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Matched,
    Unmatched,
    EmptyKey,
}

/// An input row together with its projected enrichment. Borrows the row; nothing is copied
/// until the sink writes it out.
#[derive(Debug, Clone)]
pub struct EnrichedRow<'a> {
    pub row: &'a InputRow,
    pub fields: EnrichedFields,
    pub outcome: RowOutcome,
}

impl EnrichedRow<'_> {
    /// Original values followed by the enrichment columns.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.row
            .values()
            .iter()
            .map(String::as_str)
            .chain(self.fields.as_array())
    }
}

pub fn enrich_row<'a>(
    row: &'a InputRow,
    key_index: usize,
    matches: &MatchTable,
) -> EnrichedRow<'a> {
    let key = row.get(key_index).map(normalize_key).unwrap_or("");
    if key.is_empty() {
        return EnrichedRow {
            row,
            fields: EnrichedFields::not_found(),
            outcome: RowOutcome::EmptyKey,
        };
    }

    match matches.get(key) {
        Some(record) => EnrichedRow {
            row,
            fields: EnrichedFields::from_record(record),
            outcome: RowOutcome::Matched,
        },
        None => EnrichedRow {
            row,
            fields: EnrichedFields::not_found(),
            outcome: RowOutcome::Unmatched,
        },
    }
}

/// Enriches every row, preserving input order. Work is split into batches so a cancellation
/// request is noticed between them; with `parallel` each batch runs on the rayon pool.
pub fn enrich_rows<'a>(
    rows: &'a [InputRow],
    key_index: usize,
    matches: &MatchTable,
    parallel: bool,
    stats: &EnrichmentStats,
    cancel: &CancellationToken,
) -> Result<Vec<EnrichedRow<'a>>> {
    let mut enriched = Vec::with_capacity(rows.len());

    for batch in rows.chunks(ENRICH_BATCH_SIZE) {
        if cancel.is_cancelled() {
            return Err(EnrichError::Cancelled.into());
        }

        let start = enriched.len();
        if parallel {
            enriched.par_extend(
                batch
                    .par_iter()
                    .map(|row| enrich_row(row, key_index, matches)),
            );
        } else {
            enriched.extend(batch.iter().map(|row| enrich_row(row, key_index, matches)));
        }

        let (mut matched, mut unmatched, mut empty) = (0u64, 0u64, 0u64);
        for row in &enriched[start..] {
            match row.outcome {
                RowOutcome::Matched => matched += 1,
                RowOutcome::Unmatched => unmatched += 1,
                RowOutcome::EmptyKey => {
                    unmatched += 1;
                    empty += 1;
                }
            }
        }
        stats.add_matched(matched);
        stats.add_unmatched(unmatched, empty);
    }

    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(records: Vec<IndexRecord>) -> MatchTable {
        records.into_iter().collect()
    }

    fn jane() -> IndexRecord {
        IndexRecord {
            key: "abc123".into(),
            full_name: "Jane Doe".into(),
            phones: vec!["555-1234".into()],
            ..Default::default()
        }
    }

    #[test]
    fn matched_row_projects_fields() {
        let matches = table(vec![jane()]);
        let row = InputRow::new(vec!["abc123".into()]);
        let enriched = enrich_row(&row, 0, &matches);

        assert_eq!(enriched.outcome, RowOutcome::Matched);
        assert_eq!(enriched.fields.full_name, "Jane Doe");
        assert_eq!(enriched.fields.phones, "555-1234");
        assert_eq!(enriched.fields.emails, "");
        assert_eq!(enriched.fields.location, "");
        assert_eq!(enriched.fields.linkedin_url, "");
    }

    #[test]
    fn empty_key_is_all_sentinels() {
        let matches = table(vec![IndexRecord::default(), jane()]);
        for raw in ["", "   "] {
            let row = InputRow::new(vec![raw.into()]);
            let enriched = enrich_row(&row, 0, &matches);
            assert_eq!(enriched.outcome, RowOutcome::EmptyKey);
            assert_eq!(enriched.fields, EnrichedFields::not_found());
            assert!(enriched.fields.as_array().iter().all(|v| *v == NOT_FOUND));
        }
    }

    #[test]
    fn unknown_key_is_all_sentinels() {
        let matches = table(vec![jane()]);
        let row = InputRow::new(vec!["nobody".into()]);
        let enriched = enrich_row(&row, 0, &matches);
        assert_eq!(enriched.outcome, RowOutcome::Unmatched);
        assert_eq!(enriched.fields, EnrichedFields::not_found());
    }

    #[test]
    fn key_is_trimmed_before_lookup() {
        let matches = table(vec![jane()]);
        let row = InputRow::new(vec!["x".into(), "  abc123\t".into()]);
        assert_eq!(enrich_row(&row, 1, &matches).outcome, RowOutcome::Matched);
    }

    #[test]
    fn lists_are_joined() {
        let record = IndexRecord {
            key: "k".into(),
            phones: vec!["1".into(), "2".into(), "3".into()],
            emails: vec!["a@x.io".into(), "b@x.io".into()],
            ..Default::default()
        };
        let fields = EnrichedFields::from_record(&record);
        assert_eq!(fields.phones, "1, 2, 3");
        assert_eq!(fields.emails, "a@x.io, b@x.io");
    }

    #[test]
    fn values_appends_enrichment_columns() {
        let matches = table(vec![jane()]);
        let row = InputRow::new(vec!["abc123".into(), "Acme".into()]);
        let enriched = enrich_row(&row, 0, &matches);
        let values: Vec<&str> = enriched.values().collect();
        assert_eq!(
            values,
            vec!["abc123", "Acme", "Jane Doe", "", "555-1234", "", ""]
        );
    }

    fn many_rows(n: usize) -> Vec<InputRow> {
        (0..n)
            .map(|i| {
                let key = match i % 3 {
                    0 => format!("k{}", i),
                    1 => String::new(),
                    _ => "missing".to_string(),
                };
                InputRow::new(vec![key, i.to_string()])
            })
            .collect()
    }

    #[test]
    fn parallel_matches_sequential_and_keeps_order() {
        let rows = many_rows(ENRICH_BATCH_SIZE * 2 + 17);
        let matches: MatchTable = (0..rows.len())
            .step_by(3)
            .map(|i| IndexRecord {
                key: format!("k{}", i),
                full_name: format!("name {}", i),
                ..Default::default()
            })
            .collect();

        let seq_stats = EnrichmentStats::new();
        let par_stats = EnrichmentStats::new();
        let cancel = CancellationToken::new();
        let sequential = enrich_rows(&rows, 0, &matches, false, &seq_stats, &cancel).unwrap();
        let parallel = enrich_rows(&rows, 0, &matches, true, &par_stats, &cancel).unwrap();

        assert_eq!(sequential.len(), rows.len());
        for (i, (a, b)) in sequential.iter().zip(&parallel).enumerate() {
            assert_eq!(a.row.get(1), Some(i.to_string().as_str()));
            assert_eq!(b.row.get(1), Some(i.to_string().as_str()));
            assert_eq!(a.fields, b.fields);
        }
        assert_eq!(seq_stats.snapshot(), par_stats.snapshot());
        assert_eq!(seq_stats.enriched(), rows.len() as u64);
        assert_eq!(
            seq_stats.matched() + seq_stats.unmatched(),
            rows.len() as u64
        );
    }

    #[test]
    fn stats_split_outcomes() {
        let rows = many_rows(6);
        let matches: MatchTable = vec![IndexRecord {
            key: "k0".into(),
            ..Default::default()
        }]
        .into_iter()
        .collect();
        let stats = EnrichmentStats::new();
        enrich_rows(&rows, 0, &matches, false, &stats, &CancellationToken::new()).unwrap();

        // k0 matched; k3 unknown; two empty; two "missing"
        assert_eq!(stats.matched(), 1);
        assert_eq!(stats.unmatched(), 5);
        assert_eq!(stats.empty(), 2);
    }

    #[test]
    fn cancelled_enrichment_returns_error() {
        let rows = many_rows(10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = enrich_rows(
            &rows,
            0,
            &MatchTable::default(),
            true,
            &EnrichmentStats::new(),
            &cancel,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<EnrichError>(),
            Some(EnrichError::Cancelled)
        ));
    }
}
