use super::{scored, PairRescorer};
use crate::ids::StringLongMapping;
use crate::topn::NumericIdValue;
use crate::vectors::{cosine_with_norm, norm, SharedVector};

/// Scores items by mean cosine similarity to a set of query items.
///
/// The query items themselves are never emitted. With a pair rescorer, a
/// candidate is dropped if any of its (candidate, query) pairs is filtered, and
/// each pair's similarity is rescored before averaging.
pub struct SimilarItemsIterator<'a, I> {
    entries: I,
    query_ids: &'a [i64],
    queries: &'a [Vec<f32>],
    query_norms: Vec<f64>,
    query_strings: Vec<String>,
    rescorer: Option<&'a dyn PairRescorer>,
    ids: &'a StringLongMapping,
}

impl<'a, I> SimilarItemsIterator<'a, I>
where
    I: Iterator<Item = (i64, &'a SharedVector)>,
{
    pub fn new(
        entries: I,
        query_ids: &'a [i64],
        queries: &'a [Vec<f32>],
        rescorer: Option<&'a dyn PairRescorer>,
        ids: &'a StringLongMapping,
    ) -> Self {
        let query_norms = queries.iter().map(|q| norm(q)).collect();
        let query_strings = match rescorer {
            Some(_) => query_ids.iter().map(|id| ids.to_id_string(*id)).collect(),
            None => Vec::new(),
        };
        Self { entries, query_ids, queries, query_norms, query_strings, rescorer, ids }
    }

    fn score(&self, id: i64, row: &SharedVector) -> Option<NumericIdValue> {
        if self.query_ids.contains(&id) {
            return None;
        }
        let candidate = match self.rescorer {
            Some(_) => Some(self.ids.to_id_string(id)),
            None => None,
        };

        let values = row.read();
        let mut total = 0.0;
        for (j, query) in self.queries.iter().enumerate() {
            let mut similarity = cosine_with_norm(&values, query, self.query_norms[j]);
            if let (Some(rescorer), Some(c)) = (self.rescorer, candidate.as_deref()) {
                let q = &self.query_strings[j];
                if rescorer.is_filtered(c, q) {
                    return None;
                }
                similarity = rescorer.rescore(c, q, similarity);
            }
            total += similarity;
        }
        scored(id, total / self.queries.len() as f64)
    }
}

impl<'a, I> Iterator for SimilarItemsIterator<'a, I>
where
    I: Iterator<Item = (i64, &'a SharedVector)>,
{
    type Item = NumericIdValue;

    fn next(&mut self) -> Option<NumericIdValue> {
        loop {
            let (id, row) = self.entries.next()?;
            if let Some(hit) = self.score(id, row) {
                return Some(hit);
            }
        }
    }
}
