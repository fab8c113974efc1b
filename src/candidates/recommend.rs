use super::{scored, Rescorer};
use crate::collections::LongSet;
use crate::ids::StringLongMapping;
use crate::topn::NumericIdValue;
use crate::vectors::{dot, SharedVector};
use parking_lot::Mutex;

/// Scores items by their mean dot product with a set of user vectors.
pub struct RecommendIterator<'a, I> {
    entries: I,
    queries: &'a [Vec<f32>],
    exclude: Option<&'a Mutex<LongSet>>,
    rescorer: Option<&'a dyn Rescorer>,
    ids: &'a StringLongMapping,
}

impl<'a, I> RecommendIterator<'a, I>
where
    I: Iterator<Item = (i64, &'a SharedVector)>,
{
    pub fn new(
        entries: I,
        queries: &'a [Vec<f32>],
        exclude: Option<&'a Mutex<LongSet>>,
        rescorer: Option<&'a dyn Rescorer>,
        ids: &'a StringLongMapping,
    ) -> Self {
        Self { entries, queries, exclude, rescorer, ids }
    }

    fn score(&self, id: i64, row: &SharedVector) -> Option<NumericIdValue> {
        if let Some(known) = self.exclude {
            if known.lock().contains(id) {
                return None;
            }
        }
        let id_string = match self.rescorer {
            Some(rescorer) => {
                let s = self.ids.to_id_string(id);
                if rescorer.is_filtered(&s) {
                    return None;
                }
                Some(s)
            }
            None => None,
        };

        let total: f64 = {
            let values = row.read();
            self.queries.iter().map(|q| dot(&values, q)).sum()
        };
        let mut score = total / self.queries.len() as f64;
        if let (Some(rescorer), Some(s)) = (self.rescorer, id_string.as_deref()) {
            score = rescorer.rescore(s, score);
        }
        scored(id, score)
    }
}

impl<'a, I> Iterator for RecommendIterator<'a, I>
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors::FeatureVector;

    struct DropOddBoostRest;

    impl Rescorer for DropOddBoostRest {
        fn is_filtered(&self, id: &str) -> bool {
            id.parse::<i64>().map(|n| n % 2 == 1).unwrap_or(false)
        }
        fn rescore(&self, id: &str, score: f64) -> f64 {
            if id == "4" { f64::NAN } else { score * 10.0 }
        }
    }

    fn rows() -> Vec<(i64, SharedVector)> {
        (1..=4).map(|i| (i, FeatureVector::shared(vec![i as f32, 0.0]))).collect()
    }

    #[test]
    fn test_mean_dot_over_queries() {
        let rows = rows();
        let ids = StringLongMapping::new();
        let queries = vec![vec![1.0, 0.0], vec![3.0, 0.0]];
        let out: Vec<_> = RecommendIterator::new(rows.iter().map(|(k, v)| (*k, v)), &queries, None, None, &ids).collect();
        assert_eq!(out.len(), 4);
        // item 2: (2*1 + 2*3) / 2 = 4
        assert_eq!(out[1].id, 2);
        assert!((out[1].value - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_exclusion_and_rescoring() {
        let rows = rows();
        let ids = StringLongMapping::new();
        let queries = vec![vec![1.0, 0.0]];
        let mut known = LongSet::new();
        known.insert(2).unwrap();
        let known = Mutex::new(known);
        let rescorer = DropOddBoostRest;
        let out: Vec<_> = RecommendIterator::new(
            rows.iter().map(|(k, v)| (*k, v)),
            &queries,
            Some(&known),
            Some(&rescorer),
            &ids,
        )
        .collect();
        // 1, 3 filtered; 2 known; 4 vetoed by NaN
        assert!(out.is_empty());
    }
}
