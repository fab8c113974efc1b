use super::scored;
use crate::topn::NumericIdValue;
use crate::vectors::{cosine_with_norm, norm, SharedVector};

/// Scores a user's known items by cosine similarity to one target item.
pub struct BecauseIterator<'a, I> {
    known: I,
    target: &'a [f32],
    target_norm: f64,
}

impl<'a, I> BecauseIterator<'a, I>
where
    I: Iterator<Item = (i64, &'a SharedVector)>,
{
    pub fn new(known: I, target: &'a [f32]) -> Self {
        Self { known, target, target_norm: norm(target) }
    }
}

impl<'a, I> Iterator for BecauseIterator<'a, I>
where
    I: Iterator<Item = (i64, &'a SharedVector)>,
{
    type Item = NumericIdValue;

    fn next(&mut self) -> Option<NumericIdValue> {
        loop {
            let (id, row) = self.known.next()?;
            let similarity = cosine_with_norm(&row.read(), self.target, self.target_norm);
            if let Some(hit) = scored(id, similarity) {
                return Some(hit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors::FeatureVector;

    #[test]
    fn test_scores_known_items_against_target() {
        let known = vec![
            (10, FeatureVector::shared(vec![1.0, 0.0])),
            (11, FeatureVector::shared(vec![0.0, 1.0])),
            (12, FeatureVector::shared(vec![0.0, 0.0])),
        ];
        let target = vec![2.0, 0.0];
        let out: Vec<_> = BecauseIterator::new(known.iter().map(|(k, v)| (*k, v)), &target).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, 10);
        assert!((out[0].value - 1.0).abs() < 1e-6);
        assert!(out[1].value.abs() < 1e-6);
    }
}
