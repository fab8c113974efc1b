use super::{scored, Rescorer};
use crate::ids::StringLongMapping;
use crate::topn::NumericIdValue;

/// Emits `(item, count)` pairs, subject to an optional rescorer.
pub struct PopularityIterator<'a, I> {
    counts: I,
    rescorer: Option<&'a dyn Rescorer>,
    ids: &'a StringLongMapping,
}

impl<'a, I> PopularityIterator<'a, I>
where
    I: Iterator<Item = (i64, f32)>,
{
    pub fn new(counts: I, rescorer: Option<&'a dyn Rescorer>, ids: &'a StringLongMapping) -> Self {
        Self { counts, rescorer, ids }
    }

    fn score(&self, id: i64, count: f32) -> Option<NumericIdValue> {
        let mut score = count as f64;
        if let Some(rescorer) = self.rescorer {
            let s = self.ids.to_id_string(id);
            if rescorer.is_filtered(&s) {
                return None;
            }
            score = rescorer.rescore(&s, score);
        }
        scored(id, score)
    }
}

impl<'a, I> Iterator for PopularityIterator<'a, I>
where
    I: Iterator<Item = (i64, f32)>,
{
    type Item = NumericIdValue;

    fn next(&mut self) -> Option<NumericIdValue> {
        loop {
            let (id, count) = self.counts.next()?;
            if let Some(hit) = self.score(id, count) {
                return Some(hit);
            }
        }
    }
}
