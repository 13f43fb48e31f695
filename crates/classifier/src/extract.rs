//! Top-1 result extraction

use serde::{Deserialize, Serialize};

use crate::ScoreBuffer;

/// Predicted class of one image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub class_id: usize,
    pub score: f32,
}

/// Leftmost index of the maximum score.
///
/// Ties keep the first occurrence; NaN never displaces an earlier value.
pub fn argmax(row: &[f32]) -> Option<(usize, f32)> {
    let (first, rest) = row.split_first()?;
    let mut best = (0, *first);
    for (i, &score) in rest.iter().enumerate() {
        if score > best.1 {
            best = (i + 1, score);
        }
    }
    Some(best)
}

/// One result per score row, in batch order
pub fn top1(scores: &ScoreBuffer) -> Vec<ClassificationResult> {
    scores
        .rows()
        .filter_map(argmax)
        .map(|(class_id, score)| ClassificationResult { class_id, score })
        .collect()
}
