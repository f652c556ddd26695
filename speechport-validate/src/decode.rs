//! Greedy decoding of logits

use ndarray::{ArrayView1, ArrayView3, Axis};

use crate::error::{Result, ValidationError};

/// Index of the largest finite value; the first one wins on ties.
/// Returns `None` when the row holds no finite value.
pub fn argmax(row: ArrayView1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in row.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Per batch element, the arg-max class of every frame of a
/// `(batch, frames, vocab)` logits tensor
pub fn predicted_ids(logits: ArrayView3<f32>) -> Result<Vec<Vec<usize>>> {
    if logits.len_of(Axis(2)) == 0 {
        return Err(ValidationError::Decode("logit axis is empty".to_string()));
    }

    logits
        .outer_iter()
        .map(|frames| {
            frames
                .outer_iter()
                .enumerate()
                .map(|(t, row)| {
                    argmax(row).ok_or_else(|| {
                        ValidationError::Decode(format!("frame {} has no finite logits", t))
                    })
                })
                .collect()
        })
        .collect()
}
