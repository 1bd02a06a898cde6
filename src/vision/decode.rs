//! Greedy CTC decoding of the recognition model output
//!
//! The model emits a `[time_steps, num_classes]` score matrix. Best-path
//! decoding takes the top class per step, drops blanks, merges runs of the
//! same class and maps what is left through the [`Dictionary`].

use tracing::debug;

use super::dictionary::{Dictionary, BLANK};
use crate::error::OcrError;

/// Decoded text with the mean score of its emitted glyphs
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    /// 0.0 when nothing was emitted
    pub confidence: f32,
}

/// Highest-scoring class of a row; ties go to the lowest index
fn argmax(row: &[f32]) -> (usize, f32) {
    row.iter()
        .enumerate()
        .skip(1)
        .fold((0, row[0]), |best, (i, &score)| {
            if score > best.1 {
                (i, score)
            } else {
                best
            }
        })
}

fn check_shape(output: &[f32], time_steps: usize, num_classes: usize) -> Result<(), OcrError> {
    if num_classes == 0 {
        return Err(OcrError::shape("decode classes", 1, 0));
    }
    let expected = time_steps
        .checked_mul(num_classes)
        .ok_or_else(|| OcrError::shape("decode", usize::MAX, output.len()))?;
    if output.len() != expected {
        return Err(OcrError::shape("decode", expected, output.len()));
    }
    Ok(())
}

/// Best class index and its score for every time step
pub fn best_path(output: &[f32], time_steps: usize, num_classes: usize) -> Result<Vec<(usize, f32)>, OcrError> {
    check_shape(output, time_steps, num_classes)?;
    Ok(output.chunks_exact(num_classes).map(argmax).collect())
}

/// Standard CTC collapse: merge consecutive repeats, then drop blanks.
///
/// A blank between two equal classes keeps both, so `[1, 0, 1]` yields `[1, 1]`.
pub fn collapse(path: &[usize]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut prev = None;
    for &idx in path {
        if idx != BLANK && prev != Some(idx) {
            out.push(idx);
        }
        prev = Some(idx);
    }
    out
}

/// Decode a flat time-major score matrix into text
pub fn decode(
    output: &[f32],
    time_steps: usize,
    num_classes: usize,
    dictionary: &Dictionary,
) -> Result<String, OcrError> {
    decode_with_confidence(output, time_steps, num_classes, dictionary).map(|d| d.text)
}

/// Decode and report the mean winning score of the emitted glyphs
pub fn decode_with_confidence(
    output: &[f32],
    time_steps: usize,
    num_classes: usize,
    dictionary: &Dictionary,
) -> Result<Decoded, OcrError> {
    if dictionary.num_classes() != num_classes {
        return Err(OcrError::shape("dictionary", dictionary.num_classes(), num_classes));
    }
    let path = best_path(output, time_steps, num_classes)?;

    let mut text = String::new();
    let mut score_sum = 0.0f32;
    let mut emitted = 0usize;
    let mut prev = None;

    for &(idx, score) in &path {
        if idx != BLANK && prev != Some(idx) {
            debug_assert!(idx < num_classes);
            if let Some(glyph) = dictionary.glyph(idx) {
                text.push_str(glyph);
                score_sum += score;
                emitted += 1;
            }
        }
        prev = Some(idx);
    }

    let confidence = if emitted > 0 {
        score_sum / emitted as f32
    } else {
        0.0
    };

    debug!(
        "Decoded {} steps x {} classes into {} glyphs (confidence {:.3})",
        time_steps, num_classes, emitted, confidence
    );

    Ok(Decoded { text, confidence })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-hot score matrix whose argmax per row follows `path`
    fn one_hot(path: &[usize], num_classes: usize) -> Vec<f32> {
        path.iter()
            .flat_map(|&idx| (0..num_classes).map(move |c| if c == idx { 0.9 } else { 0.1 / num_classes as f32 }))
            .collect()
    }

    fn abc() -> Dictionary {
        Dictionary::new(["_", "a", "b", "c"]).unwrap()
    }

    #[test]
    fn test_collapses_repeats_and_blanks() {
        let path = [0, 2, 2, 2, 0, 3, 3, 0];
        let output = one_hot(&path, 4);

        assert_eq!(decode(&output, 8, 4, &abc()).unwrap(), "bc");
    }

    #[test]
    fn test_blank_separates_repeated_glyph() {
        let output = one_hot(&[1, 1, 0, 1], 4);
        assert_eq!(decode(&output, 4, 4, &abc()).unwrap(), "aa");
    }

    #[test]
    fn test_all_blank_is_empty() {
        let output = one_hot(&[0; 6], 4);
        let decoded = decode_with_confidence(&output, 6, 4, &abc()).unwrap();

        assert_eq!(decoded.text, "");
        assert_eq!(decoded.confidence, 0.0);
    }

    #[test]
    fn test_zero_time_steps_is_empty() {
        assert_eq!(decode(&[], 0, 4, &abc()).unwrap(), "");
    }

    #[test]
    fn test_length_mismatch() {
        let output = vec![0.0; 4 * 8 - 1];

        assert_eq!(
            decode(&output, 8, 4, &abc()),
            Err(OcrError::ShapeMismatch {
                stage: "decode",
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_dictionary_class_count_mismatch() {
        let output = one_hot(&[1, 2], 5);
        assert_eq!(
            decode(&output, 2, 5, &abc()),
            Err(OcrError::shape("dictionary", 4, 5))
        );
    }

    #[test]
    fn test_ties_pick_lowest_index() {
        // Row 0 ties blank and 'a', row 1 ties 'b' and 'c'
        let output = vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.5, 0.5];

        let path: Vec<usize> = best_path(&output, 2, 4).unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(path, vec![0, 2]);
        assert_eq!(decode(&output, 2, 4, &abc()).unwrap(), "b");
    }

    #[test]
    fn test_multi_char_glyphs() {
        let dict = Dictionary::new(["", "ab", "€"]).unwrap();
        let output = one_hot(&[1, 0, 2, 2], 3);

        assert_eq!(decode(&output, 4, 3, &dict).unwrap(), "ab€");
    }

    #[test]
    fn test_confidence_is_mean_of_emitted_scores() {
        let output = vec![
            0.1, 0.8, 0.1, 0.0, // a
            0.1, 0.7, 0.2, 0.0, // a (merged, not counted)
            0.2, 0.2, 0.6, 0.0, // b
        ];
        let decoded = decode_with_confidence(&output, 3, 4, &abc()).unwrap();

        assert_eq!(decoded.text, "ab");
        assert!((decoded.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_collapse() {
        assert_eq!(collapse(&[0, 2, 2, 2, 0, 3, 3, 0]), vec![2, 3]);
        assert_eq!(collapse(&[1, 0, 1]), vec![1, 1]);
        assert!(collapse(&[]).is_empty());
    }
}
