use crate::case_data::CaseRecord;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.65;

/// Longer inputs are cut to this many characters before scoring.
const MAX_COMPARED_CHARS: usize = 2_000;

/// A worked case close enough to the current one to be shown to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarCase {
    pub case: CaseRecord,
    pub score: f64,
}

/// Subject and description joined by a space, trimmed.
pub fn comparison_text(case: &CaseRecord) -> String {
    format!("{} {}", case.subject, case.description)
        .trim()
        .to_string()
}

/// Scores every candidate against `current` and keeps the best one at or above
/// `threshold`. The earliest candidate wins a tie.
pub fn find_most_similar(
    current: &CaseRecord,
    candidates: &[CaseRecord],
    threshold: f64,
) -> Option<SimilarCase> {
    let current_text = comparison_text(current);
    let mut best: Option<(usize, f64)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let score = similarity_ratio(&current_text, &comparison_text(candidate));
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.filter(|(_, score)| *score > 0.0 && *score >= threshold)
        .map(|(index, score)| SimilarCase {
            case: candidates[index].clone(),
            score,
        })
}

/// Case-insensitive Ratcliff/Obershelp ratio in `[0, 1]`: twice the matched
/// characters over the total length. Either side empty scores 0.
pub fn similarity_ratio(left: &str, right: &str) -> f64 {
    let left = normalized_chars(left);
    let right = normalized_chars(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let matched = matched_chars(&left, &right);
    (2 * matched) as f64 / (left.len() + right.len()) as f64
}

fn normalized_chars(text: &str) -> Vec<char> {
    text.to_lowercase().chars().take(MAX_COMPARED_CHARS).collect()
}

/// Sum of the sizes of all matching blocks: take the longest common run, then
/// recurse into the pieces on either side of it.
fn matched_chars(left: &[char], right: &[char]) -> usize {
    let mut pending = vec![(0, left.len(), 0, right.len())];
    let mut matched = 0;

    while let Some((left_lo, left_hi, right_lo, right_hi)) = pending.pop() {
        let (i, j, size) = longest_match(left, right, left_lo..left_hi, right_lo..right_hi);
        if size == 0 {
            continue;
        }
        matched += size;
        if left_lo < i && right_lo < j {
            pending.push((left_lo, i, right_lo, j));
        }
        if i + size < left_hi && j + size < right_hi {
            pending.push((i + size, left_hi, j + size, right_hi));
        }
    }

    matched
}

/// Longest run shared by both ranges; the earliest start in `left`, then in
/// `right`, wins among equally long runs.
fn longest_match(
    left: &[char],
    right: &[char],
    left_range: std::ops::Range<usize>,
    right_range: std::ops::Range<usize>,
) -> (usize, usize, usize) {
    let width = right_range.len();
    let mut previous = vec![0usize; width + 1];
    let mut current = vec![0usize; width + 1];
    let (mut best_i, mut best_j, mut best_size) = (left_range.start, right_range.start, 0);

    for i in left_range {
        for (offset, j) in right_range.clone().enumerate() {
            current[offset + 1] = if left[i] == right[j] {
                previous[offset] + 1
            } else {
                0
            };
            let size = current[offset + 1];
            if size > best_size {
                best_i = i + 1 - size;
                best_j = j + 1 - size;
                best_size = size;
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    (best_i, best_j, best_size)
}
