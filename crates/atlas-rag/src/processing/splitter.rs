//! Text windowing for embedding
//!
//! Windows are measured in Unicode code points, never bytes; byte slicing
//! would corrupt multi-byte scripts. The final window is truncated to the
//! remainder and empty windows are never produced.

/// Split text into overlapping windows of `window` code points with
/// `overlap` code points shared between neighbors. Falls back to
/// non-overlapping windows when the overlap is not smaller than the window.
pub fn split_text(text: &str, window: usize, overlap: usize) -> Vec<String> {
    if window == 0 {
        return Vec::new();
    }
    if window <= overlap {
        return simple_split(text, window);
    }

    let runes: Vec<char> = text.chars().collect();
    if runes.is_empty() {
        return Vec::new();
    }

    let step = window - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < runes.len() {
        let end = (start + window).min(runes.len());
        chunks.push(runes[start..end].iter().collect());
        if end == runes.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn simple_split(text: &str, window: usize) -> Vec<String> {
    let runes: Vec<char> = text.chars().collect();
    if runes.is_empty() {
        return Vec::new();
    }
    runes
        .chunks(window)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
