//! Character n-gram composite vectors
//!
//! Tables such as `charNgram.txt` store keys like `3gram-#BEGIN#ca`. A token's
//! vector is the mean of every 2-, 3- and 4-gram window found in the table,
//! where the token's chars are bracketed by `#BEGIN#` and `#END#` symbols.

/// Symbol prepended to the token's chars
pub const BEGIN_MARKER: &str = "#BEGIN#";

/// Symbol appended to the token's chars
pub const END_MARKER: &str = "#END#";

/// Token that always maps to the unknown vector
pub const UNK_TOKEN: &str = "<unk>";

/// Window sizes, in symbols
pub const NGRAM_SIZES: [usize; 3] = [2, 3, 4];

/// All n-gram keys for `token`, shortest windows first
pub fn ngram_keys(token: &str) -> Vec<String> {
    let mut symbols: Vec<&str> = Vec::with_capacity(token.len() + 2);
    symbols.push(BEGIN_MARKER);
    symbols.extend(
        token
            .char_indices()
            .map(|(i, c)| &token[i..i + c.len_utf8()]),
    );
    symbols.push(END_MARKER);

    let mut keys = Vec::new();
    for n in NGRAM_SIZES {
        for window in symbols.windows(n) {
            keys.push(format!("{}gram-{}", n, window.concat()));
        }
    }
    keys
}

/// Element-wise mean of `rows`, or `None` if there are none
pub fn mean_of<'a, I>(rows: I, dim: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum = vec![0.0f32; dim];
    let mut count = 0usize;
    for row in rows {
        for (acc, &v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let scale = 1.0 / count as f32;
    sum.iter_mut().for_each(|v| *v *= scale);
    Some(sum)
}
