//! Vocabulary: token <-> id, with optional embedding rows
//!
//! Ids are assigned specials first, then tokens by descending frequency with
//! ties broken alphabetically. Unknown tokens map to id 0.

use std::collections::HashMap;

use thiserror::Error;
use wordvec_core::{Initializer, Matrix, VectorTable};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VocabError {
    #[error("No vector tables given")]
    NoTables,

    #[error("{len} values do not fill {rows} rows of dimension {dim}")]
    Shape { len: usize, rows: usize, dim: usize },
}

/// How rows from several tables are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorMode {
    /// One matrix whose rows are each table's row end to end
    #[default]
    Concatenate,
    /// One matrix per table
    Separate,
}

/// Embedding rows aligned with a vocabulary's ids
#[derive(Debug, Clone, PartialEq)]
pub enum VocabVectors {
    Single(Matrix),
    PerTable(Vec<Matrix>),
}

#[derive(Debug, Clone)]
pub struct VocabOptions {
    /// Cap on non-special tokens; `None` is unbounded
    pub max_size: Option<usize>,
    /// Values below 1 act as 1
    pub min_freq: u64,
    pub specials: Vec<String>,
}

impl Default for VocabOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            min_freq: 1,
            specials: vec!["<pad>".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    freqs: HashMap<String, u64>,
    itos: Vec<String>,
    stoi: HashMap<String, usize>,
    vectors: Option<VocabVectors>,
}

impl Vocab {
    pub fn new(freqs: HashMap<String, u64>, options: &VocabOptions) -> Self {
        let mut itos: Vec<String> = Vec::with_capacity(options.specials.len() + freqs.len());
        for special in &options.specials {
            if !itos.contains(special) {
                itos.push(special.clone());
            }
        }

        let mut ranked: Vec<(&String, u64)> = freqs
            .iter()
            .filter(|(token, _)| !options.specials.contains(token))
            .map(|(token, &count)| (token, count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let min_freq = options.min_freq.max(1);
        let limit = options.max_size.unwrap_or(usize::MAX);
        itos.extend(
            ranked
                .into_iter()
                .take_while(|&(_, count)| count >= min_freq)
                .take(limit)
                .map(|(token, _)| token.clone()),
        );

        let stoi = itos
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i))
            .collect();

        Self {
            freqs,
            itos,
            stoi,
            vectors: None,
        }
    }

    /// Count `tokens` and build a vocabulary from the counts
    pub fn from_tokens<I, S>(tokens: I, options: &VocabOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut freqs: HashMap<String, u64> = HashMap::new();
        for token in tokens {
            *freqs.entry(token.as_ref().to_string()).or_insert(0) += 1;
        }
        Self::new(freqs, options)
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    /// Id of `token`, 0 if unknown
    pub fn stoi(&self, token: &str) -> usize {
        self.get(token).unwrap_or(0)
    }

    pub fn get(&self, token: &str) -> Option<usize> {
        self.stoi.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.itos.get(id).map(String::as_str)
    }

    pub fn itos(&self) -> &[String] {
        &self.itos
    }

    /// Raw counts the vocabulary was built from
    pub fn freqs(&self) -> &HashMap<String, u64> {
        &self.freqs
    }

    pub fn vectors(&self) -> Option<&VocabVectors> {
        self.vectors.as_ref()
    }

    /// Append tokens of `other` not already present.
    ///
    /// With `sort`, the new tokens are appended in alphabetical order.
    /// Counts are not merged; vectors are left as they were.
    pub fn extend(&mut self, other: &Vocab, sort: bool) {
        let mut added: Vec<&String> = other
            .itos
            .iter()
            .filter(|token| !self.stoi.contains_key(*token))
            .collect();
        if sort {
            added.sort();
        }
        for token in added {
            if self.stoi.contains_key(token) {
                continue;
            }
            self.stoi.insert(token.clone(), self.itos.len());
            self.itos.push(token.clone());
        }
    }

    /// Fill one row per id from `tables`.
    ///
    /// Misses follow each table's lookup strategy.
    pub fn load_vectors(&mut self, tables: &[&VectorTable], mode: VectorMode) -> Result<(), VocabError> {
        if tables.is_empty() {
            return Err(VocabError::NoTables);
        }

        let vectors = match mode {
            VectorMode::Concatenate => {
                let dim: usize = tables.iter().map(|t| t.dim()).sum();
                let mut data = Vec::with_capacity(self.len() * dim);
                for token in &self.itos {
                    for table in tables {
                        data.extend_from_slice(&table.lookup(token));
                    }
                }
                VocabVectors::Single(matrix(data, self.len(), dim)?)
            }
            VectorMode::Separate => VocabVectors::PerTable(
                tables
                    .iter()
                    .map(|table| {
                        let mut data = Vec::with_capacity(self.len() * table.dim());
                        for token in &self.itos {
                            data.extend_from_slice(&table.lookup(token));
                        }
                        matrix(data, self.len(), table.dim())
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };

        tracing::debug!(
            "Loaded vectors for {} tokens from {} table(s)",
            self.len(),
            tables.len()
        );
        self.vectors = Some(vectors);
        Ok(())
    }

    /// Set rows from an external `stoi` and matrix.
    ///
    /// Tokens missing from `stoi`, or whose id has no row, get `init` output.
    pub fn set_vectors(
        &mut self,
        stoi: &HashMap<String, usize>,
        rows: &Matrix,
        init: &dyn Initializer,
    ) -> Result<(), VocabError> {
        let dim = rows.dim();
        let mut data = Vec::with_capacity(self.len() * dim);
        for token in &self.itos {
            match stoi.get(token).and_then(|&i| rows.try_row(i)) {
                Some(row) => data.extend_from_slice(row),
                None => data.extend(init.initialize(dim)),
            }
        }
        self.vectors = Some(VocabVectors::Single(matrix(data, self.len(), dim)?));
        Ok(())
    }
}

fn matrix(data: Vec<f32>, rows: usize, dim: usize) -> Result<Matrix, VocabError> {
    let len = data.len();
    Matrix::new(data.into(), rows, dim).ok_or(VocabError::Shape { len, rows, dim })
}
