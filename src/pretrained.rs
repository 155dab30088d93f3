//! Named pretrained embedding tables
//!
//! An alias names the raw text file a table is built from, where that file
//! is published, and how lookups should treat misses. Fetching and unpacking
//! the archive is left to the caller; [`Pretrained::open`] expects the text
//! file in the cache directory (or an existing cache triple for it).

use thiserror::Error;
use wordvec_core::{LookupStrategy, TableError, TableOptions, VectorTable};

#[derive(Error, Debug)]
pub enum PretrainedError {
    #[error("Unknown pretrained alias {name:?}; expected one of: {known}")]
    UnknownAlias { name: String, known: String },

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pretrained {
    alias: &'static str,
    file_name: &'static str,
    url: &'static str,
    dim: usize,
    strategy: LookupStrategy,
}

const GLOVE_42B: &str = "http://nlp.stanford.edu/data/glove.42B.300d.zip";
const GLOVE_840B: &str = "http://nlp.stanford.edu/data/glove.840B.300d.zip";
const GLOVE_TWITTER: &str = "http://nlp.stanford.edu/data/glove.twitter.27B.zip";
const GLOVE_6B: &str = "http://nlp.stanford.edu/data/glove.6B.zip";

const fn glove(alias: &'static str, file_name: &'static str, url: &'static str, dim: usize) -> Pretrained {
    Pretrained {
        alias,
        file_name,
        url,
        dim,
        strategy: LookupStrategy::Direct,
    }
}

/// Every known alias
pub const PRETRAINED: [Pretrained; 13] = [
    Pretrained {
        alias: "charngram.100d",
        file_name: "charNgram.txt",
        url: "http://www.logos.t.u-tokyo.ac.jp/~hassy/publications/arxiv2016jmt/jmt_pre-trained_embeddings.tar.gz",
        dim: 100,
        strategy: LookupStrategy::CharNGram,
    },
    Pretrained {
        alias: "fasttext.en.300d",
        file_name: "cc.en.300.vec",
        url: "https://dl.fbaipublicfiles.com/fasttext/vectors-crawl/cc.en.300.vec.gz",
        dim: 300,
        strategy: LookupStrategy::Direct,
    },
    Pretrained {
        alias: "fasttext.simple.300d",
        file_name: "cc.simple.300.vec",
        url: "https://dl.fbaipublicfiles.com/fasttext/vectors-crawl/cc.simple.300.vec.gz",
        dim: 300,
        strategy: LookupStrategy::Direct,
    },
    glove("glove.42B.300d", "glove.42B.300d.txt", GLOVE_42B, 300),
    glove("glove.840B.300d", "glove.840B.300d.txt", GLOVE_840B, 300),
    glove("glove.twitter.27B.25d", "glove.twitter.27B.25d.txt", GLOVE_TWITTER, 25),
    glove("glove.twitter.27B.50d", "glove.twitter.27B.50d.txt", GLOVE_TWITTER, 50),
    glove("glove.twitter.27B.100d", "glove.twitter.27B.100d.txt", GLOVE_TWITTER, 100),
    glove("glove.twitter.27B.200d", "glove.twitter.27B.200d.txt", GLOVE_TWITTER, 200),
    glove("glove.6B.50d", "glove.6B.50d.txt", GLOVE_6B, 50),
    glove("glove.6B.100d", "glove.6B.100d.txt", GLOVE_6B, 100),
    glove("glove.6B.200d", "glove.6B.200d.txt", GLOVE_6B, 200),
    glove("glove.6B.300d", "glove.6B.300d.txt", GLOVE_6B, 300),
];

impl Pretrained {
    pub fn from_alias(name: &str) -> Result<&'static Pretrained, PretrainedError> {
        PRETRAINED
            .iter()
            .find(|p| p.alias == name)
            .ok_or_else(|| PretrainedError::UnknownAlias {
                name: name.to_string(),
                known: Self::aliases().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn aliases() -> impl Iterator<Item = &'static str> {
        PRETRAINED.iter().map(|p| p.alias)
    }

    pub fn alias(&self) -> &'static str {
        self.alias
    }

    /// Text file name inside the cache directory
    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// Where the archive containing the text file is published
    pub fn url(&self) -> &'static str {
        self.url
    }

    /// Published vector dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn strategy(&self) -> LookupStrategy {
        self.strategy
    }

    /// `options` with this alias's lookup strategy
    pub fn table_options(&self, options: &TableOptions) -> TableOptions {
        options.clone().with_strategy(self.strategy)
    }

    /// Open the table through the cache directory in `options`
    pub fn open(&self, options: &TableOptions) -> Result<VectorTable, PretrainedError> {
        tracing::info!("Opening pretrained vectors {} ({})", self.alias, self.file_name);
        Ok(VectorTable::open(self.file_name, &self.table_options(options))?)
    }
}
