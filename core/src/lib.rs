//! Concept search over a text corpus: tf-idf weighting, an LSI topic model,
//! cosine ranking in topic space, boolean keyword filters and per-word match
//! explanations.

pub mod config;
pub mod error;
pub mod explain;
pub mod ingest;
pub mod keyword;
pub mod linalg;
pub mod lsi;
pub mod metadata;
pub mod persist;
pub mod rank;
pub mod session;
pub mod similarity;
pub mod sparse;
pub mod tfidf;
pub mod tokenizer;
pub mod vocab;

pub type WordId = u32;
pub type DocId = u32;

pub use config::{BuildConfig, LsiConfig, Normalization, PruneConfig, TfidfConfig, TokenizerConfig};
pub use error::{Outcome, Result, SearchError, Warning};
pub use explain::{ExplainOptions, Explanation};
pub use ingest::{CorpusBuilder, IngestRecord, SourceRef};
pub use keyword::KeywordQuery;
pub use persist::{load_bundle, save_bundle, BundleMeta};
pub use rank::Hit;
pub use session::Session;
pub use sparse::{Corpus, SparseVector};
pub use vocab::Vocabulary;
