use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::TokenizerConfig;
use crate::lsi::TopicModel;
use crate::metadata::DocumentMetadata;
use crate::session::Session;
use crate::similarity::SimilarityIndex;
use crate::sparse::Corpus;
use crate::tfidf::TfidfModel;
use crate::vocab::Vocabulary;
use crate::{Result, SearchError};

/// Bumped whenever any artifact's encoding changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub version: u32,
    pub created_at: String,
    pub num_docs: usize,
    pub num_terms: usize,
    pub num_topics: usize,
    pub tokenizer: TokenizerConfig,
}

/// File layout of a bundle directory.
pub struct BundlePaths {
    pub root: PathBuf,
}

impl BundlePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn vocabulary(&self) -> PathBuf { self.root.join("vocabulary.bin") }
    pub fn tfidf(&self) -> PathBuf { self.root.join("tfidf.bin") }
    pub fn corpus(&self) -> PathBuf { self.root.join("corpus.bin") }
    pub fn model(&self) -> PathBuf { self.root.join("model.bin") }
    pub fn index(&self) -> PathBuf { self.root.join("index.bin") }
    pub fn metadata(&self) -> PathBuf { self.root.join("metadata.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// Every artifact file, `meta.json` last.
    pub fn all(&self) -> [PathBuf; 7] {
        [self.vocabulary(), self.tfidf(), self.corpus(), self.model(), self.index(), self.metadata(), self.meta()]
    }
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path)
        .map_err(|e| SearchError::CorruptBundle(format!("cannot open {}: {e}", path.display())))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    // Deserializing re-checks every structural invariant of the artifact.
    bincode::deserialize(&buf).map_err(|e| SearchError::CorruptBundle(format!("{}: {e}", path.display())))
}

/// Write every artifact of a trained session into `dir`.
pub fn save_bundle<P: AsRef<Path>>(session: &Session, dir: P) -> Result<BundleMeta> {
    let (Some(model), Some(index)) = (session.model(), session.index()) else {
        return Err(SearchError::UntrainedModel { what: "bundle save" });
    };
    let paths = BundlePaths::new(dir);
    create_dir_all(&paths.root)?;

    save_bin(&paths.vocabulary(), session.vocabulary())?;
    save_bin(&paths.tfidf(), session.tfidf())?;
    save_bin(&paths.corpus(), session.corpus())?;
    save_bin(&paths.model(), model)?;
    save_bin(&paths.index(), index)?;
    save_bin(&paths.metadata(), session.metadata())?;

    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| SearchError::InvalidConfig(format!("cannot format timestamp: {e}")))?;
    let meta = BundleMeta {
        version: FORMAT_VERSION,
        created_at,
        num_docs: session.corpus().len(),
        num_terms: session.vocabulary().len(),
        num_topics: model.num_topics(),
        tokenizer: session.tokenizer().config(),
    };
    save_meta(&paths, &meta)?;
    tracing::info!(dir = %paths.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, num_topics = meta.num_topics, "bundle saved");
    Ok(meta)
}

/// Save only the metadata artifact, e.g. after tagging.
pub fn save_metadata<P: AsRef<Path>>(metadata: &DocumentMetadata, dir: P) -> Result<()> {
    save_bin(&BundlePaths::new(dir).metadata(), metadata)
}

pub fn save_meta(paths: &BundlePaths, meta: &BundleMeta) -> Result<()> {
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &BundlePaths) -> Result<BundleMeta> {
    let mut f = File::open(paths.meta())
        .map_err(|e| SearchError::CorruptBundle(format!("missing {}: {e}", paths.meta().display())))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: BundleMeta = serde_json::from_str(&buf)?;
    if meta.version != FORMAT_VERSION {
        return Err(SearchError::BundleVersion { found: meta.version, expected: FORMAT_VERSION });
    }
    Ok(meta)
}

/// Load and cross-validate a bundle written by [`save_bundle`].
pub fn load_bundle<P: AsRef<Path>>(dir: P) -> Result<(Session, BundleMeta)> {
    let paths = BundlePaths::new(dir);
    let meta = load_meta(&paths)?;

    let vocabulary: Vocabulary = load_bin(&paths.vocabulary())?;
    let tfidf: TfidfModel = load_bin(&paths.tfidf())?;
    let corpus: Corpus = load_bin(&paths.corpus())?;
    let model: TopicModel = load_bin(&paths.model())?;
    let index: SimilarityIndex = load_bin(&paths.index())?;
    let metadata: DocumentMetadata = load_bin(&paths.metadata())?;

    if meta.num_docs != corpus.len() || meta.num_terms != vocabulary.len() || meta.num_topics != model.num_topics() {
        return Err(SearchError::CorruptBundle(format!(
            "meta.json describes {} docs / {} terms / {} topics, artifacts hold {} / {} / {}",
            meta.num_docs,
            meta.num_terms,
            meta.num_topics,
            corpus.len(),
            vocabulary.len(),
            model.num_topics()
        )));
    }
    let session = Session::from_parts(vocabulary, tfidf, meta.tokenizer, corpus, Some((model, index)), metadata)?;
    tracing::info!(dir = %paths.root.display(), num_docs = meta.num_docs, num_topics = meta.num_topics, "bundle loaded");
    Ok((session, meta))
}
