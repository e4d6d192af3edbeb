use serde::{Deserialize, Serialize};

use crate::config::BuildConfig;
use crate::metadata::DocumentMetadata;
use crate::session::Session;
use crate::sparse::Corpus;
use crate::tfidf::TfidfModel;
use crate::vocab::VocabularyBuilder;
use crate::Result;

/// File and 1-based inclusive line range a record was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// One tokenized document as handed over by the ingestion side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub title: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<SourceRef>,
}

/// Collects records in order, then builds the vocabulary, the weighted corpus
/// and the metadata in one pass. Document ids follow insertion order.
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    config: BuildConfig,
    records: Vec<IngestRecord>,
}

impl CorpusBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config, records: Vec::new() }
    }

    pub fn push(&mut self, record: IngestRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// An untrained session over the collected records.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        let mut vocab = VocabularyBuilder::new();
        for record in &self.records {
            vocab.add_document(&record.tokens);
        }
        let vocabulary = vocab.freeze(&self.config.prune)?;
        let tfidf = TfidfModel::new(&vocabulary, self.config.tfidf);

        let mut docs = Vec::with_capacity(self.records.len());
        let mut metadata = DocumentMetadata::new();
        for record in &self.records {
            docs.push(tfidf.transform(&vocabulary.doc2bow(&record.tokens))?);
            let source = record.source.as_ref().map(|s| (s.file.as_str(), s.start_line, s.end_line));
            let doc_id = metadata.push_document(&record.title, source);
            for tag in &record.tags {
                metadata.tag_document(doc_id, tag)?;
            }
        }
        let corpus = Corpus::new(vocabulary.len(), docs)?;
        tracing::info!(num_docs = corpus.len(), num_terms = vocabulary.len(), nnz = corpus.nnz(), "corpus weighted");
        Session::new(vocabulary, tfidf, self.config.tokenizer, corpus, metadata)
    }
}
