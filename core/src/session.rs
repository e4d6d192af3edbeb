use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::config::{LsiConfig, TokenizerConfig};
use crate::error::{Outcome, Warning};
use crate::explain::{word_contributions, ExplainOptions, Explanation};
use crate::keyword::{keyword_search, KeywordQuery};
use crate::lsi::TopicModel;
use crate::metadata::{negative_tag, DocumentMetadata};
use crate::rank::{aggregate, rank, Hit};
use crate::similarity::SimilarityIndex;
use crate::sparse::{Corpus, SparseVector};
use crate::tfidf::TfidfModel;
use crate::tokenizer::{decode_text, Tokenizer};
use crate::vocab::Vocabulary;
use crate::{DocId, Result, SearchError, WordId};

/// The loaded object graph every query runs against.
///
/// Construction cross-checks all parts, so a `Session` is always internally
/// consistent. The topic model and the similarity index are present together
/// or not at all.
#[derive(Debug, Clone)]
pub struct Session {
    vocabulary: Vocabulary,
    tfidf: TfidfModel,
    tokenizer: Tokenizer,
    corpus: Corpus,
    model: Option<TopicModel>,
    index: Option<SimilarityIndex>,
    metadata: DocumentMetadata,
}

impl Session {
    /// An untrained session.
    pub fn new(
        vocabulary: Vocabulary,
        tfidf: TfidfModel,
        tokenizer: TokenizerConfig,
        corpus: Corpus,
        metadata: DocumentMetadata,
    ) -> Result<Self> {
        Self::from_parts(vocabulary, tfidf, tokenizer, corpus, None, metadata)
    }

    /// Assemble a session, validating sizes across every part.
    pub fn from_parts(
        vocabulary: Vocabulary,
        tfidf: TfidfModel,
        tokenizer: TokenizerConfig,
        corpus: Corpus,
        trained: Option<(TopicModel, SimilarityIndex)>,
        metadata: DocumentMetadata,
    ) -> Result<Self> {
        let num_terms = vocabulary.len();
        check("tf-idf idf table", num_terms, tfidf.num_terms())?;
        check("corpus vocabulary size", num_terms, corpus.num_terms())?;
        metadata.validate(corpus.len())?;
        let (model, index) = match trained {
            Some((model, index)) => {
                model.validate()?;
                index.validate()?;
                check("topic model vocabulary size", num_terms, model.num_terms())?;
                check("similarity index rows", corpus.len(), index.len())?;
                check("similarity index width", model.num_topics(), index.num_features())?;
                (Some(model), Some(index))
            }
            None => (None, None),
        };
        Ok(Self { vocabulary, tfidf, tokenizer: Tokenizer::new(tokenizer), corpus, model, index, metadata })
    }

    /// Train the topic model and build the similarity index, replacing any previous ones.
    pub fn train(&mut self, config: &LsiConfig) -> Result<()> {
        let model = TopicModel::train(&self.corpus, config)?;
        let index = SimilarityIndex::build(&self.corpus, &model)?;
        tracing::info!(num_topics = model.num_topics(), num_docs = index.len(), "session trained");
        self.model = Some(model);
        self.index = Some(index);
        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some() && self.index.is_some()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn tfidf(&self) -> &TfidfModel {
        &self.tfidf
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn model(&self) -> Option<&TopicModel> {
        self.model.as_ref()
    }

    pub fn index(&self) -> Option<&SimilarityIndex> {
        self.index.as_ref()
    }

    fn trained(&self, what: &'static str) -> Result<(&TopicModel, &SimilarityIndex)> {
        match (&self.model, &self.index) {
            (Some(model), Some(index)) => Ok((model, index)),
            _ => Err(SearchError::UntrainedModel { what }),
        }
    }

    /// Weight free text exactly like the training corpus.
    pub fn tfidf_for_text(&self, text: &str) -> Result<SparseVector> {
        let text = text.replace(['\r', '\n'], " ");
        let tokens = self.tokenizer.tokenize(&text);
        self.tfidf.transform(&self.vocabulary.doc2bow(&tokens))
    }

    /// Rank the corpus against `vector`.
    ///
    /// `in_corpus` names the corpus document `vector` came from, if any; only
    /// that id is excluded. Near-duplicates of the query are kept.
    pub fn find_similar_to_vector(&self, vector: &SparseVector, top_n: usize, in_corpus: Option<DocId>) -> Result<Vec<Hit>> {
        let (model, index) = self.trained("similarity search")?;
        let sims = index.similarities(&model.project(vector)?)?;
        let excluded: BTreeSet<DocId> = in_corpus.into_iter().collect();
        Ok(rank(&sims, &excluded, top_n))
    }

    pub fn find_similar_to_doc(&self, doc_id: DocId, top_n: usize) -> Result<Vec<Hit>> {
        self.trained("similarity search")?;
        let vector = self.corpus.get(doc_id)?;
        self.find_similar_to_vector(vector, top_n, Some(doc_id))
    }

    /// Rank by the summed similarity to every vector in the group.
    ///
    /// `exclude` is applied to the final ranking, not to the sum.
    pub fn find_similar_to_vectors(&self, vectors: &[SparseVector], exclude: &BTreeSet<DocId>, top_n: usize) -> Result<Vec<Hit>> {
        let total = self.summed_similarities(vectors.iter())?;
        Ok(rank(&total, exclude, top_n))
    }

    fn summed_similarities<'a, I>(&self, vectors: I) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = &'a SparseVector>,
    {
        let (model, index) = self.trained("similarity search")?;
        let mut lists = Vec::new();
        for vector in vectors {
            lists.push(index.similarities(&model.project(vector)?)?);
        }
        aggregate(&lists)
    }

    pub fn find_similar_to_text(&self, text: &str, top_n: usize) -> Result<Outcome<Vec<Hit>>> {
        self.trained("similarity search")?;
        let vector = self.tfidf_for_text(text)?;
        if vector.is_empty() {
            tracing::warn!("no query words found in dictionary");
            return Ok(Outcome::with_warnings(Vec::new(), vec![Warning::NoKnownWords]));
        }
        Ok(Outcome::new(self.find_similar_to_vector(&vector, top_n, None)?))
    }

    /// Like [`Session::find_similar_to_text`] for raw UTF-8 bytes. Undecodable
    /// input yields no results and a warning echoing the input.
    pub fn find_similar_to_bytes(&self, bytes: &[u8], top_n: usize) -> Result<Outcome<Vec<Hit>>> {
        self.trained("similarity search")?;
        match decode_text(bytes) {
            Ok(text) => self.find_similar_to_text(&text, top_n),
            Err(SearchError::Decoding { input }) => {
                tracing::warn!(%input, "failed to decode query text");
                Ok(Outcome::with_warnings(Vec::new(), vec![Warning::UndecodableInput(input)]))
            }
            Err(e) => Err(e),
        }
    }

    pub fn find_similar_to_file<P: AsRef<Path>>(&self, path: P, top_n: usize) -> Result<Outcome<Vec<Hit>>> {
        self.trained("similarity search")?;
        let bytes = fs::read(path)?;
        self.find_similar_to_bytes(&bytes, top_n)
    }

    /// Documents related to everything tagged `tag`.
    ///
    /// The tagged documents and the `!tag` counter-examples are excluded.
    pub fn find_more_of_tag(&self, tag: &str, top_n: usize) -> Result<Vec<Hit>> {
        self.trained("similarity search")?;
        let tag = tag.to_lowercase();
        let inputs = self.metadata.docs_with_tag(&tag).ok_or_else(|| SearchError::UnknownTag(tag.clone()))?;
        let mut excluded = inputs.clone();
        if let Some(negatives) = self.metadata.docs_with_tag(&negative_tag(&tag)) {
            excluded.extend(negatives);
        }
        let vectors = inputs.iter().map(|&d| self.corpus.get(d)).collect::<Result<Vec<_>>>()?;
        let total = self.summed_similarities(vectors)?;
        Ok(rank(&total, &excluded, top_n))
    }

    pub fn keyword_search(&self, query: &KeywordQuery) -> Result<Outcome<BTreeSet<DocId>>> {
        keyword_search(&self.vocabulary, &self.corpus, query)
    }

    /// Per-word contributions of `v1` to its topic-space similarity with `v2`.
    pub fn similarity_by_word(&self, v1: &SparseVector, v2: &SparseVector) -> Result<Vec<(WordId, f64)>> {
        let (model, _) = self.trained("match explanation")?;
        word_contributions(model, v1, v2)
    }

    pub fn explain(&self, v1: &SparseVector, v2: &SparseVector, options: &ExplainOptions) -> Result<Explanation> {
        let (model, _) = self.trained("match explanation")?;
        Explanation::build(model, &self.vocabulary, v1, v2, options)
    }

    pub fn explain_docs(&self, doc1: DocId, doc2: DocId, options: &ExplainOptions) -> Result<Explanation> {
        self.trained("match explanation")?;
        self.explain(self.corpus.get(doc1)?, self.corpus.get(doc2)?, options)
    }

    /// Words with the largest summed tf-idf weight over `doc_ids`.
    pub fn top_words_in_cluster(&self, doc_ids: &[DocId], top_n: usize) -> Result<Vec<(&str, f64)>> {
        let mut pairs = Vec::new();
        for &doc_id in doc_ids {
            pairs.extend_from_slice(self.corpus.get(doc_id)?.entries());
        }
        let mut summed = SparseVector::from_pairs(pairs).entries().to_vec();
        summed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(summed
            .into_iter()
            .take(top_n)
            .filter_map(|(id, w)| self.vocabulary.word(id).map(|word| (word, w)))
            .collect())
    }

    /// The `n` heaviest words of every topic.
    pub fn topics(&self, n: usize) -> Result<Vec<Vec<(&str, f64)>>> {
        let (model, _) = self.trained("topic listing")?;
        Ok((0..model.num_topics())
            .map(|topic| {
                model
                    .topic_words(topic, n)
                    .into_iter()
                    .filter_map(|(id, w)| self.vocabulary.word(id).map(|word| (word, w)))
                    .collect()
            })
            .collect())
    }

    pub fn tag_document(&mut self, doc_id: DocId, tag: &str) -> Result<bool> {
        self.metadata.tag_document(doc_id, tag)
    }

    pub fn untag_document(&mut self, doc_id: DocId, tag: &str) -> Result<bool> {
        self.metadata.untag_document(doc_id, tag)
    }

    /// Swap in edited metadata, e.g. once the edit has been written to disk.
    pub fn replace_metadata(&mut self, metadata: DocumentMetadata) -> Result<()> {
        metadata.validate(self.corpus.len())?;
        self.metadata = metadata;
        Ok(())
    }
}

fn check(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(SearchError::DimensionMismatch { what, expected, actual });
    }
    Ok(())
}
