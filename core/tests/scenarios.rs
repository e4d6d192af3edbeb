use simsearch_core::metadata::DocumentMetadata;
use simsearch_core::tfidf::TfidfModel;
use simsearch_core::{
    BuildConfig, Corpus, CorpusBuilder, DocId, ExplainOptions, IngestRecord, KeywordQuery, LsiConfig, PruneConfig,
    Session, SparseVector, TfidfConfig, TokenizerConfig, Vocabulary, Warning,
};
use simsearch_core::tokenizer::Tokenizer;

fn pets() -> Session {
    let vocabulary = Vocabulary::from_parts(vec!["cat".into(), "dog".into(), "fish".into()], vec![2, 1, 1], 3).unwrap();
    let tfidf = TfidfModel::new(&vocabulary, TfidfConfig::default());
    let corpus = Corpus::new(
        3,
        vec![
            SparseVector::from_pairs(vec![(0, 1.0)]),
            SparseVector::from_pairs(vec![(0, 0.5), (1, 1.0)]),
            SparseVector::from_pairs(vec![(2, 1.0)]),
        ],
    )
    .unwrap();
    let mut metadata = DocumentMetadata::new();
    for title in ["d0", "d1", "d2"] {
        metadata.push_document(title, None);
    }
    let mut session = Session::new(vocabulary, tfidf, TokenizerConfig::default(), corpus, metadata).unwrap();
    session.train(&LsiConfig::with_topics(2)).unwrap();
    session
}

#[test]
fn similar_to_doc_prefers_shared_vocabulary() {
    let session = pets();
    let hits = session.find_similar_to_doc(0, 2).unwrap();
    let ids: Vec<DocId> = hits.iter().map(|h| h.doc_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(hits[0].score > hits[1].score);
    assert!(hits.iter().all(|h| (-1.0..=1.0).contains(&h.score)));
}

#[test]
fn keyword_include_dog_exclude_fish() {
    let session = pets();
    let out = session.keyword_search(&KeywordQuery::new(["dog"], ["fish"])).unwrap();
    assert_eq!(out.results.into_iter().collect::<Vec<_>>(), vec![1]);
    assert!(out.warnings.is_empty());
}

#[test]
fn keyword_unknown_include_is_reported_and_skipped() {
    let session = pets();
    let out = session.keyword_search(&KeywordQuery::new(["dog", "unicorn"], Vec::<String>::new())).unwrap();
    assert_eq!(out.results.into_iter().collect::<Vec<_>>(), vec![1]);
    assert_eq!(out.warnings, vec![Warning::UnknownIncludeWord("unicorn".into())]);
}

#[test]
fn explanation_of_related_documents() {
    let session = pets();
    let explanation = session.explain_docs(1, 0, &ExplainOptions::default()).unwrap();
    assert!(explanation.similarity > 0.99);
    let words: Vec<&str> = explanation.doc1.rows.iter().filter_map(|r| r.positive.as_ref()).map(|p| p.word.as_str()).collect();
    assert_eq!(words.len(), 2);
    assert!(words.contains(&"dog"));
    assert!(explanation.to_string().starts_with("Words in doc 1"));
}

fn record(title: &str, body: &str, tags: &[&str]) -> IngestRecord {
    IngestRecord {
        title: title.into(),
        tokens: Tokenizer::default().tokenize(body),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        source: None,
    }
}

#[test]
fn text_pipeline_end_to_end() {
    let config = BuildConfig { prune: PruneConfig::keep_all(), lsi: LsiConfig::with_topics(3), ..BuildConfig::default() };
    let mut builder = CorpusBuilder::new(config.clone());
    builder.push(record("Cats", "cats purr and cats sleep", &["pets"]));
    builder.push(record("Dogs", "dogs bark and dogs fetch", &["pets"]));
    builder.push(record("Play", "cats and dogs play", &[]));
    builder.push(record("Fish", "fish swim in water", &["!pets"]));
    builder.push(record("Pond", "water is wet and fish drink water", &[]));
    builder.push(record("Birds", "birds fly over water", &[]));
    let mut session = builder.build().unwrap();
    session.train(&config.lsi).unwrap();

    let out = session.find_similar_to_text("Where do the cats and dogs play?", 1).unwrap();
    assert_eq!(out.results[0].doc_id, 2);

    // Inputs and the curated counter-example are both left out.
    let more = session.find_more_of_tag("pets", 10).unwrap();
    assert!(more.iter().all(|h| ![0, 1, 3].contains(&h.doc_id)));
    assert_eq!(more.len(), 3);

    assert_eq!(session.metadata().tag_counts(), vec![("!pets", 1), ("pets", 2)]);
    assert_eq!(session.metadata().doc_for_title("Pond"), Some(4));
}
