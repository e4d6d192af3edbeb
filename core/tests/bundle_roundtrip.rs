use std::fs;

use simsearch_core::persist::{BundlePaths, FORMAT_VERSION};
use simsearch_core::tokenizer::Tokenizer;
use simsearch_core::{load_bundle, save_bundle, BuildConfig, CorpusBuilder, IngestRecord, LsiConfig, PruneConfig, SearchError, Session, SourceRef};

fn trained_session() -> Session {
    let config = BuildConfig { prune: PruneConfig::keep_all(), lsi: LsiConfig::with_topics(3), ..BuildConfig::default() };
    let mut builder = CorpusBuilder::new(config.clone());
    let bodies = [
        ("Cats", "cats purr and cats sleep", vec!["pets"]),
        ("Dogs", "dogs bark and dogs fetch", vec!["pets"]),
        ("Play", "cats and dogs play", vec![]),
        ("Fish", "fish swim in water", vec!["water"]),
        ("Pond", "water is wet and fish drink water", vec!["water"]),
    ];
    for (i, (title, body, tags)) in bodies.into_iter().enumerate() {
        builder.push(IngestRecord {
            title: title.into(),
            tokens: Tokenizer::default().tokenize(body),
            tags: tags.into_iter().map(String::from).collect(),
            source: Some(SourceRef { file: "animals.txt".into(), start_line: i as u32 * 2 + 1, end_line: i as u32 * 2 + 2 }),
        });
    }
    let mut session = builder.build().unwrap();
    session.train(&config.lsi).unwrap();
    session
}

#[test]
fn save_load_save_is_byte_identical() {
    let session = trained_session();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let meta = save_bundle(&session, first.path()).unwrap();
    assert_eq!(meta.version, FORMAT_VERSION);
    assert_eq!(meta.num_docs, 5);

    let (loaded, loaded_meta) = load_bundle(first.path()).unwrap();
    assert_eq!(loaded_meta, meta);
    save_bundle(&loaded, second.path()).unwrap();

    let a = BundlePaths::new(first.path());
    let b = BundlePaths::new(second.path());
    for (pa, pb) in a.all().iter().zip(b.all().iter()).filter(|(p, _)| p.extension().is_some_and(|e| e == "bin")) {
        assert_eq!(fs::read(pa).unwrap(), fs::read(pb).unwrap(), "{} differs", pa.display());
    }
}

#[test]
fn ranking_survives_round_trip() {
    let session = trained_session();
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&session, dir.path()).unwrap();
    let (loaded, _) = load_bundle(dir.path()).unwrap();

    for query in ["cats and dogs", "water fish"] {
        let before = session.find_similar_to_text(query, 5).unwrap().results;
        let after = loaded.find_similar_to_text(query, 5).unwrap().results;
        assert_eq!(before, after);
    }
    assert_eq!(loaded.find_more_of_tag("water", 3).unwrap(), session.find_more_of_tag("water", 3).unwrap());
    assert_eq!(loaded.metadata().location(4).unwrap().unwrap().start_line, 9);
}

#[test]
fn untrained_session_cannot_be_saved() {
    let mut builder = CorpusBuilder::new(BuildConfig { prune: PruneConfig::keep_all(), ..BuildConfig::default() });
    builder.push(IngestRecord { title: "a".into(), tokens: vec!["a".into()], ..IngestRecord::default() });
    let session = builder.build().unwrap();
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(save_bundle(&session, dir.path()), Err(SearchError::UntrainedModel { .. })));
}

#[test]
fn missing_artifact_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), dir.path()).unwrap();
    fs::remove_file(BundlePaths::new(dir.path()).index()).unwrap();
    assert!(matches!(load_bundle(dir.path()), Err(SearchError::CorruptBundle(_))));
}

#[test]
fn mixed_bundles_are_rejected() {
    let big = tempfile::tempdir().unwrap();
    let small = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), big.path()).unwrap();

    let mut builder = CorpusBuilder::new(BuildConfig { prune: PruneConfig::keep_all(), ..BuildConfig::default() });
    for body in ["red green", "green blue", "blue red"] {
        builder.push(IngestRecord { title: body.into(), tokens: Tokenizer::default().tokenize(body), ..IngestRecord::default() });
    }
    let mut other = builder.build().unwrap();
    other.train(&LsiConfig::with_topics(2)).unwrap();
    save_bundle(&other, small.path()).unwrap();

    // Index from a different build: row counts no longer agree.
    let (a, b) = (BundlePaths::new(big.path()), BundlePaths::new(small.path()));
    fs::copy(b.index(), a.index()).unwrap();
    assert!(load_bundle(big.path()).is_err());
}

#[test]
fn unknown_format_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), dir.path()).unwrap();
    let paths = BundlePaths::new(dir.path());
    let text = fs::read_to_string(paths.meta()).unwrap();
    fs::write(paths.meta(), text.replace(&format!("\"version\": {FORMAT_VERSION}"), "\"version\": 99")).unwrap();
    assert!(matches!(
        load_bundle(dir.path()),
        Err(SearchError::BundleVersion { found: 99, expected }) if expected == FORMAT_VERSION
    ));
}

#[test]
fn truncated_index_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), dir.path()).unwrap();
    let index = BundlePaths::new(dir.path()).index();
    let bytes = fs::read(&index).unwrap();
    fs::write(&index, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(load_bundle(dir.path()), Err(SearchError::CorruptBundle(_))));
}

// Array2 encodes as (format byte, (rows, cols), data); norms follow.
fn write_index(dir: &std::path::Path, rows: u64, cols: u64, data: Vec<f64>, norms: Vec<f64>) {
    let bytes = bincode::serialize(&((1u8, (rows, cols), data), norms)).unwrap();
    fs::write(BundlePaths::new(dir).index(), bytes).unwrap();
}

#[test]
fn index_with_short_matrix_data_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), dir.path()).unwrap();
    write_index(dir.path(), 5, 3, vec![1.0, 0.0], vec![1.0; 5]);
    assert!(matches!(load_bundle(dir.path()), Err(SearchError::CorruptBundle(_))));
}

#[test]
fn index_with_missing_norms_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    save_bundle(&trained_session(), dir.path()).unwrap();
    write_index(dir.path(), 5, 3, vec![0.5; 15], vec![1.0; 4]);
    let err = load_bundle(dir.path()).unwrap_err();
    assert!(matches!(err, SearchError::CorruptBundle(ref msg) if msg.contains("norms")), "{err}");
}

#[test]
fn unsorted_corpus_vector_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = trained_session();
    save_bundle(&session, dir.path()).unwrap();
    let num_terms = session.vocabulary().len() as u64;
    let docs: Vec<Vec<(u32, f64)>> = vec![vec![(3, 1.0), (1, 1.0)]; 5];
    fs::write(BundlePaths::new(dir.path()).corpus(), bincode::serialize(&(num_terms, docs)).unwrap()).unwrap();
    assert!(matches!(load_bundle(dir.path()), Err(SearchError::CorruptBundle(_))));
}
