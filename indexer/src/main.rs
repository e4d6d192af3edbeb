use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use simsearch_core::metadata::DocumentMetadata;
use simsearch_core::tokenizer::Tokenizer;
use simsearch_core::{
    load_bundle, save_bundle, BuildConfig, CorpusBuilder, DocId, ExplainOptions, Hit, IngestRecord, KeywordQuery,
    Normalization, Session, SourceRef,
};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    title: String,
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    source: Option<SourceRef>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query concept-search bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bundle from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output bundle directory
        #[arg(long)]
        output: String,
        /// JSON build configuration; flags below override it
        #[arg(long)]
        config: Option<String>,
        /// Number of LSI topics
        #[arg(long)]
        topics: Option<usize>,
        /// Drop words found in fewer documents
        #[arg(long)]
        no_below: Option<u32>,
        /// Drop words found in more than this fraction of documents
        #[arg(long)]
        no_above: Option<f64>,
        /// Keep at most this many words
        #[arg(long)]
        keep_n: Option<usize>,
        /// Keep raw tf-idf magnitudes instead of unit vectors
        #[arg(long, default_value_t = false)]
        no_normalize: bool,
        /// Stem tokens (English)
        #[arg(long, default_value_t = false)]
        stem: bool,
    },
    /// Print bundle statistics, frequent words, tags and topics
    Inspect {
        #[arg(long)]
        bundle: String,
        #[arg(long, default_value_t = 20)]
        words: usize,
        #[arg(long, default_value_t = 5)]
        topic_words: usize,
    },
    /// Documents similar to a document (id or title), free text or a text file
    Similar {
        #[arg(long)]
        bundle: String,
        #[arg(long, conflicts_with_all = ["text", "file", "tag"])]
        doc: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// More documents like everything carrying this tag
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Print source lines of each result
        #[arg(long, default_value_t = false)]
        show_source: bool,
    },
    /// Boolean keyword search
    Keyword {
        #[arg(long)]
        bundle: String,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        /// Only search documents with this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Words that make two documents similar
    Explain {
        #[arg(long)]
        bundle: String,
        a: String,
        b: String,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value_t = 0.1)]
        min_pos: f64,
        #[arg(long, default_value_t = -0.01, allow_hyphen_values = true)]
        max_neg: f64,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, topics, no_below, no_above, keep_n, no_normalize, stem } => {
            let mut build = match config {
                Some(path) => BuildConfig::load(&path).with_context(|| format!("reading config {path}"))?,
                None => BuildConfig::default(),
            };
            if let Some(k) = topics {
                build.lsi.num_topics = k;
            }
            if let Some(n) = no_below {
                build.prune.no_below = n;
            }
            if let Some(f) = no_above {
                build.prune.no_above = f;
            }
            if keep_n.is_some() {
                build.prune.keep_n = keep_n;
            }
            if no_normalize {
                build.tfidf.normalize = Normalization::None;
            }
            if stem {
                build.tokenizer.stem = true;
            }
            build_bundle(&input, &output, build)
        }
        Commands::Inspect { bundle, words, topic_words } => inspect(&bundle, words, topic_words),
        Commands::Similar { bundle, doc, text, file, tag, top, show_source } => {
            let (session, _) = load_bundle(&bundle)?;
            let hits = if let Some(doc) = doc {
                session.find_similar_to_doc(resolve_doc(session.metadata(), &doc)?, top)?
            } else if let Some(tag) = tag {
                session.find_more_of_tag(&tag, top)?
            } else {
                let outcome = match (text, file) {
                    (Some(text), _) => session.find_similar_to_text(&text, top)?,
                    (None, Some(file)) => session.find_similar_to_file(&file, top)?,
                    (None, None) => return Err(anyhow!("one of --doc, --text, --file or --tag is required")),
                };
                for warning in &outcome.warnings {
                    eprintln!("warning: {warning}");
                }
                outcome.results
            };
            print_results(&session, &hits, show_source)
        }
        Commands::Keyword { bundle, include, exclude, tag } => {
            let (session, _) = load_bundle(&bundle)?;
            let mut query = KeywordQuery::new(include, exclude);
            if let Some(tag) = tag {
                let docs = session.metadata().docs_with_tag(&tag).ok_or_else(|| anyhow!("unknown tag '{tag}'"))?;
                query = query.within(docs.iter().copied().collect());
            }
            let outcome = session.keyword_search(&query)?;
            for warning in &outcome.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{} matching documents:", outcome.results.len());
            for doc_id in outcome.results {
                println!("  {:>6}    {}", doc_id, session.metadata().title(doc_id)?);
            }
            Ok(())
        }
        Commands::Explain { bundle, a, b, top, min_pos, max_neg } => {
            let (session, _) = load_bundle(&bundle)?;
            let (a, b) = (resolve_doc(session.metadata(), &a)?, resolve_doc(session.metadata(), &b)?);
            let explanation = session.explain_docs(a, b, &ExplainOptions { top_n: top, min_pos, max_neg })?;
            println!("Similarity {:.3}: {} / {}", explanation.similarity, session.metadata().title(a)?, session.metadata().title(b)?);
            print!("{explanation}");
            Ok(())
        }
    }
}

fn build_bundle(input: &str, output: &str, config: BuildConfig) -> Result<()> {
    config.validate()?;
    let tokenizer = Tokenizer::new(config.tokenizer);
    let lsi = config.lsi.clone();
    let mut builder = CorpusBuilder::new(config);

    for file in input_files(Path::new(input)) {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &tokenizer, &mut builder)?;
        } else {
            read_json(&file, &tokenizer, &mut builder)?;
        }
    }
    tracing::info!(num_docs = builder.len(), "ingested documents");
    if builder.is_empty() {
        return Err(anyhow!("no documents found under {input}"));
    }

    let mut session = builder.build()?;
    session.train(&lsi)?;
    save_bundle(&session, output)?;
    tracing::info!(output, "bundle build complete");
    Ok(())
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn to_record(doc: InputDoc, tokenizer: &Tokenizer, fallback: Option<SourceRef>) -> IngestRecord {
    IngestRecord {
        tokens: tokenizer.tokenize(&doc.body),
        title: doc.title,
        tags: doc.tags,
        source: doc.source.or(fallback),
    }
}

/// One document per line; a document's provenance defaults to its own line.
fn read_jsonl(file: &Path, tokenizer: &Tokenizer, builder: &mut CorpusBuilder) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), i + 1))?;
        let line_num = i as u32 + 1;
        let here = SourceRef { file: file.display().to_string(), start_line: line_num, end_line: line_num };
        builder.push(to_record(doc, tokenizer, Some(here)));
    }
    Ok(())
}

fn read_json(file: &Path, tokenizer: &Tokenizer, builder: &mut CorpusBuilder) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                builder.push(to_record(doc, tokenizer, None));
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            builder.push(to_record(doc, tokenizer, None));
        }
        _ => tracing::warn!(file = %file.display(), "skipping JSON that is neither an object nor an array"),
    }
    Ok(())
}

/// A document named by numeric id or by exact title.
fn resolve_doc(metadata: &DocumentMetadata, doc: &str) -> Result<DocId> {
    if let Ok(id) = doc.parse::<DocId>() {
        metadata.title(id)?;
        return Ok(id);
    }
    metadata.doc_for_title(doc).ok_or_else(|| anyhow!("no document titled '{doc}'"))
}

fn inspect(bundle: &str, words: usize, topic_words: usize) -> Result<()> {
    let (session, meta) = load_bundle(bundle)?;
    println!("bundle v{} created {}", meta.version, meta.created_at);
    println!("{} documents, {} terms, {} topics", meta.num_docs, meta.num_terms, meta.num_topics);

    println!("\nMost frequent words:");
    for (word, df) in session.vocabulary().most_frequent(words) {
        println!("  {word:>20} {df:6}");
    }

    let tags = session.metadata().tag_counts();
    if !tags.is_empty() {
        println!("\nTags:");
        for (tag, count) in tags {
            println!("  {tag:>20} {count:3}");
        }
    }

    println!("\nTopics:");
    for (i, topic) in session.topics(topic_words)?.into_iter().enumerate().take(10) {
        let terms: Vec<String> = topic.iter().map(|(w, v)| format!("{v:+.3}*{w}")).collect();
        println!("  #{i:<3} {}", terms.join(" "));
    }
    Ok(())
}

fn print_results(session: &Session, hits: &[Hit], show_source: bool) -> Result<()> {
    println!("Most similar documents:");
    for hit in hits {
        let metadata = session.metadata();
        match metadata.location(hit.doc_id)? {
            Some(loc) => println!(
                "  {:.2}    {}    {}  lines {} - {}",
                hit.score,
                metadata.title(hit.doc_id)?,
                loc.file,
                loc.start_line,
                loc.end_line
            ),
            None => println!("  {:.2}    {}", hit.score, metadata.title(hit.doc_id)?),
        }
        if show_source {
            if let Some(excerpt) = metadata.read_source(hit.doc_id, 8)? {
                for line in &excerpt.lines {
                    println!("        {}", line.trim());
                }
                if excerpt.truncated {
                    println!("        ...");
                }
            }
        }
    }
    Ok(())
}
