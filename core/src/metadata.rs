use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::{DocId, Result, SearchError};

/// Prefix marking a tag's curated counter-examples.
pub const NEGATIVE_TAG_PREFIX: char = '!';

/// The tag name holding counter-examples for `tag`.
pub fn negative_tag(tag: &str) -> String {
    format!("{NEGATIVE_TAG_PREFIX}{}", tag.to_lowercase())
}

/// Tag <-> document index.
///
/// Both directions are private and only [`TagIndex::tag`] and
/// [`TagIndex::untag`] mutate them, so they cannot drift apart. Only the
/// tag -> docs direction is serialized; the other is rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TagRecord")]
pub struct TagIndex {
    tags_to_docs: BTreeMap<String, BTreeSet<DocId>>,
    #[serde(skip)]
    docs_to_tags: BTreeMap<DocId, BTreeSet<String>>,
}

#[derive(Deserialize)]
struct TagRecord {
    tags_to_docs: BTreeMap<String, BTreeSet<DocId>>,
}

impl From<TagRecord> for TagIndex {
    fn from(record: TagRecord) -> Self {
        let mut index = TagIndex::default();
        for (tag, docs) in record.tags_to_docs {
            for doc in docs {
                index.tag(doc, &tag);
            }
        }
        index
    }
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the document already had the tag.
    pub fn tag(&mut self, doc_id: DocId, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        let added = self.tags_to_docs.entry(tag.clone()).or_default().insert(doc_id);
        self.docs_to_tags.entry(doc_id).or_default().insert(tag);
        added
    }

    /// Returns false if the document did not have the tag.
    pub fn untag(&mut self, doc_id: DocId, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        let removed = match self.tags_to_docs.get_mut(&tag) {
            Some(docs) => {
                let removed = docs.remove(&doc_id);
                if docs.is_empty() {
                    self.tags_to_docs.remove(&tag);
                }
                removed
            }
            None => false,
        };
        if let Some(tags) = self.docs_to_tags.get_mut(&doc_id) {
            tags.remove(&tag);
            if tags.is_empty() {
                self.docs_to_tags.remove(&doc_id);
            }
        }
        removed
    }

    pub fn docs(&self, tag: &str) -> Option<&BTreeSet<DocId>> {
        self.tags_to_docs.get(&tag.to_lowercase())
    }

    pub fn tags_of(&self, doc_id: DocId) -> impl Iterator<Item = &str> + '_ {
        self.docs_to_tags.get(&doc_id).into_iter().flatten().map(String::as_str)
    }

    /// Every tag with its document count, alphabetically.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.tags_to_docs.iter().map(|(tag, docs)| (tag.as_str(), docs.len())).collect()
    }

    pub fn len(&self) -> usize {
        self.tags_to_docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags_to_docs.is_empty()
    }

    fn max_doc_id(&self) -> Option<DocId> {
        self.docs_to_tags.keys().next_back().copied()
    }
}

/// Where a document's text came from: file index and 1-based inclusive lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start_line: u32,
    pub end_line: u32,
}

/// A resolved [`SourceLocation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceExcerpt {
    pub lines: Vec<String>,
    pub truncated: bool,
}

/// Titles, provenance and tags for every document, indexed by document id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "MetadataRecord")]
pub struct DocumentMetadata {
    titles: Vec<String>,
    files: Vec<String>,
    locations: Vec<Option<SourceLocation>>,
    tags: TagIndex,
    #[serde(skip)]
    title_ids: HashMap<String, DocId>,
    #[serde(skip)]
    file_ids: HashMap<String, u32>,
}

#[derive(Deserialize)]
struct MetadataRecord {
    titles: Vec<String>,
    files: Vec<String>,
    locations: Vec<Option<SourceLocation>>,
    tags: TagIndex,
}

impl From<MetadataRecord> for DocumentMetadata {
    fn from(record: MetadataRecord) -> Self {
        let mut title_ids = HashMap::with_capacity(record.titles.len());
        for (i, title) in record.titles.iter().enumerate() {
            title_ids.entry(title.clone()).or_insert(i as DocId);
        }
        let file_ids = record.files.iter().enumerate().map(|(i, f)| (f.clone(), i as u32)).collect();
        Self {
            titles: record.titles,
            files: record.files,
            locations: record.locations,
            tags: record.tags,
            title_ids,
            file_ids,
        }
    }
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next document. Ids are assigned in call order.
    pub fn push_document(&mut self, title: &str, source: Option<(&str, u32, u32)>) -> DocId {
        let doc_id = self.titles.len() as DocId;
        self.title_ids.entry(title.to_string()).or_insert(doc_id);
        self.titles.push(title.to_string());
        let location = source.map(|(file, start_line, end_line)| {
            let next = self.files.len() as u32;
            let file_id = *self.file_ids.entry(file.to_string()).or_insert(next);
            if file_id == next {
                self.files.push(file.to_string());
            }
            SourceLocation { file_id, start_line, end_line }
        });
        self.locations.push(location);
        doc_id
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    fn check(&self, doc_id: DocId) -> Result<usize> {
        let i = doc_id as usize;
        if i >= self.titles.len() {
            return Err(SearchError::DocumentOutOfRange { doc_id, num_docs: self.titles.len() });
        }
        Ok(i)
    }

    pub fn title(&self, doc_id: DocId) -> Result<&str> {
        Ok(&self.titles[self.check(doc_id)?])
    }

    /// First document carrying exactly this title.
    pub fn doc_for_title(&self, title: &str) -> Option<DocId> {
        self.title_ids.get(title).copied()
    }

    pub fn location(&self, doc_id: DocId) -> Result<Option<Location>> {
        let i = self.check(doc_id)?;
        let Some(loc) = self.locations[i] else {
            return Ok(None);
        };
        let file = self
            .files
            .get(loc.file_id as usize)
            .ok_or_else(|| SearchError::CorruptBundle(format!("document {doc_id} references unknown file {}", loc.file_id)))?;
        Ok(Some(Location { file: file.clone(), start_line: loc.start_line, end_line: loc.end_line }))
    }

    /// Read the document's source lines, keeping at most `max_lines`.
    pub fn read_source(&self, doc_id: DocId, max_lines: usize) -> Result<Option<SourceExcerpt>> {
        let Some(loc) = self.location(doc_id)? else {
            return Ok(None);
        };
        let reader = BufReader::new(File::open(&loc.file)?);
        let mut lines = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line_num = i as u32 + 1;
            if line_num > loc.end_line {
                break;
            }
            if line_num >= loc.start_line {
                lines.push(line?);
            }
        }
        let truncated = lines.len() > max_lines;
        lines.truncate(max_lines);
        Ok(Some(SourceExcerpt { lines, truncated }))
    }

    pub fn tags(&self) -> &TagIndex {
        &self.tags
    }

    pub fn tags_of(&self, doc_id: DocId) -> Result<Vec<&str>> {
        self.check(doc_id)?;
        Ok(self.tags.tags_of(doc_id).collect())
    }

    pub fn tag_document(&mut self, doc_id: DocId, tag: &str) -> Result<bool> {
        self.check(doc_id)?;
        Ok(self.tags.tag(doc_id, tag))
    }

    pub fn untag_document(&mut self, doc_id: DocId, tag: &str) -> Result<bool> {
        self.check(doc_id)?;
        Ok(self.tags.untag(doc_id, tag))
    }

    pub fn docs_with_tag(&self, tag: &str) -> Option<&BTreeSet<DocId>> {
        self.tags.docs(tag)
    }

    pub fn tag_counts(&self) -> Vec<(&str, usize)> {
        self.tags.counts()
    }

    /// Check every per-document table against the corpus size.
    pub fn validate(&self, num_docs: usize) -> Result<()> {
        if self.titles.len() != num_docs || self.locations.len() != num_docs {
            return Err(SearchError::DimensionMismatch {
                what: "document metadata rows",
                expected: num_docs,
                actual: self.titles.len().min(self.locations.len()),
            });
        }
        if let Some(max) = self.tags.max_doc_id() {
            if max as usize >= num_docs {
                return Err(SearchError::CorruptBundle(format!("tag index references document {max}")));
            }
        }
        if let Some(loc) = self.locations.iter().flatten().find(|l| l.file_id as usize >= self.files.len()) {
            return Err(SearchError::CorruptBundle(format!("source location references unknown file {}", loc.file_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tag_index_stays_in_sync() {
        let mut index = TagIndex::new();
        assert!(index.tag(1, "Pets"));
        assert!(!index.tag(1, "pets"));
        index.tag(2, "pets");
        index.tag(1, "!fish");
        assert_eq!(index.docs("PETS").map(|d| d.len()), Some(2));
        assert_eq!(index.tags_of(1).collect::<Vec<_>>(), vec!["!fish", "pets"]);

        assert!(index.untag(1, "pets"));
        assert!(!index.untag(1, "pets"));
        assert_eq!(index.tags_of(1).collect::<Vec<_>>(), vec!["!fish"]);
        index.untag(2, "pets");
        assert!(index.docs("pets").is_none());
        assert_eq!(index.counts(), vec![("!fish", 1)]);
    }

    #[test]
    fn deserialized_index_rebuilds_reverse_map() {
        let mut index = TagIndex::new();
        index.tag(0, "a");
        index.tag(3, "b");
        let bytes = bincode::serialize(&index).unwrap();
        let back: TagIndex = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, index);
        assert_eq!(back.tags_of(3).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn titles_files_and_locations() {
        let mut meta = DocumentMetadata::new();
        assert_eq!(meta.push_document("Cats", Some(("a.txt", 1, 3))), 0);
        meta.push_document("Dogs", Some(("a.txt", 4, 9)));
        meta.push_document("Cats", None);
        assert_eq!(meta.doc_for_title("Cats"), Some(0));
        assert_eq!(meta.title(1).unwrap(), "Dogs");
        assert_eq!(meta.location(1).unwrap().unwrap().start_line, 4);
        assert!(meta.location(2).unwrap().is_none());
        assert_eq!(meta.files.len(), 1);
        assert!(meta.title(3).is_err());
        meta.validate(3).unwrap();
        assert!(meta.validate(4).is_err());
    }

    #[test]
    fn read_source_is_inclusive_and_truncates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 1..=10 {
            writeln!(file, "line {i}").unwrap();
        }
        let path = file.path().to_string_lossy().into_owned();
        let mut meta = DocumentMetadata::new();
        meta.push_document("doc", Some((&path, 3, 5)));

        let all = meta.read_source(0, 8).unwrap().unwrap();
        assert_eq!(all.lines, vec!["line 3", "line 4", "line 5"]);
        assert!(!all.truncated);

        let short = meta.read_source(0, 2).unwrap().unwrap();
        assert_eq!(short.lines.len(), 2);
        assert!(short.truncated);
    }

    #[test]
    fn tagging_checks_document_range() {
        let mut meta = DocumentMetadata::new();
        meta.push_document("only", None);
        assert!(meta.tag_document(0, "x").unwrap());
        assert!(matches!(meta.tag_document(5, "x"), Err(SearchError::DocumentOutOfRange { .. })));
        assert_eq!(negative_tag("X"), "!x");
    }
}
