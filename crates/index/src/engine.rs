//! In-process search index: BM25 full-text over string fields, cosine
//! similarity over vector fields, whole-index snapshots.
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    error::{IndexError, Result},
    schema::{Document, FieldType, FieldValue, IndexSchema},
};

/// Bumped whenever the snapshot layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Encoding used for persisted snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistFormat {
    #[default]
    Json,
    Binary,
}

impl PersistFormat {
    /// Identify the encoding of a stored snapshot. JSON snapshots are objects
    /// and start with `{`; postcard snapshots start with the version varint.
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Json,
            _ => Self::Binary,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextQuery {
    pub term: String,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub property: String,
    pub limit: usize,
    /// Hits scoring below this cosine similarity are dropped.
    pub min_similarity: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<D = Document> {
    pub id: String,
    pub score: f64,
    pub document: D,
}

/// Ranked hits plus the number of documents that matched before truncation.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults<D = Document> {
    pub hits: Vec<SearchHit<D>>,
    pub count: usize,
    pub elapsed: Duration,
}

impl<D> SearchResults<D> {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            count: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Convert every hit's document, keeping scores, count and timing.
    pub fn try_map<E>(self, mut f: impl FnMut(D) -> Result<E>) -> Result<SearchResults<E>> {
        let hits = self
            .hits
            .into_iter()
            .map(|hit| {
                Ok(SearchHit {
                    id: hit.id,
                    score: hit.score,
                    document: f(hit.document)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchResults {
            hits,
            count: self.count,
            elapsed: self.elapsed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    id: String,
    fields: Document,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    schema: &'a IndexSchema,
    documents: &'a [StoredDocument],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    schema: IndexSchema,
    documents: Vec<StoredDocument>,
}

/// Postings for one text field. Positions index into `SearchIndex::documents`.
#[derive(Debug, Default)]
struct FieldPostings {
    terms: BTreeMap<String, Vec<(usize, u32)>>,
    lengths: Vec<u32>,
    total_length: u64,
}

impl FieldPostings {
    fn add(&mut self, pos: usize, value: Option<&FieldValue>) {
        let mut freqs: HashMap<String, u32> = HashMap::new();
        let mut length = 0u32;
        if let Some(value) = value {
            for text in value.texts() {
                for token in tokenize(text) {
                    length += 1;
                    *freqs.entry(token).or_default() += 1;
                }
            }
        }
        for (token, tf) in freqs {
            self.terms.entry(token).or_default().push((pos, tf));
        }
        self.lengths.push(length);
        self.total_length += u64::from(length);
    }
}

#[derive(Debug)]
pub struct SearchIndex {
    schema: IndexSchema,
    documents: Vec<StoredDocument>,
    text: BTreeMap<String, FieldPostings>,
}

impl SearchIndex {
    /// Create an empty index with a fixed schema.
    pub fn create(schema: IndexSchema) -> Self {
        let text = schema
            .text_fields()
            .map(|name| (name.to_string(), FieldPostings::default()))
            .collect();
        Self {
            schema,
            documents: Vec::new(),
            text,
        }
    }

    /// Rebuild an index from bytes produced by [`SearchIndex::persist`] in
    /// either format; the encoding is detected from the bytes.
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = match PersistFormat::detect(bytes) {
            PersistFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| IndexError::Corrupt(format!("json snapshot: {e}")))?,
            PersistFormat::Binary => postcard::from_bytes(bytes)
                .map_err(|e| IndexError::Corrupt(format!("binary snapshot: {e}")))?,
        };
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }

        let mut index = Self::create(snapshot.schema);
        for doc in snapshot.documents {
            index
                .schema
                .validate(&doc.fields)
                .map_err(|e| IndexError::Corrupt(format!("document {}: {e}", doc.id)))?;
            index.push(doc);
        }
        debug!(documents = index.len(), "restored search index");
        Ok(index)
    }

    /// Serialize the complete index.
    pub fn persist(&self, format: PersistFormat) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            schema: &self.schema,
            documents: &self.documents,
        };
        match format {
            PersistFormat::Json => serde_json::to_vec(&snapshot)
                .map_err(|e| IndexError::Corrupt(format!("encode json snapshot: {e}"))),
            PersistFormat::Binary => postcard::to_allocvec(&snapshot)
                .map_err(|e| IndexError::Corrupt(format!("encode binary snapshot: {e}"))),
        }
    }

    /// Validate and append a document, returning its generated id.
    ///
    /// Nothing is modified when validation fails.
    pub fn insert(&mut self, fields: Document) -> Result<String> {
        self.schema.validate(&fields)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.push(StoredDocument {
            id: id.clone(),
            fields,
        });
        Ok(id)
    }

    fn push(&mut self, doc: StoredDocument) {
        let pos = self.documents.len();
        for (name, postings) in &mut self.text {
            postings.add(pos, doc.fields.get(name));
        }
        self.documents.push(doc);
    }

    /// BM25 full-text search across every text field, with prefix matching
    /// of query tokens.
    pub fn search(&self, query: &TextQuery) -> SearchResults {
        let started = Instant::now();
        let tokens: Vec<String> = tokenize(&query.term).collect();
        let n = self.documents.len();
        if tokens.is_empty() || n == 0 {
            return SearchResults {
                elapsed: started.elapsed(),
                ..SearchResults::empty()
            };
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for postings in self.text.values() {
            if postings.total_length == 0 {
                continue;
            }
            let avg_len = postings.total_length as f64 / n as f64;
            for token in &tokens {
                let matches = postings
                    .terms
                    .range(token.clone()..)
                    .take_while(|(indexed, _)| indexed.starts_with(token.as_str()));
                for (_, list) in matches {
                    let df = list.len() as f64;
                    let idf = (1.0 + (n as f64 - df + 0.5) / (df + 0.5)).ln();
                    for &(pos, tf) in list {
                        let tf = f64::from(tf);
                        let len = f64::from(postings.lengths[pos]);
                        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len);
                        *scores.entry(pos).or_default() += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
                    }
                }
            }
        }

        self.rank(scores.into_iter().collect(), query.limit, started)
    }

    /// Nearest-neighbour search by cosine similarity over a vector field.
    pub fn search_vector(&self, query: &VectorQuery) -> Result<SearchResults> {
        let started = Instant::now();
        let dims = match self.schema.get(&query.property) {
            Some(FieldType::Vector(dims)) => dims,
            Some(other) => {
                return Err(IndexError::schema(format!(
                    "field `{}` is {other}, not a vector",
                    query.property
                )));
            },
            None => {
                return Err(IndexError::schema(format!(
                    "unknown field `{}`",
                    query.property
                )));
            },
        };
        if query.vector.len() != dims {
            return Err(IndexError::schema(format!(
                "query vector has {} dimensions, field `{}` has {dims}",
                query.vector.len(),
                query.property
            )));
        }

        let threshold = query.min_similarity.map(f64::from);
        let scored = self
            .documents
            .iter()
            .enumerate()
            .filter_map(|(pos, doc)| match doc.fields.get(&query.property) {
                Some(FieldValue::Vector(v)) => {
                    cosine_similarity(&query.vector, v).map(|score| (pos, score))
                },
                _ => None,
            })
            .filter(|(_, score)| threshold.is_none_or(|t| *score >= t))
            .collect();

        Ok(self.rank(scored, query.limit, started))
    }

    fn rank(&self, mut scored: Vec<(usize, f64)>, limit: usize, started: Instant) -> SearchResults {
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        let count = scored.len();
        let hits = scored
            .into_iter()
            .take(limit)
            .map(|(pos, score)| {
                let doc = &self.documents[pos];
                SearchHit {
                    id: doc.id.clone(),
                    score,
                    document: doc.fields.clone(),
                }
            })
            .collect();
        SearchResults {
            hits,
            count,
            elapsed: started.elapsed(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| &doc.fields)
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// `None` when the vectors differ in length or either has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some(dot / denom)
}
