use crate::embeddings::Embedding;
use crate::error::{RagError, Result};
use crate::index::{IndexEntry, ScoredChunk, VectorIndex};
use log::{debug, info, warn};
use qdrant_client::qdrant::{
    with_payload_selector, CreateCollectionBuilder, Distance, PointStruct, ScoredPoint,
    SearchPoints, UpsertPointsBuilder, Value, VectorParams, WithPayloadSelector,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const DEFAULT_COLLECTION: &str = "pdf_chat";

/// Persistent home for the index built by `process` and read by `ask`
#[allow(async_fn_in_trait)]
pub trait IndexStore {
    /// Replace whatever was stored before with `index`
    async fn replace(&self, index: &VectorIndex) -> Result<()>;

    /// Search the stored index
    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>>;

    /// Human readable location, used in messages
    fn location(&self) -> String;
}

/// Stores the index as JSON in a fixed local directory
#[derive(Debug, Clone)]
pub struct LocalIndexStore {
    dir: PathBuf,
}

impl LocalIndexStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        LocalIndexStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Load the persisted index from disk
    pub fn load(&self) -> Result<VectorIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Err(RagError::IndexNotFound(self.dir.display().to_string()));
        }

        let raw = fs::read_to_string(&path).map_err(|e| {
            RagError::VectorStore(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let index: VectorIndex = serde_json::from_str(&raw).map_err(|e| {
            RagError::VectorStore(format!("Corrupt index file {}: {}", path.display(), e))
        })?;

        debug!("Loaded index with {} chunks from {}", index.len(), path.display());
        Ok(index)
    }

    /// Write the index to disk; the old file is swapped out in a single rename
    pub fn save(&self, index: &VectorIndex) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            RagError::VectorStore(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let serialized = serde_json::to_vec(index)
            .map_err(|e| RagError::VectorStore(format!("Failed to serialize index: {}", e)))?;

        let path = self.index_path();
        let tmp_path = self.dir.join(format!("{}.tmp", INDEX_FILE));
        fs::write(&tmp_path, serialized).map_err(|e| {
            RagError::VectorStore(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            RagError::VectorStore(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        info!("Saved index with {} chunks to {}", index.len(), path.display());
        Ok(())
    }
}

impl IndexStore for LocalIndexStore {
    async fn replace(&self, index: &VectorIndex) -> Result<()> {
        self.save(index)
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>> {
        self.load()?.search(query, limit)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL").map_err(|_| {
            RagError::Configuration("QDRANT_URL must be set to use the qdrant store".to_string())
        })?;
        let api_key = env::var("QDRANT_API_KEY").ok();
        let collection =
            env::var("QDRANT_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());

        Ok(QdrantConfig {
            url,
            api_key,
            collection,
        })
    }
}

/// Stores the index in a single Qdrant collection
pub struct QdrantIndexStore {
    client: Qdrant,
    collection: String,
}

impl QdrantIndexStore {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .map_err(|e| RagError::Configuration(format!("Invalid Qdrant settings: {}", e)))?;

        Ok(QdrantIndexStore {
            client,
            collection: collection_name(&config.collection),
        })
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(RagError::VectorStore(format!(
                "Failed to check collection existence: {}",
                e
            ))),
        }
    }
}

/// Collection-level operations that `replace` is composed of
trait CollectionOps {
    fn name(&self) -> &str;
    async fn exists(&self) -> Result<bool>;
    async fn delete(&self) -> Result<()>;
    async fn create(&self, dimension: usize) -> Result<()>;
    async fn upsert(&self, points: Vec<PointStruct>) -> Result<()>;
}

impl CollectionOps for QdrantIndexStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn exists(&self) -> Result<bool> {
        self.collection_exists().await
    }

    async fn delete(&self) -> Result<()> {
        self.client
            .delete_collection(self.collection.clone())
            .await
            .map_err(|e| {
                RagError::VectorStore(format!(
                    "Failed to delete collection {}: {}",
                    self.collection, e
                ))
            })?;
        Ok(())
    }

    async fn create(&self, dimension: usize) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorParams {
                size: dimension as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| {
                RagError::VectorStore(format!(
                    "Failed to create collection {}: {}",
                    self.collection, e
                ))
            })?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<PointStruct>) -> Result<()> {
        let upsert_request = UpsertPointsBuilder::new(self.collection.clone(), points)
            .wait(true)
            .build();

        self.client
            .upsert_points(upsert_request)
            .await
            .map_err(|e| {
                RagError::VectorStore(format!(
                    "Failed to upsert points in collection {}: {}",
                    self.collection, e
                ))
            })?;
        Ok(())
    }
}

/// Drop the old collection and store `index` in a fresh one.
/// The collection either ends up holding every point or does not exist.
async fn replace_collection<C: CollectionOps>(ops: &C, index: &VectorIndex) -> Result<()> {
    if ops.exists().await? {
        ops.delete().await?;
    }

    if index.is_empty() {
        warn!("Index is empty; collection {} left absent", ops.name());
        return Ok(());
    }

    ops.create(index.dimension()).await?;

    // All points go in one request so the collection is populated in one step
    let points: Vec<PointStruct> = index.entries().iter().map(point_from_entry).collect();
    if let Err(e) = ops.upsert(points).await {
        if let Err(cleanup) = ops.delete().await {
            warn!(
                "Failed to remove partially built collection {}: {}",
                ops.name(),
                cleanup
            );
        }
        return Err(e);
    }

    info!("Stored {} chunks in collection {}", index.len(), ops.name());
    Ok(())
}

fn point_from_entry(entry: &IndexEntry) -> PointStruct {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("text".to_string(), Value::from(entry.text.clone()));
    payload.insert(
        "chunk_index".to_string(),
        Value::from(entry.chunk_index as i64),
    );

    PointStruct::new(entry.chunk_index as u64, entry.vector.clone(), payload)
}

/// Points missing either payload field are not ours and are skipped
fn scored_chunk_from_point(point: ScoredPoint) -> Option<ScoredChunk> {
    let text = point.payload.get("text")?.as_str()?.to_string();
    let chunk_index = point.payload.get("chunk_index")?.as_integer()?;

    Some(ScoredChunk {
        text,
        chunk_index: usize::try_from(chunk_index).ok()?,
        score: point.score,
    })
}

impl IndexStore for QdrantIndexStore {
    async fn replace(&self, index: &VectorIndex) -> Result<()> {
        replace_collection(self, index).await
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<ScoredChunk>> {
        if !self.collection_exists().await? {
            return Err(RagError::IndexNotFound(self.location()));
        }

        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query.values.clone(),
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| {
                RagError::VectorStore(format!(
                    "Failed to search collection {}: {}",
                    self.collection, e
                ))
            })?;

        let found = search_response.result.len();
        let chunks: Vec<ScoredChunk> = search_response
            .result
            .into_iter()
            .filter_map(scored_chunk_from_point)
            .collect();
        if chunks.len() < found {
            warn!(
                "Skipped {} points without text or chunk_index in {}",
                found - chunks.len(),
                self.collection
            );
        }

        Ok(chunks)
    }

    fn location(&self) -> String {
        format!("qdrant collection {}", self.collection)
    }
}


/// Qdrant collection names are kept to lowercase alphanumerics and underscores
fn collection_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextChunk;
    use crate::embeddings::EmbeddedChunk;
    use qdrant_client::qdrant::PointId;
    use std::cell::{Cell, RefCell};

    fn small_index(texts: &[&str]) -> VectorIndex {
        let embedded = texts
            .iter()
            .enumerate()
            .map(|(i, text)| EmbeddedChunk {
                chunk: TextChunk {
                    text: text.to_string(),
                    chunk_index: i,
                    token_count: 1,
                },
                embedding: Embedding {
                    values: vec![i as f32 + 1.0, 1.0],
                },
            })
            .collect();
        VectorIndex::build(embedded).unwrap()
    }

    /// In-memory collection that records the operations applied to it
    #[derive(Default)]
    struct FakeCollection {
        exists: Cell<bool>,
        fail_upsert: bool,
        calls: RefCell<Vec<&'static str>>,
        points: RefCell<Vec<PointStruct>>,
    }

    impl CollectionOps for FakeCollection {
        fn name(&self) -> &str {
            "fake"
        }

        async fn exists(&self) -> Result<bool> {
            self.calls.borrow_mut().push("exists");
            Ok(self.exists.get())
        }

        async fn delete(&self) -> Result<()> {
            self.calls.borrow_mut().push("delete");
            self.exists.set(false);
            self.points.borrow_mut().clear();
            Ok(())
        }

        async fn create(&self, _dimension: usize) -> Result<()> {
            self.calls.borrow_mut().push("create");
            self.exists.set(true);
            Ok(())
        }

        async fn upsert(&self, points: Vec<PointStruct>) -> Result<()> {
            self.calls.borrow_mut().push("upsert");
            if self.fail_upsert {
                return Err(RagError::VectorStore("connection reset".to_string()));
            }
            self.points.borrow_mut().extend(points);
            Ok(())
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalIndexStore::new(dir.path().join("vector_index"));
        let index = small_index(&["alpha", "beta"]);

        store.save(&index).unwrap();
        assert_eq!(store.load().unwrap(), index);
        assert!(!dir.path().join("vector_index").join("index.json.tmp").exists());
    }

    #[test]
    fn test_load_without_index_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalIndexStore::new(dir.path().join("missing"));
        assert!(matches!(store.load(), Err(RagError::IndexNotFound(_))));
    }

    #[test]
    fn test_corrupt_index_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "{ not json").unwrap();
        let store = LocalIndexStore::new(dir.path());
        assert!(matches!(store.load(), Err(RagError::VectorStore(_))));
    }

    #[tokio::test]
    async fn test_replace_overwrites_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalIndexStore::new(dir.path());

        store.replace(&small_index(&["old"])).await.unwrap();
        store.replace(&small_index(&["new one", "new two"])).await.unwrap();

        let results = store
            .search(&Embedding { values: vec![1.0, 1.0] }, 4)
            .await
            .unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts.len(), 2);
        assert!(!texts.contains(&"old"));
    }

    #[tokio::test]
    async fn test_replace_collection_recreates_and_fills() {
        let collection = FakeCollection::default();
        collection.exists.set(true);

        replace_collection(&collection, &small_index(&["alpha", "beta"]))
            .await
            .unwrap();

        assert_eq!(
            *collection.calls.borrow(),
            vec!["exists", "delete", "create", "upsert"]
        );
        assert!(collection.exists.get());
        assert_eq!(collection.points.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_upsert_removes_the_new_collection() {
        let collection = FakeCollection {
            fail_upsert: true,
            ..FakeCollection::default()
        };
        collection.exists.set(true);

        let result = replace_collection(&collection, &small_index(&["alpha"])).await;

        assert!(matches!(result, Err(RagError::VectorStore(_))));
        assert_eq!(
            *collection.calls.borrow(),
            vec!["exists", "delete", "create", "upsert", "delete"]
        );
        // Searching now reports a missing index instead of an empty one
        assert!(!collection.exists.get());
    }

    #[tokio::test]
    async fn test_empty_index_leaves_collection_absent() {
        let collection = FakeCollection::default();
        collection.exists.set(true);

        replace_collection(&collection, &small_index(&[])).await.unwrap();

        assert_eq!(*collection.calls.borrow(), vec!["exists", "delete"]);
        assert!(!collection.exists.get());
    }

    #[test]
    fn test_point_payload_round_trip() {
        let index = small_index(&["zero", "one chunk"]);
        let entry = &index.entries()[1];

        let point = point_from_entry(entry);
        assert_eq!(point.id, Some(PointId::from(1u64)));
        assert_eq!(
            point.payload.get("text").and_then(|v| v.as_str()),
            Some(&"one chunk".to_string())
        );
        assert_eq!(
            point.payload.get("chunk_index").and_then(|v| v.as_integer()),
            Some(1)
        );

        let scored = ScoredPoint {
            id: point.id.clone(),
            payload: point.payload.clone(),
            score: 0.75,
            ..Default::default()
        };
        assert_eq!(
            scored_chunk_from_point(scored),
            Some(ScoredChunk {
                text: "one chunk".to_string(),
                chunk_index: 1,
                score: 0.75,
            })
        );
    }

    #[test]
    fn test_points_without_chunk_index_are_skipped() {
        let mut payload = HashMap::new();
        payload.insert("text".to_string(), Value::from("stray".to_string()));
        let scored = ScoredPoint {
            payload,
            score: 0.5,
            ..Default::default()
        };
        assert_eq!(scored_chunk_from_point(scored), None);
    }

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("PDF Chat-1"), "pdf_chat_1");
    }
}
