use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use figment::Jail;
use parking_lot::Mutex;
use ragway_agents::{DisabledWebFallback, PromptSet};
use ragway_core::config::Config;
use ragway_core::error::{Error, Result};
use ragway_core::traits::{CompletionParams, Completer, Embedder, Message};
use ragway_core::types::{Chunk, ChunkMetadata, Collection, SearchMethod, Verdict, Visibility};
use ragway_core::CancellationToken;
use ragway_gateway::{default_method, GatewayContext, GatewayParts, GatewaySettings, SearchParams, StaticCatalog};
use ragway_models::HashEmbedder;
use ragway_qdrant::{QdrantBackend, QdrantSettings};
use ragway_vector::LocalBackend;

/// Always answerable; passage agents echo their passage.
#[derive(Default)]
struct EchoCompleter {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Completer for EchoCompleter {
    async fn complete(&self, messages: &[Message], _params: &CompletionParams) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().push(prompt.clone());
        Ok(if prompt.starts_with("CLASSIFY") {
            "1".to_string()
        } else if let Some(passage) = prompt.strip_prefix("PASSAGE ") {
            format!("from {passage}")
        } else {
            "merged answer".to_string()
        })
    }
}

fn collection(id: &str, model: &str) -> Collection {
    Collection {
        id: id.into(),
        name: id.into(),
        embedding_model: model.into(),
        visibility: Visibility::Public,
        owner: "tester".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        document_count: 0,
    }
}

fn chunk(collection_id: &str, doc: &str, part: u32, content: &str) -> Chunk {
    Chunk {
        id: format!("{doc}:{part}"),
        content: content.to_string(),
        metadata: ChunkMetadata {
            document_id: doc.to_string(),
            document_name: format!("{doc}.md"),
            document_part: part,
            collection_id: collection_id.to_string(),
            created_at: Utc::now(),
            extra: Default::default(),
        },
    }
}

/// Either drops the first vector or returns zero-length ones.
struct BrokenEmbedder {
    short: bool,
}

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        if self.short {
            Ok(texts.iter().skip(1).map(|_| vec![0.5; 8]).collect())
        } else {
            Ok(texts.iter().map(|_| Vec::new()).collect())
        }
    }
}

async fn context_with(
    tmp: &tempfile::TempDir,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<(Arc<GatewayContext>, Arc<EchoCompleter>)> {
    let backend = Arc::new(LocalBackend::open(tmp.path()).await?);
    let catalog = Arc::new(StaticCatalog::new(vec![
        collection("garden", "hash"),
        collection("kitchen", "hash"),
        collection("attic", "other-model"),
    ])?);
    let completer = Arc::new(EchoCompleter::default());
    let mut settings = GatewaySettings::default();
    settings.prompts = PromptSet {
        classify: "CLASSIFY {context}".into(),
        passage: "PASSAGE {passage}".into(),
        merge: "MERGE {answers}".into(),
        ..PromptSet::default()
    };
    let context = GatewayContext::from_parts(GatewayParts {
        settings,
        backend,
        catalog,
        embedder,
        completer: completer.clone(),
        web: Arc::new(DisabledWebFallback),
    });
    Ok((context, completer))
}

async fn gateway(tmp: &tempfile::TempDir) -> anyhow::Result<(Arc<GatewayContext>, Arc<EchoCompleter>)> {
    let (context, completer) = context_with(tmp, Arc::new(HashEmbedder::new(32))).await?;
    let chunks = vec![
        chunk("garden", "compost", 0, "turn the compost pile every week"),
        chunk("garden", "compost", 1, "compost needs greens and browns"),
        chunk("garden", "tomatoes", 0, "tomatoes want full sun and deep watering"),
    ];
    context.load_chunks("garden", &chunks, &CancellationToken::new()).await?;
    Ok((context, completer))
}

fn params(method: SearchMethod) -> SearchParams {
    SearchParams { method, k: 5, rrf_k: None, score_threshold: None }
}

#[tokio::test]
async fn hybrid_search_fuses_lexical_and_semantic() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, _) = gateway(&tmp).await?;
    let ids = vec!["garden".to_string()];
    let token = CancellationToken::new();

    let hybrid = gateway.search(&ids, "tomatoes", params(SearchMethod::Hybrid), &token).await?;
    assert_eq!(hybrid[0].chunk.id, "tomatoes:0");
    assert_eq!(hybrid[0].method.as_str(), "lexical/semantic");
    assert_eq!(hybrid.len(), 3);

    let semantic = gateway.search(&ids, "tomatoes", params(SearchMethod::Semantic), &token).await?;
    assert!(semantic.iter().all(|r| r.method.as_str() == "semantic"));

    let lexical = gateway.search(&ids, "compost", params(SearchMethod::Lexical), &token).await?;
    assert_eq!(lexical.len(), 2);
    Ok(())
}

#[tokio::test]
async fn usage_errors_are_reported_before_searching() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, _) = gateway(&tmp).await?;
    let token = CancellationToken::new();

    let mixed = vec!["garden".to_string(), "attic".to_string()];
    let err = gateway.search(&mixed, "compost", params(SearchMethod::Hybrid), &token).await.unwrap_err();
    assert!(matches!(err, Error::DifferentCollectionModels(_)), "{err}");

    let unknown = vec!["cellar".to_string()];
    let err = gateway.search(&unknown, "compost", params(SearchMethod::Hybrid), &token).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");

    let err = gateway.search(&[], "compost", params(SearchMethod::Hybrid), &token).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn orchestrated_answer_cites_the_passages_it_used() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, completer) = gateway(&tmp).await?;
    let ids = vec!["garden".to_string()];

    let out = gateway.orchestrated_answer(&ids, "compost", None, None, &CancellationToken::new()).await?;
    assert_eq!(out.verdict, Verdict::Answerable);
    assert_eq!(out.retries_used, 0);
    assert_eq!(out.answer, "merged answer");
    assert_eq!(out.source_names.len(), 2);
    assert!(out.source_names.contains(&"compost.md".to_string()));
    assert_eq!(out.source_contents.len(), 3);

    let prompts = completer.prompts.lock();
    assert_eq!(prompts.iter().filter(|p| p.starts_with("CLASSIFY")).count(), 1);
    assert_eq!(prompts.iter().filter(|p| p.starts_with("PASSAGE")).count(), 3);
    Ok(())
}

#[tokio::test]
async fn documents_can_be_deleted() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, _) = gateway(&tmp).await?;
    assert_eq!(gateway.delete_document("garden", "compost").await?, Some(2));
    assert_eq!(gateway.backend().chunk_count("garden", "compost").await, Some(0));
    assert!(gateway.delete_document("cellar", "compost").await.is_err());

    let stray = [chunk("kitchen", "bread", 0, "knead the dough")];
    let err = gateway.load_chunks("garden", &stray, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    gateway.shutdown();
    Ok(())
}

#[tokio::test]
async fn collections_without_chunks_search_as_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, completer) = gateway(&tmp).await?;
    let token = CancellationToken::new();
    let kitchen = vec!["kitchen".to_string()];

    for method in [SearchMethod::Lexical, SearchMethod::Semantic, SearchMethod::Hybrid] {
        assert!(gateway.search(&kitchen, "compost", params(method), &token).await?.is_empty());
    }
    let both = vec!["garden".to_string(), "kitchen".to_string()];
    let hits = gateway.search(&both, "compost", params(SearchMethod::Hybrid), &token).await?;
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|r| r.chunk.collection_id() == "garden"));

    let out = gateway.orchestrated_answer(&kitchen, "compost", None, None, &token).await?;
    assert_eq!(out.answer, PromptSet::default().nothing_found);
    assert!(out.source_names.is_empty());
    assert_eq!(completer.prompts.lock().iter().filter(|p| p.starts_with("CLASSIFY")).count(), 1);
    Ok(())
}

#[tokio::test]
async fn bad_embeddings_leave_no_collection_behind() -> anyhow::Result<()> {
    let chunks = [chunk("kitchen", "bread", 0, "knead"), chunk("kitchen", "bread", 1, "proof")];

    let tmp = tempfile::tempdir()?;
    let (gateway, _) = context_with(&tmp, Arc::new(BrokenEmbedder { short: true })).await?;
    let err = gateway.load_chunks("kitchen", &chunks, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err}");
    assert!(gateway.backend().list_collections().await?.is_empty());

    let tmp = tempfile::tempdir()?;
    let (gateway, _) = context_with(&tmp, Arc::new(BrokenEmbedder { short: false })).await?;
    let err = gateway.load_chunks("kitchen", &chunks, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingFailed { .. }), "{err}");
    assert!(gateway.backend().list_collections().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn shutting_down_one_handle_keeps_the_others_usable() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (gateway, _) = gateway(&tmp).await?;
    let other = gateway.clone();
    gateway.shutdown();
    let hits = other
        .search(&["garden".to_string()], "compost", params(SearchMethod::Lexical), &CancellationToken::new())
        .await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(Arc::strong_count(&other), 1);
    other.shutdown();
    Ok(())
}

#[tokio::test]
async fn default_method_follows_backend_capabilities() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let local = LocalBackend::open(tmp.path()).await?;
    assert_eq!(default_method(None, &local), SearchMethod::Hybrid);
    assert_eq!(default_method(Some(SearchMethod::Lexical), &local), SearchMethod::Lexical);

    let qdrant = QdrantBackend::connect(&QdrantSettings { url: "http://127.0.0.1:9".into(), ..QdrantSettings::default() })?;
    assert_eq!(default_method(None, &qdrant), SearchMethod::Semantic);
    Ok(())
}

#[test]
fn context_builds_from_config_files() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[backend]
kind = "local"
local = { root_dir = "store" }

[models]
use_fake_embeddings = true
fake_embedding_dim = 16

[agents]
window_size = 3
method = "lexical"

[[collections]]
id = "notes"
name = "Notes"
embedding_model = "hash"
"#,
        )?;
        jail.set_env("APP_AGENTS__MAX_RETRIES", "1");

        let config = Config::load().map_err(|e| e.to_string())?;
        let settings = GatewaySettings::from_config(&config).map_err(|e| e.to_string())?;
        assert_eq!(settings.agents.window_size, 3);
        assert_eq!(settings.agents.max_retries, 1);
        assert_eq!(settings.agents.method, Some(SearchMethod::Lexical));
        assert_eq!(settings.collections.len(), 1);

        let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
        runtime
            .block_on(async {
                let gateway = GatewayContext::from_config(&config, jail.directory()).await?;
                let chunks = [chunk("notes", "log", 0, "replaced the water filter")];
                gateway.load_chunks("notes", &chunks, &CancellationToken::new()).await?;
                let hits = gateway
                    .search(&["notes".to_string()], "filter", params(SearchMethod::Hybrid), &CancellationToken::new())
                    .await?;
                assert_eq!(hits.len(), 1);
                Ok::<_, Error>(())
            })
            .map_err(|e| e.to_string())?;
        assert!(jail.directory().join("store").join("tantivy").is_dir());
        Ok(())
    });
}
