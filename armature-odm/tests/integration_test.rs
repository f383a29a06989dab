//! Integration tests for armature-odm

use armature_odm::mock::{EngineCall, MockEngine, Operation};
use armature_odm::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Article {
    #[serde(skip)]
    id: String,
    title: String,
}

impl Article {
    fn new(id: &str, title: &str) -> DocumentRef<Self> {
        shared(Self {
            id: id.to_string(),
            title: title.to_string(),
        })
    }
}

impl Document for Article {
    fn blank() -> Self {
        Self::default()
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn rebuild(&mut self, id: &str, source: Source) -> Result<()> {
        *self = document::from_source(source)?;
        self.id = id.to_string();
        Ok(())
    }

    fn to_storable(&self) -> Result<Source> {
        document::to_source(self)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlogPost {
    #[serde(skip)]
    id: String,
    body: String,
}

impl Document for BlogPost {
    fn blank() -> Self {
        Self::default()
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn rebuild(&mut self, id: &str, source: Source) -> Result<()> {
        *self = document::from_source(source)?;
        self.id = id.to_string();
        Ok(())
    }

    fn to_storable(&self) -> Result<Source> {
        document::to_source(self)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manager() -> (DocumentManager<MockEngine>, MockEngine) {
    init_tracing();
    let engine = MockEngine::new();
    let manager = DocumentManager::new(ManagerConfig::new("catalog"), engine.clone());
    (manager, engine)
}

#[test]
fn test_default_names() {
    let (manager, _engine) = manager();

    assert_eq!(manager.wire_type_name::<Article>(), "article");
    assert_eq!(manager.index_name::<Article>(), "catalog__article");
    assert_eq!(manager.wire_type_name::<BlogPost>(), "blogPost");
    assert_eq!(manager.index_name::<BlogPost>(), "catalog__blogpost");
}

#[test]
fn test_register_type_after_use_keeps_first_name() {
    let (mut manager, _engine) = manager();

    assert_eq!(manager.wire_type_name::<Article>(), "article");
    manager.register_type::<Article>("news");
    assert_eq!(manager.wire_type_name::<Article>(), "article");
}

#[tokio::test]
async fn test_saved_document_is_served_from_identity_map() {
    let (mut manager, engine) = manager();
    let article = Article::new("1", "Hello");

    manager.save(&article, false).await.unwrap();
    let loaded = manager.document::<Article>("1").await.unwrap();

    assert!(Arc::ptr_eq(&loaded, &article));
    assert_eq!(engine.call_count(Operation::GetDocument), 0);
}

#[tokio::test]
async fn test_register_conflict_and_replace() {
    let (mut manager, _engine) = manager();
    let first = Article::new("1", "first");
    let second = Article::new("1", "second");

    manager.register(&first, false).unwrap();
    assert!(manager.register(&second, false).unwrap_err().is_conflict());

    manager.register(&second, true).unwrap();
    let loaded = manager.document::<Article>("1").await.unwrap();
    assert!(Arc::ptr_eq(&loaded, &second));
}

#[tokio::test]
async fn test_detach_all_forces_fetch() {
    let (mut manager, engine) = manager();
    let article = Article::new("1", "Hello");
    manager.save(&article, false).await.unwrap();

    manager.detach_all();
    let loaded = manager.document::<Article>("1").await.unwrap();

    assert!(!Arc::ptr_eq(&loaded, &article));
    assert_eq!(loaded.read().title, "Hello");
    assert_eq!(engine.call_count(Operation::GetDocument), 1);
}

#[tokio::test]
async fn test_detach_removes_single_entry() {
    let (mut manager, _engine) = manager();
    manager.register(&Article::new("1", "a"), false).unwrap();
    manager.register(&Article::new("2", "b"), false).unwrap();
    manager
        .register(
            &shared(BlogPost {
                id: "1".to_string(),
                body: "c".to_string(),
            }),
            false,
        )
        .unwrap();

    manager.detach::<Article>("1");
    assert!(!manager.is_registered::<Article>("1"));
    assert!(manager.is_registered::<Article>("2"));
    assert!(manager.is_registered::<BlogPost>("1"));

    manager.detach_type::<Article>();
    assert_eq!(manager.registered_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_retries_with_quadratic_backoff() {
    let (manager, engine) = manager();
    engine.fail_always(Operation::GetDocument);

    let started = tokio::time::Instant::now();
    let err = manager.fetch_document::<Article>("1", 3).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, OdmError::Unavailable { attempts: 4, .. }));
    assert_eq!(engine.call_count(Operation::GetDocument), 4);
    assert!(elapsed >= Duration::from_secs(14));
    assert!(elapsed < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_recovers_after_failures() {
    let (manager, engine) = manager();
    engine.insert("catalog__article", "1", json!({ "title": "Hello" }));
    engine.fail_next(Operation::GetDocument, 2);

    let started = tokio::time::Instant::now();
    let envelope = manager.fetch_document::<Article>("1", 3).await.unwrap();

    assert_eq!(envelope["_source"]["title"], "Hello");
    assert_eq!(engine.call_count(Operation::GetDocument), 3);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_first_success_has_no_delay() {
    let (manager, engine) = manager();
    engine.insert("catalog__article", "1", json!({ "title": "Hello" }));

    let started = tokio::time::Instant::now();
    manager.fetch_document::<Article>("1", 3).await.unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_document_reports_unavailable_engine_as_not_found() {
    let (mut manager, engine) = manager();
    engine.fail_always(Operation::GetDocument);

    let err = manager
        .document_with_retries::<Article>("1", 1)
        .await
        .unwrap_err();

    match err {
        OdmError::NotFound {
            source: Some(cause),
            ..
        } => assert!(cause.is_unavailable()),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(engine.call_count(Operation::GetDocument), 2);
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
    let (mut manager, _engine) = manager();

    let err = manager.document::<Article>("missing").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(!manager.is_registered::<Article>("missing"));
}

#[tokio::test]
async fn test_delete_detaches_even_when_engine_fails() {
    let (mut manager, engine) = manager();
    let article = Article::new("1", "Hello");
    manager.save(&article, false).await.unwrap();
    engine.fail_always(Operation::DeleteDocument);

    manager.delete::<Article>("1").await;

    assert!(!manager.is_registered::<Article>("1"));
    assert_eq!(engine.call_count(Operation::DeleteDocument), 1);
}

#[tokio::test]
async fn test_search_and_count_bodies() {
    let (mut manager, engine) = manager();
    let search = Search::term("title", "rust")
        .from(20)
        .size(10)
        .sort_by("title", SortOrder::Asc);

    manager.documents::<Article>(&search).await.unwrap();
    manager.count::<Article>(&search).await.unwrap();

    let calls = engine.calls();
    match &calls[0] {
        EngineCall::Search(request) => {
            assert_eq!(request.index, "catalog__article");
            assert_eq!(request.doc_type, "article");
            assert_eq!(
                request.body,
                json!({
                    "from": 20,
                    "size": 10,
                    "query": { "term": { "title": "rust" } },
                    "sort": [{ "title": { "order": "asc" } }]
                })
            );
        }
        other => panic!("unexpected call {:?}", other),
    }
    match &calls[1] {
        EngineCall::Count(request) => {
            assert_eq!(request.body, json!({ "query": { "term": { "title": "rust" } } }));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_search_has_only_pagination() {
    let (mut manager, engine) = manager();

    let found = manager
        .documents::<Article>(&Search::empty())
        .await
        .unwrap();

    assert!(found.is_empty());
    match &engine.calls()[0] {
        EngineCall::Search(request) => {
            assert_eq!(request.body, json!({ "from": 0, "size": 10000 }));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_search_reuses_loaded_instances() {
    let (mut manager, engine) = manager();
    let article = Article::new("1", "Local");
    manager.register(&article, false).unwrap();
    engine.insert("catalog__article", "1", json!({ "title": "Remote" }));
    engine.insert("catalog__article", "2", json!({ "title": "Other" }));

    let found = manager
        .documents::<Article>(&Search::empty())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(Arc::ptr_eq(&found[0], &article));
    assert_eq!(article.read().title, "Remote");
    assert_eq!(manager.registered_count(), 2);
}

#[tokio::test]
async fn test_create_and_drop_index_with_pipeline() {
    let (mut manager, engine) = manager();
    manager.register_mapping::<Article>(json!({
        "properties": { "title": { "type": "text" } }
    }));
    manager.register_settings::<Article>(json!({ "number_of_shards": 1 }));
    manager.register_pipeline::<Article>(
        Pipeline::new("trim titles").processor(json!({ "trim": { "field": "title" } })),
    );

    manager.create_index().await.unwrap();

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    match &calls[0] {
        EngineCall::PutPipeline(request) => {
            assert_eq!(request.id, "article");
            assert_eq!(request.body["description"], "trim titles");
        }
        other => panic!("unexpected call {:?}", other),
    }
    match &calls[1] {
        EngineCall::CreateIndex(request) => {
            assert_eq!(request.index, "catalog__article");
            assert_eq!(
                request.body(),
                json!({
                    "settings": { "number_of_shards": 1 },
                    "mappings": { "article": { "properties": { "title": { "type": "text" } } } }
                })
            );
        }
        other => panic!("unexpected call {:?}", other),
    }

    engine.clear_calls();
    engine.fail_always(Operation::DeletePipeline);
    manager.drop_index().await.unwrap();

    assert_eq!(engine.call_count(Operation::DeletePipeline), 1);
    assert_eq!(engine.call_count(Operation::DeleteIndex), 1);
}

#[tokio::test]
async fn test_create_index_stops_on_pipeline_failure() {
    let (mut manager, engine) = manager();
    manager.register_mapping::<Article>(json!({ "properties": {} }));
    manager.register_pipeline::<Article>(Pipeline::new("noop"));
    engine.fail_always(Operation::PutPipeline);

    assert!(manager.create_index().await.is_err());
    assert_eq!(engine.call_count(Operation::CreateIndex), 0);
}

#[tokio::test]
async fn test_drop_missing_index_fails() {
    let (mut manager, _engine) = manager();
    manager.register_mapping::<Article>(json!({ "properties": {} }));

    assert!(manager.drop_index_for::<Article>().await.is_err());
}

#[tokio::test]
async fn test_index_lifecycle_follows_mapping_order() {
    let (mut manager, engine) = manager();
    manager.register_settings::<Article>(json!({ "number_of_shards": 1 }));
    manager.register_mapping::<BlogPost>(json!({ "properties": {} }));
    manager.register_mapping::<Article>(json!({ "properties": {} }));

    manager.create_index().await.unwrap();
    manager.drop_index().await.unwrap();

    let order: Vec<String> = engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::CreateIndex(request) => Some(format!("create {}", request.index)),
            EngineCall::DeleteIndex(index) => Some(format!("drop {}", index)),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "create catalog__blogpost",
            "create catalog__article",
            "drop catalog__blogpost",
            "drop catalog__article",
        ]
    );
}

#[tokio::test]
async fn test_create_index_for_one_type() {
    let (mut manager, engine) = manager();
    manager.register_mapping::<Article>(json!({ "properties": {} }));
    manager.register_mapping::<BlogPost>(json!({ "properties": {} }));

    manager.create_index_for::<BlogPost>().await.unwrap();

    assert_eq!(engine.call_count(Operation::CreateIndex), 1);
    match &engine.calls()[0] {
        EngineCall::CreateIndex(request) => assert_eq!(request.index, "catalog__blogpost"),
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_save_all_writes_every_loaded_document() {
    let (mut manager, engine) = manager();
    manager.register_pipeline::<BlogPost>(Pipeline::new("noop"));

    let article = Article::new("1", "Draft");
    manager.register(&article, false).unwrap();
    manager
        .register(
            &shared(BlogPost {
                id: "9".to_string(),
                body: "text".to_string(),
            }),
            false,
        )
        .unwrap();
    article.write().title = "Final".to_string();

    manager.save_all().await.unwrap();

    assert_eq!(
        engine.stored("catalog__article", "1"),
        Some(json!({ "title": "Final" }))
    );
    let pipelines: Vec<Option<String>> = engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::IndexDocument(request) => Some(request.pipeline),
            _ => None,
        })
        .collect();
    assert_eq!(pipelines, vec![None, Some("blogPost".to_string())]);
}

#[tokio::test]
async fn test_save_all_stops_at_first_failure() {
    let (mut manager, engine) = manager();
    manager.register(&Article::new("1", "a"), false).unwrap();
    manager.register(&Article::new("2", "b"), false).unwrap();
    engine.fail_next(Operation::IndexDocument, 1);

    assert!(manager.save_all().await.is_err());
    assert_eq!(engine.call_count(Operation::IndexDocument), 1);
    assert!(engine.stored("catalog__article", "2").is_none());
}

#[tokio::test]
async fn test_refresh_rejects_unmanaged_instance() {
    let (mut manager, _engine) = manager();
    manager.register(&Article::new("1", "managed"), false).unwrap();

    let err = manager
        .refresh_document(&Article::new("1", "stranger"))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_repository_flow() {
    let (manager, engine) = manager();
    let repository = Repository::<Article, MockEngine>::new(manager.into_shared());

    let article = Article::new("1", "Hello");
    repository.save(&article).await.unwrap();
    assert!(Arc::ptr_eq(&repository.find("1").await.unwrap(), &article));

    engine.insert("catalog__article", "1", json!({ "title": "Edited elsewhere" }));
    repository.refresh(&article).await.unwrap();
    assert_eq!(article.read().title, "Edited elsewhere");

    repository.remove("1").await;
    assert_eq!(repository.count_by(&Search::empty()).await.unwrap(), 0);
    assert!(repository.find("1").await.unwrap_err().is_not_found());
}

// Note: These tests require a running OpenSearch node
// They are disabled by default but can be run with: cargo test -- --ignored

#[tokio::test]
#[ignore]
async fn test_opensearch_round_trip() {
    init_tracing();
    let config = ManagerConfig::new("armature_odm_test").with_retries(1);
    let mut manager = DocumentManager::connect(config, OpenSearchConfig::from_env()).unwrap();
    manager.register_mapping::<Article>(json!({
        "properties": { "title": { "type": "keyword" } }
    }));

    let _ = manager.drop_index().await;
    manager.create_index().await.unwrap();

    let article = Article::new("1", "Hello");
    manager.save(&article, false).await.unwrap();

    manager.detach_all();
    let loaded = manager.document::<Article>("1").await.unwrap();
    assert_eq!(loaded.read().title, "Hello");

    manager.delete::<Article>("1").await;
    assert!(manager.document::<Article>("1").await.unwrap_err().is_not_found());

    manager.drop_index().await.unwrap();
}
