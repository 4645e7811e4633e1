use codesearch::{Chunk, ChunkType, DuckdbVectorRepository, Language, VectorQueryFilters, VectorStore};

fn chunk(id: &str, repo: &str, path: &str, content: &str) -> Chunk {
    Chunk::new(
        id.to_string(),
        repo.to_string(),
        path.to_string(),
        content.to_string(),
        1,
        1,
        Language::Rust,
        ChunkType::Function,
    )
}

#[tokio::test]
async fn duckdb_vector_repository_can_save_and_search() {
    let repo = DuckdbVectorRepository::in_memory(3).unwrap();

    repo.upsert(
        &["a".to_string(), "b".to_string()],
        &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        &[
            chunk("a", "repo", "a.rs", "fn a() {}"),
            chunk("b", "repo", "b.rs", "fn b() {}"),
        ],
    )
    .await
    .unwrap();

    let results = repo
        .query(&[1.0, 0.0, 0.0], 10, &VectorQueryFilters::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "a");
    assert_eq!(results[0].chunk.file_path(), "a.rs");
}

#[tokio::test]
async fn duckdb_vector_repository_delete_by_repository_removes_all() {
    let repo = DuckdbVectorRepository::in_memory(2).unwrap();

    repo.upsert(
        &["a".to_string(), "b".to_string()],
        &[vec![1.0, 0.0], vec![1.0, 0.0]],
        &[
            chunk("a", "repo1", "a.rs", "fn a() {}"),
            chunk("b", "repo2", "b.rs", "fn b() {}"),
        ],
    )
    .await
    .unwrap();

    repo.delete_by_repository("repo1").await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);
    let remaining = repo
        .query(&[1.0, 0.0], 10, &VectorQueryFilters::default())
        .await
        .unwrap();
    assert_eq!(remaining[0].id, "b");
}

/// The store no longer maintains its own keyword index: BM25 is handled
/// entirely by the hybrid-search use case upstream, so `query_text` is
/// always empty here.
#[tokio::test]
async fn duckdb_vector_repository_query_text_has_no_keyword_index() {
    let repo = DuckdbVectorRepository::in_memory(2).unwrap();

    repo.upsert(
        &["a".to_string()],
        &[vec![1.0, 0.0]],
        &[chunk("a", "repo", "a.rs", "fn needle() {}")],
    )
    .await
    .unwrap();

    let results = repo
        .query_text(&["needle".to_string()], 10, &VectorQueryFilters::default())
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn duckdb_vector_repository_schema_namespaces_tables() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("store.duckdb");

    let repo = DuckdbVectorRepository::new_with_namespace(&db_path, "repo_a", 2).unwrap();
    repo.upsert(
        &["a".to_string()],
        &[vec![1.0, 0.0]],
        &[chunk("a", "repo", "a.rs", "fn a() {}")],
    )
    .await
    .unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);

    drop(repo);

    let reopened = DuckdbVectorRepository::new_with_namespace(&db_path, "repo_a", 2).unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
    drop(reopened);

    let other_namespace = DuckdbVectorRepository::new_with_namespace(&db_path, "repo_b", 2).unwrap();
    assert_eq!(other_namespace.count().await.unwrap(), 0);
}

#[tokio::test]
async fn duckdb_vector_repository_get_by_ids_resolves_bm25_only_matches() {
    let repo = DuckdbVectorRepository::in_memory(2).unwrap();

    repo.upsert(
        &["a".to_string(), "b".to_string()],
        &[vec![1.0, 0.0], vec![0.0, 1.0]],
        &[
            chunk("a", "repo", "a.rs", "fn a() {}"),
            chunk("b", "repo", "b.rs", "fn b() {}"),
        ],
    )
    .await
    .unwrap();

    let found = repo
        .get_by_ids(&["b".to_string(), "missing".to_string()])
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), "b");
}

#[tokio::test]
async fn duckdb_vector_repository_rejects_mismatched_vector_lengths() {
    let repo = DuckdbVectorRepository::in_memory(3).unwrap();

    let err = repo
        .upsert(
            &["a".to_string()],
            &[vec![1.0, 0.0]],
            &[chunk("a", "repo", "a.rs", "fn a() {}")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, codesearch::DomainError::InvalidInput(_)));
}
