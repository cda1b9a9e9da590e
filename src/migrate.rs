//! Database schema migrations.
//!
//! Creates every table the Document Store (C7) needs. Idempotent: safe to
//! run on every startup (`CREATE TABLE IF NOT EXISTS` throughout). The
//! Vector Index (C8) and Keyword Index (C9) are *not* schema here — they
//! are in-memory derived caches rebuilt from `chunk_vectors` and `chunks`
//! respectively (see [`crate::vector_index`] and [`crate::keyword_index`]).

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            doc_id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            format TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            indexed_at TEXT NOT NULL,
            embedder_id TEXT,
            chunker_id TEXT NOT NULL,
            normaliser_id TEXT NOT NULL,
            extractor_id TEXT NOT NULL,
            title TEXT,
            author TEXT,
            publication_date TEXT,
            chunk_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_file_hash ON documents(file_hash)")
        .execute(&pool)
        .await?;

    // Additional source paths recorded against a document under the
    // `link` duplicate policy.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_links (
            doc_id TEXT NOT NULL,
            source_path TEXT NOT NULL,
            linked_at TEXT NOT NULL,
            PRIMARY KEY (doc_id, source_path),
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            doc_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            page_spans_json TEXT NOT NULL DEFAULT '[]',
            section_path_json TEXT NOT NULL DEFAULT '[]',
            token_count INTEGER NOT NULL,
            prev_chunk_id TEXT,
            next_chunk_id TEXT,
            content_hash TEXT NOT NULL,
            context_prefix TEXT,
            UNIQUE(doc_id, ordinal),
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)")
        .execute(&pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            doc_id TEXT NOT NULL,
            embedder_id TEXT NOT NULL,
            dims INTEGER NOT NULL,
            vector BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(chunk_id) ON DELETE CASCADE,
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_vectors_doc_id ON chunk_vectors(doc_id)")
        .execute(&pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            name TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            source TEXT NOT NULL,
            confidence REAL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (name, doc_id),
            FOREIGN KEY (doc_id) REFERENCES documents(doc_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            root_path TEXT NOT NULL,
            total_files INTEGER NOT NULL,
            completed_paths_json TEXT NOT NULL,
            failed_json TEXT NOT NULL,
            schema_version INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            operation TEXT NOT NULL,
            doc_id TEXT,
            detail TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
