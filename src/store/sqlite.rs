//! SQLite implementation of [`super::Store`], built on [`crate::db`]'s
//! WAL-mode pool. Admission replaces a document's chunks and vectors
//! together with a transactional delete+reinsert, so the whole
//! admission commits or rolls back as one unit rather than just the
//! chunk swap.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{ChunkRecord, MetadataFilter, Store, VectorRecord};
use crate::error::{EngineError, EngineResult};
use crate::models::{Chunk, Document, Embedding, Tag, TagSource};
use crate::vector_index::{blob_to_vec, vec_to_blob};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolves a set of tag names to the `doc_id`s carrying at least one
    /// of them, for [`MetadataFilter::tags`] pushdown in `scan_chunks`
    /// and `scan_vectors`.
    async fn doc_ids_with_any_tag(&self, tags: &[String]) -> EngineResult<std::collections::HashSet<String>> {
        if tags.is_empty() {
            return Ok(std::collections::HashSet::new());
        }
        let placeholders = std::iter::repeat("?").take(tags.len()).collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT DISTINCT doc_id FROM tags WHERE name IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for tag in tags {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
        Ok(rows.into_iter().map(|(doc_id,)| doc_id).collect())
    }
}

fn storage_err(e: sqlx::Error) -> EngineError {
    EngineError::StorageError { reason: e.to_string() }
}

fn tag_source_str(s: TagSource) -> &'static str {
    match s {
        TagSource::Manual => "manual",
        TagSource::Legacy => "legacy",
        TagSource::AutoKeyword => "auto-keyword",
        TagSource::AutoLlm => "auto-llm",
        TagSource::Imported => "imported",
    }
}

fn tag_source_from_str(s: &str) -> TagSource {
    match s {
        "legacy" => TagSource::Legacy,
        "auto-keyword" => TagSource::AutoKeyword,
        "auto-llm" => TagSource::AutoLlm,
        "imported" => TagSource::Imported,
        _ => TagSource::Manual,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_by_content_hash(&self, content_hash: &str) -> EngineResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT doc_id FROM documents WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|(id,)| id))
    }

    async fn find_unchanged(&self, source_path: &str, file_hash: &str) -> EngineResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT doc_id FROM documents WHERE source_path = ? AND file_hash = ?")
                .bind(source_path)
                .bind(file_hash)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;
        Ok(row.map(|(id,)| id))
    }

    async fn admit(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: Option<&[Embedding]>,
    ) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO documents (
                doc_id, source_path, content_hash, file_hash, format, byte_size,
                indexed_at, embedder_id, chunker_id, normaliser_id, extractor_id,
                title, author, publication_date, chunk_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                source_path = excluded.source_path,
                content_hash = excluded.content_hash,
                file_hash = excluded.file_hash,
                format = excluded.format,
                byte_size = excluded.byte_size,
                indexed_at = excluded.indexed_at,
                embedder_id = excluded.embedder_id,
                chunker_id = excluded.chunker_id,
                normaliser_id = excluded.normaliser_id,
                extractor_id = excluded.extractor_id,
                title = excluded.title,
                author = excluded.author,
                publication_date = excluded.publication_date,
                chunk_count = excluded.chunk_count
            "#,
        )
        .bind(&document.doc_id)
        .bind(&document.source_path)
        .bind(&document.content_hash)
        .bind(&document.file_hash)
        .bind(&document.format)
        .bind(document.byte_size as i64)
        .bind(document.indexed_at.to_rfc3339())
        .bind(&document.embedder_id)
        .bind(&document.chunker_id)
        .bind(&document.normaliser_id)
        .bind(&document.extractor_id)
        .bind(&document.title)
        .bind(&document.author)
        .bind(document.publication_date.map(|d| d.to_rfc3339()))
        .bind(document.chunk_count as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        sqlx::query("DELETE FROM chunk_vectors WHERE doc_id = ?")
            .bind(&document.doc_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(&document.doc_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for chunk in chunks {
            let page_spans_json = serde_json::to_string(&chunk.page_spans).unwrap_or_else(|_| "[]".to_string());
            let section_path_json = serde_json::to_string(&chunk.section_path).unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                r#"
                INSERT INTO chunks (
                    chunk_id, doc_id, ordinal, text, char_start, char_end,
                    page_spans_json, section_path_json, token_count,
                    prev_chunk_id, next_chunk_id, content_hash, context_prefix
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.doc_id)
            .bind(chunk.ordinal)
            .bind(&chunk.text)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(page_spans_json)
            .bind(section_path_json)
            .bind(chunk.token_count as i64)
            .bind(&chunk.prev_chunk_id)
            .bind(&chunk.next_chunk_id)
            .bind(&chunk.content_hash)
            .bind(&chunk.context_prefix)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        if let Some(embeddings) = embeddings {
            for embedding in embeddings {
                let blob = vec_to_blob(&embedding.vector);
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, doc_id, embedder_id, dims, vector) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&embedding.chunk_id)
                .bind(&document.doc_id)
                .bind(&embedding.embedder_id)
                .bind(embedding.vector.len() as i64)
                .bind(blob)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn link_path(&self, doc_id: &str, source_path: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO document_links (doc_id, source_path, linked_at) VALUES (?, ?, ?)",
        )
        .bind(doc_id)
        .bind(source_path)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_document(&self, doc_id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> EngineResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn get_chunks(&self, doc_id: &str) -> EngineResult<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>("SELECT * FROM chunks WHERE doc_id = ? ORDER BY ordinal")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_chunk_by_id(&self, chunk_id: &str) -> EngineResult<Option<ChunkRecord>> {
        let row = sqlx::query_as::<_, ChunkJoinRow>(
            r#"
            SELECT c.*, d.source_path as doc_source_path, d.indexed_at as doc_indexed_at
            FROM chunks c JOIN documents d ON d.doc_id = c.doc_id
            WHERE c.chunk_id = ?
            "#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn scan_chunks(&self, filter: &MetadataFilter) -> EngineResult<Vec<ChunkRecord>> {
        let rows = sqlx::query_as::<_, ChunkJoinRow>(
            r#"
            SELECT c.*, d.source_path as doc_source_path, d.indexed_at as doc_indexed_at
            FROM chunks c JOIN documents d ON d.doc_id = c.doc_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut out: Vec<ChunkRecord> = rows.into_iter().map(Into::into).collect();
        if let Some(doc_ids) = &filter.doc_ids {
            out.retain(|r| doc_ids.contains(&r.doc_id));
        }
        if let Some(since) = filter.since {
            out.retain(|r| r.indexed_at >= since);
        }
        if let Some(tags) = &filter.tags {
            let tagged_doc_ids = self.doc_ids_with_any_tag(tags).await?;
            out.retain(|r| tagged_doc_ids.contains(&r.doc_id));
        }
        Ok(out)
    }

    async fn scan_vectors(&self, filter: &MetadataFilter) -> EngineResult<Vec<VectorRecord>> {
        let doc_ids = filter.doc_ids.clone();
        let rows = sqlx::query_as::<_, (String, String, Vec<u8>)>(
            "SELECT chunk_id, doc_id, vector FROM chunk_vectors",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let tagged_doc_ids = match &filter.tags {
            Some(tags) => Some(self.doc_ids_with_any_tag(tags).await?),
            None => None,
        };

        Ok(rows
            .into_iter()
            .filter(|(_, doc_id, _)| doc_ids.as_ref().map(|ids| ids.contains(doc_id)).unwrap_or(true))
            .filter(|(_, doc_id, _)| tagged_doc_ids.as_ref().map(|ids| ids.contains(doc_id)).unwrap_or(true))
            .map(|(chunk_id, _, blob)| VectorRecord {
                chunk_id,
                vector: blob_to_vec(&blob),
            })
            .collect())
    }

    async fn upsert_tag(&self, tag: &Tag) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (name, doc_id, source, confidence, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name, doc_id) DO UPDATE SET
                source = excluded.source,
                confidence = excluded.confidence
            "#,
        )
        .bind(&tag.name)
        .bind(&tag.doc_id)
        .bind(tag_source_str(tag.source))
        .bind(tag.confidence)
        .bind(tag.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn remove_tag(&self, doc_id: &str, name: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM tags WHERE doc_id = ? AND name = ?")
            .bind(doc_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_tags(&self, doc_id: &str) -> EngineResult<Vec<Tag>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<f32>, String)>(
            "SELECT name, doc_id, source, confidence, created_at FROM tags WHERE doc_id = ?",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|(name, doc_id, source, confidence, created_at)| Tag {
                name,
                doc_id,
                source: tag_source_from_str(&source),
                confidence,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|d| d.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
            })
            .collect())
    }

    async fn append_audit_log(&self, operation: &str, doc_id: Option<&str>, detail: &str) -> EngineResult<()> {
        sqlx::query("INSERT INTO audit_log (ts, operation, doc_id, detail) VALUES (?, ?, ?, ?)")
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(operation)
            .bind(doc_id)
            .bind(detail)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    doc_id: String,
    source_path: String,
    content_hash: String,
    file_hash: String,
    format: String,
    byte_size: i64,
    indexed_at: String,
    embedder_id: Option<String>,
    chunker_id: String,
    normaliser_id: String,
    extractor_id: String,
    title: Option<String>,
    author: Option<String>,
    publication_date: Option<String>,
    chunk_count: i64,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Document {
            doc_id: r.doc_id,
            source_path: r.source_path,
            content_hash: r.content_hash,
            file_hash: r.file_hash,
            format: r.format,
            byte_size: r.byte_size as u64,
            indexed_at: parse_dt(&r.indexed_at),
            embedder_id: r.embedder_id,
            chunker_id: r.chunker_id,
            normaliser_id: r.normaliser_id,
            extractor_id: r.extractor_id,
            title: r.title,
            author: r.author,
            publication_date: r.publication_date.map(|s| parse_dt(&s)),
            chunk_count: r.chunk_count as usize,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    chunk_id: String,
    doc_id: String,
    ordinal: i64,
    text: String,
    char_start: i64,
    char_end: i64,
    page_spans_json: String,
    section_path_json: String,
    token_count: i64,
    prev_chunk_id: Option<String>,
    next_chunk_id: Option<String>,
    content_hash: String,
    context_prefix: Option<String>,
}

impl From<ChunkRow> for Chunk {
    fn from(r: ChunkRow) -> Self {
        Chunk {
            chunk_id: r.chunk_id,
            doc_id: r.doc_id,
            ordinal: r.ordinal,
            text: r.text,
            char_start: r.char_start as usize,
            char_end: r.char_end as usize,
            page_spans: serde_json::from_str(&r.page_spans_json).unwrap_or_default(),
            section_path: serde_json::from_str(&r.section_path_json).unwrap_or_default(),
            token_count: r.token_count as usize,
            prev_chunk_id: r.prev_chunk_id,
            next_chunk_id: r.next_chunk_id,
            content_hash: r.content_hash,
            context_prefix: r.context_prefix,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkJoinRow {
    chunk_id: String,
    doc_id: String,
    ordinal: i64,
    text: String,
    char_start: i64,
    char_end: i64,
    page_spans_json: String,
    section_path_json: String,
    token_count: i64,
    prev_chunk_id: Option<String>,
    next_chunk_id: Option<String>,
    content_hash: String,
    context_prefix: Option<String>,
    doc_source_path: String,
    doc_indexed_at: String,
}

impl From<ChunkJoinRow> for ChunkRecord {
    fn from(r: ChunkJoinRow) -> Self {
        ChunkRecord {
            chunk: Chunk {
                chunk_id: r.chunk_id,
                doc_id: r.doc_id.clone(),
                ordinal: r.ordinal,
                text: r.text,
                char_start: r.char_start as usize,
                char_end: r.char_end as usize,
                page_spans: serde_json::from_str(&r.page_spans_json).unwrap_or_default(),
                section_path: serde_json::from_str(&r.section_path_json).unwrap_or_default(),
                token_count: r.token_count as usize,
                prev_chunk_id: r.prev_chunk_id,
                next_chunk_id: r.next_chunk_id,
                content_hash: r.content_hash,
                context_prefix: r.context_prefix,
            },
            doc_id: r.doc_id,
            source_path: r.doc_source_path,
            indexed_at: parse_dt(&r.doc_indexed_at),
        }
    }
}

fn parse_dt(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}
