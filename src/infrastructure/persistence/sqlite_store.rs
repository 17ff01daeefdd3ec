//! SQLite content store
//!
//! Documents and collection entries are stored as JSON payload text, with
//! the columns lookups need (`name`, `folder_id`, `import_id`) mirrored
//! beside them. Files live in a blob table keyed by path.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::application::ports::outbound::{BrowseOptions, ContentStorePort, StorageArea};
use crate::domain::entities::{
    CollectionInfo, Document, DocumentSummary, Folder, NewFolder, StoreEnvironment, WORLD_PACKAGE,
};
use crate::domain::value_objects::{random_document_id, DocumentKind, PartialUpdate};
use crate::infrastructure::persistence::store_support::{unique_id, world_collection_id, BrowseFilter};

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        name TEXT NOT NULL,
        folder_id TEXT,
        import_id TEXT,
        payload TEXT NOT NULL,
        PRIMARY KEY (kind, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        parent_id TEXT,
        import_id TEXT,
        color TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        bytes BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS directories (
        path TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL,
        kind TEXT NOT NULL,
        package TEXT NOT NULL,
        locked INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collection_entries (
        pack_id TEXT NOT NULL,
        id TEXT NOT NULL,
        name TEXT NOT NULL,
        import_id TEXT,
        payload TEXT NOT NULL,
        PRIMARY KEY (pack_id, id)
    )
    "#,
];

type FolderRow = (String, String, String, Option<String>, Option<String>, Option<String>);
type CollectionRow = (String, String, String, String, bool);

pub struct SqliteContentStore {
    pool: SqlitePool,
    environment: StoreEnvironment,
}

impl SqliteContentStore {
    pub async fn new(pool: SqlitePool, environment: StoreEnvironment) -> Result<Self, sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool, environment })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (kind, id, name, folder_id, import_id, payload) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(document.kind.document_name())
        .bind(&document.id)
        .bind(&document.name)
        .bind(&document.folder_id)
        .bind(document.import_id())
        .bind(document.payload.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store {} {}", document.kind, document.id))?;
        Ok(())
    }

    async fn save_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET name = ?, folder_id = ?, import_id = ?, payload = ? WHERE kind = ? AND id = ?",
        )
        .bind(&document.name)
        .bind(&document.folder_id)
        .bind(document.import_id())
        .bind(document.payload.to_string())
        .bind(document.kind.document_name())
        .bind(&document.id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update {} {}", document.kind, document.id))?;
        Ok(())
    }

    async fn require_document(&self, kind: DocumentKind, id: &str) -> Result<Document> {
        self.get(kind, id)
            .await?
            .ok_or_else(|| anyhow!("{} not found: {}", kind, id))
    }

    async fn require_collection(&self, pack_id: &str) -> Result<CollectionInfo> {
        self.get_collection(pack_id)
            .await?
            .ok_or_else(|| anyhow!("Collection not found: {}", pack_id))
    }

    async fn save_entry(&self, pack_id: &str, entry: &Document) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO collection_entries (pack_id, id, name, import_id, payload) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(pack_id)
        .bind(&entry.id)
        .bind(&entry.name)
        .bind(entry.import_id())
        .bind(entry.payload.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store entry {} in {}", entry.id, pack_id))?;
        Ok(())
    }
}

fn parse_kind(kind: &str) -> Result<DocumentKind> {
    kind.parse().map_err(|e| anyhow!("Corrupt kind column: {}", e))
}

fn document_from_row(kind: DocumentKind, id: String, payload: &str) -> Result<Document> {
    let payload: Value = serde_json::from_str(payload)
        .with_context(|| format!("Corrupt payload for {} {}", kind, id))?;
    Ok(Document::new(kind, id, payload))
}

fn folder_from_row((id, name, kind, parent_id, import_id, color): FolderRow) -> Result<Folder> {
    Ok(Folder {
        id,
        name,
        kind: parse_kind(&kind)?,
        parent_id,
        import_id,
        color,
    })
}

fn collection_from_row((id, label, kind, package, locked): CollectionRow) -> Result<CollectionInfo> {
    Ok(CollectionInfo {
        id,
        label,
        kind: parse_kind(&kind)?,
        package,
        locked,
    })
}

#[async_trait]
impl ContentStorePort for SqliteContentStore {
    fn environment(&self) -> StoreEnvironment {
        self.environment.clone()
    }

    async fn list(&self, kind: DocumentKind) -> Result<Vec<DocumentSummary>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM documents WHERE kind = ? ORDER BY rowid")
                .bind(kind.document_name())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| DocumentSummary { id, name })
            .collect())
    }

    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM documents WHERE kind = ? AND id = ?")
                .bind(kind.document_name())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(payload,)| document_from_row(kind, id.to_string(), &payload))
            .transpose()
    }

    async fn find_by_import_id(&self, kind: DocumentKind, import_id: &str) -> Result<Option<Document>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT id, payload FROM documents WHERE kind = ? AND import_id = ? ORDER BY rowid LIMIT 1",
        )
        .bind(kind.document_name())
        .bind(import_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(id, payload)| document_from_row(kind, id, &payload))
            .transpose()
    }

    async fn create(&self, kind: DocumentKind, payload: Value) -> Result<Document> {
        let document = Document::new(kind, random_document_id(), payload);
        self.insert_document(&document).await?;
        Ok(document)
    }

    async fn update(&self, kind: DocumentKind, id: &str, changes: &PartialUpdate) -> Result<Document> {
        let mut document = self.require_document(kind, id).await?;
        changes.apply_to(&mut document.payload);
        document.refresh();
        self.save_document(&document).await?;
        Ok(document)
    }

    async fn update_nested_member(
        &self,
        parent_kind: DocumentKind,
        parent_id: &str,
        collection: &str,
        member_id: &str,
        changes: &PartialUpdate,
    ) -> Result<()> {
        let mut document = self.require_document(parent_kind, parent_id).await?;
        let member = document
            .payload
            .get_mut(collection)
            .and_then(Value::as_array_mut)
            .and_then(|members| {
                members
                    .iter_mut()
                    .find(|m| m.get("_id").and_then(Value::as_str) == Some(member_id))
            });
        let Some(member) = member else {
            bail!("{} {} has no {} member {}", parent_kind, parent_id, collection, member_id);
        };
        changes.apply_to(member);
        self.save_document(&document).await
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let rows: Vec<FolderRow> = sqlx::query_as(
            "SELECT id, name, kind, parent_id, import_id, color FROM folders ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(folder_from_row).collect()
    }

    async fn create_folder(&self, folder: NewFolder) -> Result<Folder> {
        if let Some(parent) = &folder.parent_id {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM folders WHERE id = ?")
                .bind(parent)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                bail!("Parent folder not found: {}", parent);
            }
        }

        let folder = Folder {
            id: random_document_id(),
            name: folder.name,
            kind: folder.kind,
            parent_id: folder.parent_id,
            import_id: folder.import_id,
            color: folder.color,
        };
        sqlx::query(
            "INSERT INTO folders (id, name, kind, parent_id, import_id, color) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&folder.id)
        .bind(&folder.name)
        .bind(folder.kind.document_name())
        .bind(&folder.parent_id)
        .bind(&folder.import_id)
        .bind(&folder.color)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create folder {}", folder.name))?;
        Ok(folder)
    }

    async fn browse(&self, area: StorageArea, path: &str, options: &BrowseOptions) -> Result<Vec<String>> {
        if area == StorageArea::Core {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        let filter = BrowseFilter::new(path, options);
        Ok(rows
            .into_iter()
            .map(|(file,)| file)
            .filter(|file| filter.matches(file))
            .collect())
    }

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT bytes FROM files WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((bytes,)) => Ok(bytes),
            None => bail!("File not found: {}", path),
        }
    }

    async fn upload_binary(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO files (path, bytes) VALUES (?, ?)")
            .bind(path)
            .bind(bytes)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to upload {}", path))?;
        Ok(())
    }

    async fn ensure_directory(&self, path: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO directories (path) VALUES (?)")
            .bind(path.trim_end_matches('/'))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows: Vec<CollectionRow> = sqlx::query_as(
            "SELECT id, label, kind, package, locked FROM collections ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(collection_from_row).collect()
    }

    async fn get_collection(&self, pack_id: &str) -> Result<Option<CollectionInfo>> {
        let row: Option<CollectionRow> = sqlx::query_as(
            "SELECT id, label, kind, package, locked FROM collections WHERE id = ?",
        )
        .bind(pack_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(collection_from_row).transpose()
    }

    async fn find_collection_by_label(&self, label: &str) -> Result<Option<CollectionInfo>> {
        let row: Option<CollectionRow> = sqlx::query_as(
            "SELECT id, label, kind, package, locked FROM collections WHERE label = ? ORDER BY rowid LIMIT 1",
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;
        row.map(collection_from_row).transpose()
    }

    async fn create_collection(&self, kind: DocumentKind, label: &str) -> Result<CollectionInfo> {
        let taken: Vec<String> = self
            .list_collections()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let info = CollectionInfo {
            id: unique_id(world_collection_id(label), |candidate| {
                taken.iter().any(|id| id == candidate)
            }),
            label: label.to_string(),
            kind,
            package: WORLD_PACKAGE.to_string(),
            locked: false,
        };
        sqlx::query("INSERT INTO collections (id, label, kind, package, locked) VALUES (?, ?, ?, ?, ?)")
            .bind(&info.id)
            .bind(&info.label)
            .bind(info.kind.document_name())
            .bind(&info.package)
            .bind(info.locked)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create collection {}", label))?;
        Ok(info)
    }

    async fn collection_index(&self, pack_id: &str) -> Result<Vec<DocumentSummary>> {
        self.require_collection(pack_id).await?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, name FROM collection_entries WHERE pack_id = ? ORDER BY rowid",
        )
        .bind(pack_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| DocumentSummary { id, name })
            .collect())
    }

    async fn collection_content(&self, pack_id: &str) -> Result<Vec<Document>> {
        let info = self.require_collection(pack_id).await?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, payload FROM collection_entries WHERE pack_id = ? ORDER BY rowid",
        )
        .bind(pack_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, payload)| document_from_row(info.kind, id, &payload))
            .collect()
    }

    async fn collection_get(&self, pack_id: &str, entry_id: &str) -> Result<Option<Document>> {
        let info = self.require_collection(pack_id).await?;
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM collection_entries WHERE pack_id = ? AND id = ?",
        )
        .bind(pack_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(payload,)| document_from_row(info.kind, entry_id.to_string(), &payload))
            .transpose()
    }

    async fn collection_import(&self, pack_id: &str, payload: Value) -> Result<Document> {
        let info = self.require_collection(pack_id).await?;
        if info.locked {
            bail!("Collection {} is locked", pack_id);
        }
        let entry = Document::new(info.kind, random_document_id(), payload);
        self.save_entry(pack_id, &entry).await?;
        Ok(entry)
    }

    async fn collection_update(&self, pack_id: &str, entry_id: &str, changes: &PartialUpdate) -> Result<Document> {
        let mut entry = self
            .collection_get(pack_id, entry_id)
            .await?
            .ok_or_else(|| anyhow!("Entry {} not found in {}", entry_id, pack_id))?;
        changes.apply_to(&mut entry.payload);
        entry.refresh();
        self.save_entry(pack_id, &entry).await?;
        Ok(entry)
    }
}
