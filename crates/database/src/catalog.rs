//! Catalog items and their generation state.

use catalog_core::{
    async_trait, CatalogItem, CatalogStore, Field, GeneratedContent, ItemGenerationState, ItemId,
    ItemStateUpdate, StoreResult,
};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{CatalogEntry, ItemRow, StateRow};
use crate::Database;

const ITEM_SELECT: &str = r#"
    SELECT c.id, c.title, c.brand, c.category, c.subcategory, c.attributes,
           c.short_description, c.long_description, c.meta_description,
           s.locked, s.tier, s.brand AS state_brand, s.last_model, s.generating,
           s.last_generated_at, s.ai_status, s.last_action, s.last_similarity
    FROM catalog_items c
    LEFT JOIN item_state s ON s.item_id = c.id
"#;

/// Insert or replace a catalog entry. Generation state is left alone.
pub async fn upsert_item(pool: &SqlitePool, entry: &CatalogEntry) -> Result<()> {
    import_items(pool, std::slice::from_ref(entry)).await?;
    Ok(())
}

/// Upsert entries in one transaction. Returns the number written.
pub async fn import_items(pool: &SqlitePool, entries: &[CatalogEntry]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        let attributes = serde_json::to_string(&entry.product.attributes)?;
        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, title, brand, category, subcategory, attributes,
                short_description, long_description, meta_description
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                brand = excluded.brand,
                category = excluded.category,
                subcategory = excluded.subcategory,
                attributes = excluded.attributes,
                short_description = excluded.short_description,
                long_description = excluded.long_description,
                meta_description = excluded.meta_description,
                updated_at = datetime('now')
            "#,
        )
        .bind(entry.id)
        .bind(&entry.product.title)
        .bind(&entry.product.brand)
        .bind(&entry.product.category)
        .bind(&entry.product.subcategory)
        .bind(attributes)
        .bind(&entry.content.short_description)
        .bind(&entry.content.long_description)
        .bind(&entry.content.meta_description)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::debug!(count = entries.len(), "catalog items written");
    Ok(entries.len())
}

pub async fn get_item(pool: &SqlitePool, id: ItemId) -> Result<Option<CatalogItem>> {
    let query = format!("{} WHERE c.id = ?", ITEM_SELECT);
    sqlx::query_as::<_, ItemRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(ItemRow::into_item)
        .transpose()
}

/// Items ordered by id, starting after `after_id`.
pub async fn list_items(pool: &SqlitePool, after_id: ItemId, limit: i64) -> Result<Vec<CatalogItem>> {
    let query = format!("{} WHERE c.id > ? ORDER BY c.id LIMIT ?", ITEM_SELECT);
    sqlx::query_as::<_, ItemRow>(&query)
        .bind(after_id)
        .bind(limit)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(ItemRow::into_item)
        .collect()
}

/// Write the present fields in a single statement.
pub async fn set_item_content(
    pool: &SqlitePool,
    id: ItemId,
    content: &GeneratedContent,
) -> Result<()> {
    // Blank fields leave the stored text alone.
    let present = |field: Field| content.get(field).filter(|text| !text.trim().is_empty());

    let result = sqlx::query(
        r#"
        UPDATE catalog_items
        SET short_description = COALESCE(?, short_description),
            long_description = COALESCE(?, long_description),
            meta_description = COALESCE(?, meta_description),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(present(Field::Short))
    .bind(present(Field::Long))
    .bind(present(Field::Meta))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Item",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub async fn item_state(pool: &SqlitePool, id: ItemId) -> Result<ItemGenerationState> {
    let row = sqlx::query_as::<_, StateRow>(
        r#"
        SELECT locked, tier, brand AS state_brand, last_model, generating,
               last_generated_at, ai_status, last_action, last_similarity
        FROM item_state
        WHERE item_id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.unwrap_or_default().into_state()
}

/// Apply the fields set in `update`, creating the state row if needed.
pub async fn update_item_state(pool: &SqlitePool, id: ItemId, update: &ItemStateUpdate) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO item_state (item_id, locked, tier, brand, last_model,
                                last_generated_at, ai_status, last_action, last_similarity)
        VALUES (?, COALESCE(?, 0), ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(item_id) DO UPDATE SET
            locked = COALESCE(?, locked),
            tier = COALESCE(excluded.tier, tier),
            brand = COALESCE(excluded.brand, brand),
            last_model = COALESCE(excluded.last_model, last_model),
            last_generated_at = COALESCE(excluded.last_generated_at, last_generated_at),
            ai_status = COALESCE(excluded.ai_status, ai_status),
            last_action = COALESCE(excluded.last_action, last_action),
            last_similarity = COALESCE(excluded.last_similarity, last_similarity)
        "#,
    )
    .bind(id)
    .bind(update.locked)
    .bind(update.tier.map(|tier| tier.as_str()))
    .bind(&update.brand)
    .bind(&update.last_model)
    .bind(&update.last_generated_at)
    .bind(&update.ai_status)
    .bind(update.last_action.map(|action| action.as_str()))
    .bind(update.last_similarity)
    .bind(update.locked)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set the processing flag unless it is already set.
pub async fn try_claim(pool: &SqlitePool, id: ItemId) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO item_state (item_id, generating)
        VALUES (?, 1)
        ON CONFLICT(item_id) DO UPDATE SET generating = 1
        WHERE item_state.generating = 0
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn release_claim(pool: &SqlitePool, id: ItemId) -> Result<()> {
    sqlx::query("UPDATE item_state SET generating = 0 WHERE item_id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[async_trait]
impl CatalogStore for Database {
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<CatalogItem>> {
        Ok(get_item(self.pool(), id).await?)
    }

    async fn set_item_content(&self, id: ItemId, content: &GeneratedContent) -> StoreResult<()> {
        Ok(set_item_content(self.pool(), id, content).await?)
    }

    async fn item_state(&self, id: ItemId) -> StoreResult<ItemGenerationState> {
        Ok(item_state(self.pool(), id).await?)
    }

    async fn update_item_state(&self, id: ItemId, update: ItemStateUpdate) -> StoreResult<()> {
        Ok(update_item_state(self.pool(), id, &update).await?)
    }

    async fn try_claim(&self, id: ItemId) -> StoreResult<bool> {
        Ok(try_claim(self.pool(), id).await?)
    }

    async fn release_claim(&self, id: ItemId) -> StoreResult<()> {
        Ok(release_claim(self.pool(), id).await?)
    }
}
