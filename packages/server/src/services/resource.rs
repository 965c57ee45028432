//! Persistence of [`Resource`] records and their reference sets.
//!
//! Every mutation of one resource runs in a single transaction and ends with
//! a cache invalidation. Invalidation failures are logged, never returned.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::storage::{StorageBackend, object_key};
use sea_orm::sea_query::{Alias, Expr, Func, OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::ResourceError;
use super::cache::ResourceCache;
use crate::entity::{resource, resource_ref};

/// Attempts at attaching a reference while the target record keeps
/// disappearing under a concurrent delete.
const ATTACH_ATTEMPTS: usize = 3;

/// A stored binary asset together with the memories embedding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub id: Uuid,
    pub owner_id: i32,
    pub path: String,
    /// Zero while reserved.
    pub size: i64,
    pub refs: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    fn from_parts(model: resource::Model, refs: BTreeSet<Uuid>) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            path: model.path,
            size: model.size,
            refs,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    /// Reserved for an upload that has not been finalized yet.
    pub fn is_reserved(&self) -> bool {
        self.size == 0
    }
}

/// Sort key for [`ResourceStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
}

/// Paging and ordering for [`ResourceStore::list`].
///
/// `page` is 0-based. Records with equal timestamps are ordered by id in the
/// same direction; ids are UUIDv7, so ties fall back to creation order.
#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    pub page: u64,
    pub page_size: u64,
    pub sort: SortKey,
    pub descending: bool,
}

#[derive(Clone)]
pub struct ResourceStore {
    db: DatabaseConnection,
    storage: Arc<dyn StorageBackend>,
    cache: Arc<dyn ResourceCache>,
}

impl ResourceStore {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageBackend>,
        cache: Arc<dyn ResourceCache>,
    ) -> Self {
        Self { db, storage, cache }
    }

    /// Reserve `path` for an upload.
    ///
    /// Returns the existing id when the path is already reserved (size 0) and
    /// fails with `Conflict` when it holds a finalized upload.
    #[instrument(skip(self))]
    pub async fn reserve(&self, owner_id: i32, path: &str) -> Result<Uuid, ResourceError> {
        let (model, created) = self.find_or_insert(owner_id, path).await?;
        if !created && model.size > 0 {
            return Err(ResourceError::Conflict(path.to_string()));
        }
        Ok(model.id)
    }

    /// Record the size of a completed upload.
    #[instrument(skip(self))]
    pub async fn finalize_size(
        &self,
        owner_id: i32,
        path: &str,
        size: u64,
    ) -> Result<Uuid, ResourceError> {
        let stored_size = i64::try_from(size).map_err(|_| ResourceError::InvalidSize(size))?;
        let model = find_by_path(&self.db, owner_id, path)
            .await?
            .ok_or(ResourceError::NotFound)?;
        let id = model.id;

        let mut active: resource::ActiveModel = model.into();
        active.size = Set(stored_size);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        info!(%id, size, "Finalized resource");
        self.invalidate(id).await;
        Ok(id)
    }

    /// Add `memory_id` to the references of `path`, creating a reserved
    /// record first if none exists.
    #[instrument(skip(self))]
    pub async fn upsert_reference(
        &self,
        owner_id: i32,
        path: &str,
        memory_id: Uuid,
    ) -> Result<Uuid, ResourceError> {
        for _ in 0..ATTACH_ATTEMPTS {
            let (model, _) = self.find_or_insert(owner_id, path).await?;
            if self.attach(model.id, memory_id).await? {
                return Ok(model.id);
            }
            debug!(id = %model.id, path, "Resource deleted while attaching reference, retrying");
        }
        Err(DbErr::Custom(format!(
            "resource '{path}' kept disappearing while attaching a reference"
        ))
        .into())
    }

    /// Link `memory_id` to the record `id`. Returns `false` without writing
    /// anything when the record no longer exists.
    async fn attach(&self, id: Uuid, memory_id: Uuid) -> Result<bool, ResourceError> {
        let now = Utc::now();

        let txn = self.db.begin().await?;
        // Touch first so the row is locked before the link is written.
        if touch(&txn, id, now).await? == 0 {
            txn.rollback().await?;
            return Ok(false);
        }
        let link = resource_ref::ActiveModel {
            resource_id: Set(id),
            memory_id: Set(memory_id),
            created_at: Set(now),
        };
        let result = resource_ref::Entity::insert(link)
            .on_conflict(
                OnConflict::columns([
                    resource_ref::Column::ResourceId,
                    resource_ref::Column::MemoryId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await;
        match result {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }
        txn.commit().await?;

        debug!(%id, %memory_id, "Attached reference");
        self.invalidate(id).await;
        Ok(true)
    }

    /// Remove `memory_id` from the references of `path`.
    ///
    /// A missing record or an absent reference is already consistent.
    #[instrument(skip(self))]
    pub async fn remove_reference(
        &self,
        owner_id: i32,
        path: &str,
        memory_id: Uuid,
    ) -> Result<(), ResourceError> {
        let Some(model) = find_by_path(&self.db, owner_id, path).await? else {
            return Ok(());
        };
        let id = model.id;

        let txn = self.db.begin().await?;
        let removed = resource_ref::Entity::delete_many()
            .filter(resource_ref::Column::ResourceId.eq(id))
            .filter(resource_ref::Column::MemoryId.eq(memory_id))
            .exec(&txn)
            .await?
            .rows_affected;
        if removed > 0 {
            touch(&txn, id, Utc::now()).await?;
        }
        txn.commit().await?;

        if removed > 0 {
            debug!(%id, %memory_id, "Detached reference");
            self.invalidate(id).await;
        }
        Ok(())
    }

    /// Fetch a resource owned by `owner_id`.
    pub async fn get(&self, owner_id: i32, id: Uuid) -> Result<Resource, ResourceError> {
        if let Some(cached) = self.cache.get(id).await {
            return visible_to(cached, owner_id);
        }
        let generation = self.cache.generation().await;

        let model = resource::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ResourceError::NotFound)?;
        if model.owner_id != owner_id {
            return Err(ResourceError::NotFound);
        }

        let resource = self.with_refs(model).await?;
        self.cache.put(resource.clone(), generation).await;
        Ok(resource)
    }

    /// Fetch the resource stored at `path` for `owner_id`.
    pub async fn get_by_path(&self, owner_id: i32, path: &str) -> Result<Resource, ResourceError> {
        let model = find_by_path(&self.db, owner_id, path)
            .await?
            .ok_or(ResourceError::NotFound)?;
        self.with_refs(model).await
    }

    /// One page of an owner's resources.
    pub async fn list(
        &self,
        owner_id: i32,
        query: ListQuery,
    ) -> Result<Vec<Resource>, ResourceError> {
        let order = if query.descending {
            Order::Desc
        } else {
            Order::Asc
        };
        let sort_column = match query.sort {
            SortKey::CreatedAt => resource::Column::CreatedAt,
            SortKey::UpdatedAt => resource::Column::UpdatedAt,
        };

        let models = resource::Entity::find()
            .filter(resource::Column::OwnerId.eq(owner_id))
            .order_by(sort_column, order.clone())
            .order_by(resource::Column::Id, order)
            .offset(Some(query.page.saturating_mul(query.page_size)))
            .limit(Some(query.page_size))
            .all(&self.db)
            .await?;

        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut refs = load_refs(&self.db, &ids).await?;

        Ok(models
            .into_iter()
            .map(|model| {
                let set = refs.remove(&model.id).unwrap_or_default();
                Resource::from_parts(model, set)
            })
            .collect())
    }

    /// Number of resources an owner has.
    pub async fn count(&self, owner_id: i32) -> Result<u64, ResourceError> {
        Ok(resource::Entity::find()
            .filter(resource::Column::OwnerId.eq(owner_id))
            .count(&self.db)
            .await?)
    }

    /// Bytes used by an owner; reserved records count as zero.
    pub async fn total_used_bytes(&self, owner_id: i32) -> Result<i64, ResourceError> {
        let total = Func::coalesce([resource::Column::Size.sum(), Expr::value(0i64)]);
        let used: Option<i64> = resource::Entity::find()
            .select_only()
            .column_as(
                Expr::expr(Func::cast_as(total, Alias::new("BIGINT"))),
                "used",
            )
            .filter(resource::Column::OwnerId.eq(owner_id))
            .into_tuple()
            .one(&self.db)
            .await?;
        Ok(used.unwrap_or(0))
    }

    /// Delete an unreferenced resource and its stored bytes.
    ///
    /// The record is kept when the backend reports that it did not delete
    /// the object, and when a reference was attached while the object was
    /// being deleted.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner_id: i32, id: Uuid) -> Result<(), ResourceError> {
        let model = resource::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ResourceError::NotFound)?;
        if model.owner_id != owner_id {
            return Err(ResourceError::PermissionDenied);
        }

        let references = resource_ref::Entity::find()
            .filter(resource_ref::Column::ResourceId.eq(id))
            .count(&self.db)
            .await?;
        if references > 0 {
            return Err(ResourceError::HasReference(references));
        }

        let key = object_key(owner_id, &model.path);
        if !self.storage.delete_object(&key).await? {
            warn!(%id, key, "Storage backend failed to delete object");
            return Err(ResourceError::DeleteFailed);
        }

        let txn = self.db.begin().await?;
        let referenced = Query::select()
            .column(resource_ref::Column::ResourceId)
            .from(resource_ref::Entity)
            .and_where(resource_ref::Column::ResourceId.eq(id))
            .to_owned();
        let removed = resource::Entity::delete_many()
            .filter(resource::Column::Id.eq(id))
            .filter(resource::Column::OwnerId.eq(owner_id))
            .filter(resource::Column::Id.not_in_subquery(referenced))
            .exec(&txn)
            .await?
            .rows_affected;
        if removed == 0 {
            let references = resource_ref::Entity::find()
                .filter(resource_ref::Column::ResourceId.eq(id))
                .count(&txn)
                .await?;
            txn.rollback().await?;
            if references == 0 {
                return Err(ResourceError::NotFound);
            }
            warn!(%id, key, references, "Resource was referenced while its object was deleted");
            self.invalidate(id).await;
            return Err(ResourceError::HasReference(references));
        }
        txn.commit().await?;

        info!(%id, key, "Deleted resource");
        self.invalidate(id).await;
        Ok(())
    }

    /// Find the record for `(owner_id, path)` or insert a reserved one.
    ///
    /// The flag is `true` when this call created the record.
    async fn find_or_insert(
        &self,
        owner_id: i32,
        path: &str,
    ) -> Result<(resource::Model, bool), ResourceError> {
        if let Some(existing) = find_by_path(&self.db, owner_id, path).await? {
            return Ok((existing, false));
        }
        self.insert_reserved(owner_id, path).await
    }

    /// Insert a reserved record. A concurrent insert that won the unique
    /// index is read back instead.
    async fn insert_reserved(
        &self,
        owner_id: i32,
        path: &str,
    ) -> Result<(resource::Model, bool), ResourceError> {
        let now = Utc::now();
        let model = resource::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_id: Set(owner_id),
            path: Set(path.to_string()),
            size: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(&self.db).await {
            Ok(inserted) => {
                info!(id = %inserted.id, owner_id, path, "Reserved resource");
                Ok((inserted, true))
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                let existing = find_by_path(&self.db, owner_id, path)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(
                            "UniqueConstraintViolation but existing resource not found".into(),
                        )
                    })?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn with_refs(&self, model: resource::Model) -> Result<Resource, ResourceError> {
        let mut refs = load_refs(&self.db, &[model.id]).await?;
        let set = refs.remove(&model.id).unwrap_or_default();
        Ok(Resource::from_parts(model, set))
    }

    async fn invalidate(&self, id: Uuid) {
        if let Err(e) = self.cache.invalidate(id).await {
            warn!(%id, "Failed to invalidate cached resource: {e}");
        }
    }
}

fn visible_to(resource: Resource, owner_id: i32) -> Result<Resource, ResourceError> {
    if resource.owner_id == owner_id {
        Ok(resource)
    } else {
        Err(ResourceError::NotFound)
    }
}

async fn find_by_path<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    path: &str,
) -> Result<Option<resource::Model>, DbErr> {
    resource::Entity::find()
        .filter(resource::Column::OwnerId.eq(owner_id))
        .filter(resource::Column::Path.eq(path))
        .one(conn)
        .await
}

async fn load_refs<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, BTreeSet<Uuid>>, DbErr> {
    let mut refs: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    if ids.is_empty() {
        return Ok(refs);
    }

    let links = resource_ref::Entity::find()
        .filter(resource_ref::Column::ResourceId.is_in(ids.iter().copied()))
        .all(conn)
        .await?;
    for link in links {
        refs.entry(link.resource_id)
            .or_default()
            .insert(link.memory_id);
    }
    Ok(refs)
}

/// Bump `updated_at`; returns the number of rows touched.
async fn touch<C: ConnectionTrait>(conn: &C, id: Uuid, now: DateTime<Utc>) -> Result<u64, DbErr> {
    Ok(resource::Entity::update_many()
        .col_expr(resource::Column::UpdatedAt, Expr::value(now))
        .filter(resource::Column::Id.eq(id))
        .exec(conn)
        .await?
        .rows_affected)
}
