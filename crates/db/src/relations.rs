// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::blob::{BlobError, DurableBlob};
use ahash::AHasher;
use arc_swap::ArcSwap;
use chatdb_common::{Relation, RelationError, RelationNumber};
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationStoreError {
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("Encoding failure for relation catalog: {0}")]
    EncodingFailure(String),
}

type Catalog = HashMap<RelationNumber, Relation, BuildHasherDefault<AHasher>>;

/// The relation catalog, replicated from a durable blob on startup. Reads
/// are lock-free off the current snapshot; adds persist the whole catalog
/// before publishing the new snapshot, so a catalog a reader can see is
/// always one a restart would restore.
pub struct RelationStore<B: DurableBlob> {
    blob: B,
    catalog: ArcSwap<Catalog>,
    write_lock: Mutex<()>,
}

impl<B: DurableBlob> RelationStore<B> {
    pub async fn open(blob: B) -> Result<Self, RelationStoreError> {
        let catalog = match blob.get().await? {
            Some(bytes) => {
                let relations: Vec<Relation> = serde_json::from_slice(&bytes)
                    .map_err(|e| RelationStoreError::EncodingFailure(e.to_string()))?;
                relations
                    .into_iter()
                    .map(|relation| (relation.number(), relation))
                    .collect()
            }
            None => Catalog::default(),
        };
        Ok(Self {
            blob,
            catalog: ArcSwap::new(Arc::new(catalog)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn relation(&self, number: RelationNumber) -> Result<Relation, RelationError> {
        self.catalog
            .load()
            .get(&number)
            .cloned()
            .ok_or(RelationError::NoRelation(number))
    }

    pub async fn add(&self, relation: Relation) -> Result<(), RelationStoreError> {
        let _guard = self.write_lock.lock().await;

        let current = self.catalog.load_full();
        if current.contains_key(&relation.number()) {
            return Err(RelationError::NotUniqueRelationNumber(relation.number()).into());
        }

        let mut next = (*current).clone();
        next.insert(relation.number(), relation);

        let mut relations: Vec<&Relation> = next.values().collect();
        relations.sort_by_key(|relation| relation.number());
        let encoded = serde_json::to_vec(&relations)
            .map_err(|e| RelationStoreError::EncodingFailure(e.to_string()))?;
        self.blob.set(&encoded).await?;

        self.catalog.store(Arc::new(next));
        Ok(())
    }
}
