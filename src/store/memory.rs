// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use bytes::BytesMut;

use super::ListPage;
use super::ListPageRequest;
use super::ObjectStore;
use super::COMPOSE_SOURCE_LIMIT;
use crate::Error;
use crate::ErrorKind;
use crate::ObjectMetadata;
use crate::Result;
use crate::StorageClass;

#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    storage_class: StorageClass,
    generation: i64,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, MemoryObject>,
    next_generation: i64,
}

/// In-memory object store. (BTreeMap based)
///
/// A complete [`ObjectStore`] over a sorted map, with the compose limits of
/// a real store. Cloning shares the underlying bucket, so a clone can be
/// handed to worker threads or used to observe mutations from a test.
///
/// # Examples
///
/// ```
/// use datarush::store::{MemoryStore, ObjectStore};
///
/// let store = MemoryStore::new();
/// store.insert("data/shard-0000", vec![1u8; 128]);
/// let bytes = store.download("data/shard-0000").unwrap();
/// assert_eq!(bytes.len(), 128);
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with the default storage class.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.insert_with_class(name, data, StorageClass::Standard)
    }

    /// Insert an object under the given storage class.
    pub fn insert_with_class(
        &self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        storage_class: StorageClass,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_generation += 1;
        let object = MemoryObject {
            data: data.into(),
            storage_class,
            generation: inner.next_generation,
        };
        inner.objects.insert(name.into(), object);
    }

    /// Whether an object with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().objects.contains_key(name)
    }

    /// The number of objects currently held.
    pub fn object_count(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    fn metadata(name: &str, object: &MemoryObject) -> ObjectMetadata {
        ObjectMetadata::new(name, object.data.len() as u64)
            .with_storage_class(object.storage_class.clone())
            .with_generation(object.generation)
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(&self, req: &ListPageRequest) -> Result<ListPage> {
        let inner = self.inner.lock().unwrap();

        let start = format!("{}{}", req.prefix, req.start_offset);
        let end = req
            .end_offset
            .as_ref()
            .map(|e| format!("{}{}", req.prefix, e));

        let mut objects = Vec::new();
        let mut truncated = false;
        for (name, object) in inner.objects.range(start..) {
            if !name.starts_with(&req.prefix) {
                break;
            }
            if let Some(end) = &end {
                if name >= end {
                    break;
                }
            }
            if objects.len() == req.page_size {
                truncated = true;
                break;
            }
            objects.push(Self::metadata(name, object));
        }

        Ok(ListPage { objects, truncated })
    }

    fn compose(&self, destination: &str, sources: &[&str]) -> Result<ObjectMetadata> {
        if sources.is_empty() {
            return Err(Error::new(ErrorKind::Compose, "no source objects given")
                .with_operation("MemoryStore::compose"));
        }
        if sources.len() > COMPOSE_SOURCE_LIMIT {
            return Err(
                Error::new(ErrorKind::Compose, "too many source objects")
                    .with_operation("MemoryStore::compose")
                    .with_context("sources", sources.len())
                    .with_context("limit", COMPOSE_SOURCE_LIMIT),
            );
        }

        let mut inner = self.inner.lock().unwrap();
        let mut data = BytesMut::new();
        for source in sources {
            let object = inner.objects.get(*source).ok_or_else(|| {
                Error::new(ErrorKind::Compose, "source object not found")
                    .with_operation("MemoryStore::compose")
                    .with_context("source", source)
            })?;
            data.extend_from_slice(&object.data);
        }

        inner.next_generation += 1;
        let object = MemoryObject {
            data: data.freeze(),
            storage_class: StorageClass::Standard,
            generation: inner.next_generation,
        };
        let meta = Self::metadata(destination, &object);
        inner.objects.insert(destination.to_string(), object);
        Ok(meta)
    }

    fn download(&self, name: &str) -> Result<Bytes> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(name)
            .map(|o| o.data.clone())
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound, "object not found")
                    .with_operation("MemoryStore::download")
                    .with_context("name", name)
            })
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.objects.remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::new(ErrorKind::NotFound, "object not found")
                .with_operation("MemoryStore::delete")
                .with_context("name", name)),
        }
    }
}
