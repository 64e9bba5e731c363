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

//! The object-store collaborator seam.
//!
//! Everything this crate does reduces to four primitives against one bucket:
//! range-bounded paginated listing, server-side compose, whole-object
//! download, and delete. Implementations own bucket, project, credentials,
//! transport and SDK-level retry; the core never sees any of that.
//!
//! [`MemoryStore`] is a complete in-memory implementation used by this
//! crate's tests and doctests.

use bytes::Bytes;

use crate::ObjectMetadata;
use crate::Result;

mod memory;
pub use memory::MemoryStore;

/// The maximum number of source objects one compose call may reference.
///
/// This is the GCS limit; the compose planner never plans a group larger
/// than this, and [`MemoryStore`] enforces it the way the real store would.
pub const COMPOSE_SOURCE_LIMIT: usize = 32;

/// One range-bounded page request.
///
/// Offsets are relative to `prefix`: the store must return objects whose
/// names lie in `[prefix + start_offset, prefix + end_offset)`, in
/// lexicographic name order, at most `page_size` of them. An absent
/// `end_offset` means "to the end of the prefix". Offset strings may contain
/// `NUL` bytes; they come from range arithmetic, not from object names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPageRequest {
    /// The listing prefix. Every returned name starts with it.
    pub prefix: String,
    /// Inclusive lower bound, relative to `prefix`.
    pub start_offset: String,
    /// Exclusive upper bound, relative to `prefix`; `None` is unbounded.
    pub end_offset: Option<String>,
    /// Maximum number of objects to return.
    pub page_size: usize,
}

/// One page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// The objects in this page, in name order.
    pub objects: Vec<ObjectMetadata>,
    /// Whether more objects remain in the requested interval. `false` means
    /// the interval is exhausted; the lister discards the range.
    pub truncated: bool,
}

/// A blocking client for one object-storage bucket.
///
/// Methods are called concurrently from many worker threads; implementations
/// must be internally synchronized. Transient-failure retry and backoff
/// belong to the implementation (the SDK layer); the core only applies a
/// bounded page retry on errors marked temporary and treats everything else
/// as terminal for the affected range or group.
pub trait ObjectStore: Send + Sync {
    /// List one page of objects in the requested interval.
    fn list_page(&self, req: &ListPageRequest) -> Result<ListPage>;

    /// Server-side concatenate `sources`, in order, into a new object named
    /// `destination`, without moving bytes through the client.
    ///
    /// Fails if the source count or total size exceeds the store's compose
    /// limits; the planner keeps groups inside those limits.
    fn compose(&self, destination: &str, sources: &[&str]) -> Result<ObjectMetadata>;

    /// Download an object's full contents.
    fn download(&self, name: &str) -> Result<Bytes>;

    /// Delete an object.
    fn delete(&self, name: &str) -> Result<()>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn list_page(&self, req: &ListPageRequest) -> Result<ListPage> {
        (**self).list_page(req)
    }

    fn compose(&self, destination: &str, sources: &[&str]) -> Result<ObjectMetadata> {
        (**self).compose(destination, sources)
    }

    fn download(&self, name: &str) -> Result<Bytes> {
        (**self).download(name)
    }

    fn delete(&self, name: &str) -> Result<()> {
        (**self).delete(name)
    }
}
