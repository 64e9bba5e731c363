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

//! Workstealing parallel listing.
//!
//! A single paginated listing call walks the namespace at one page per round
//! trip; over tens of millions of objects that is hours. This module
//! partitions the key space across `max_parallelism` OS threads, each
//! listing its own range in page-sized, resumable steps. A worker that runs
//! dry steals the upper half of the widest range a sibling still owns, so a
//! skewed namespace (hot prefixes, deleted ranges) cannot strand the pool
//! behind one busy worker.
//!
//! Listing either returns the complete catalog or fails: a range whose
//! worker died would otherwise be silently missing from the result, and
//! downstream training jobs have no way to notice an incomplete dataset.

mod range;
pub use range::ListingRange;
use range::RangeSplitter;
use range::DEFAULT_ALPHABET;

mod worker;

use log::debug;

use crate::store::ObjectStore;
use crate::Catalog;
use crate::Error;
use crate::ErrorKind;
use crate::ListOptions;
use crate::Result;

/// List every object under `options.prefix` and return the filtered catalog.
///
/// The catalog is complete: if any worker fails unrecoverably the whole call
/// fails with [`ErrorKind::Listing`] rather than returning a partial result.
/// Output is invariant to `max_parallelism`; only the wall-clock time
/// changes.
///
/// # Examples
///
/// ```
/// use datarush::store::MemoryStore;
/// use datarush::ListOptions;
///
/// # fn main() -> datarush::Result<()> {
/// let store = MemoryStore::new();
/// for i in 0..1000 {
///     store.insert(format!("train/{i:04}"), vec![0u8; 64]);
/// }
///
/// let catalog = datarush::list_objects(
///     &store,
///     ListOptions {
///         prefix: "train/".to_string(),
///         max_parallelism: 4,
///         ..ListOptions::default()
///     },
/// )?;
/// assert_eq!(catalog.len(), 1000);
/// # Ok(())
/// # }
/// ```
pub fn list_objects<S: ObjectStore + ?Sized>(store: &S, options: ListOptions) -> Result<Catalog> {
    if options.max_parallelism == 0 {
        return Err(
            Error::new(ErrorKind::ConfigInvalid, "max_parallelism must be at least one")
                .with_operation("list_objects"),
        );
    }
    if options.page_size == 0 {
        return Err(
            Error::new(ErrorKind::ConfigInvalid, "page_size must be at least one")
                .with_operation("list_objects"),
        );
    }

    let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET)?;
    let ranges = range::partition(&mut splitter, options.max_parallelism)?;
    debug!(
        "listing prefix {:?} across {} initial ranges, {} workers",
        options.prefix,
        ranges.len(),
        options.max_parallelism
    );

    let buffers = worker::run_pool(store, &options, ranges)?;

    let mut listed = 0usize;
    let mut catalog = Catalog::new();
    for buffer in buffers {
        listed += buffer.len();
        for meta in buffer {
            if options.allowed_storage_classes.contains(meta.storage_class()) {
                catalog.insert(meta);
            }
        }
    }
    debug!(
        "listing complete: {} objects kept of {} listed",
        catalog.len(),
        listed
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;
    use crate::StorageClass;

    #[test]
    fn test_zero_parallelism_is_rejected() {
        let err = list_objects(&MemoryStore::new(), ListOptions {
            max_parallelism: 0,
            ..ListOptions::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_storage_class_filter() {
        let store = MemoryStore::new();
        store.insert("hot", &b"x"[..]);
        store.insert_with_class("cold", &b"x"[..], StorageClass::Coldline);
        store.insert_with_class("frozen", &b"x"[..], StorageClass::Archive);

        let catalog = list_objects(&store, ListOptions::default()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("hot"));

        let catalog = list_objects(&store, ListOptions {
            allowed_storage_classes: vec![StorageClass::Standard, StorageClass::Coldline],
            ..ListOptions::default()
        })
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("cold"));
    }
}
