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

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::StorageClass;

/// The page size requested from the store per list call.
///
/// This is the GCS maximum; a request-bounded page keeps every range
/// resumable and gives thieves frequent split opportunities.
pub const DEFAULT_PAGE_SIZE: usize = 5000;

/// Options for [`list_objects`][crate::list::list_objects].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListOptions {
    /// Only objects under this prefix are listed. Empty lists the whole
    /// bucket.
    pub prefix: String,
    /// Number of listing workers. Each worker is an OS thread issuing its own
    /// store calls; listing throughput scales with this up to the store's
    /// request limits.
    pub max_parallelism: usize,
    /// Maximum objects requested per list call.
    pub page_size: usize,
    /// An object is retained iff its storage class is in this set.
    pub allowed_storage_classes: Vec<StorageClass>,
    /// Skip leftover composite objects from earlier interrupted downloads.
    pub skip_composite: bool,
    /// Include folder placeholder objects (names ending in `/`).
    pub include_folders: bool,
    /// How many times one page request is retried on a temporary error
    /// before the listing is failed.
    pub max_page_retries: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            max_parallelism: 1,
            page_size: DEFAULT_PAGE_SIZE,
            allowed_storage_classes: vec![StorageClass::Standard],
            skip_composite: true,
            include_folders: false,
            max_page_retries: 5,
        }
    }
}

/// How the download orchestrator schedules group work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DownloadStrategy {
    /// A worker thread pool plus an OS signal hook: SIGINT/SIGTERM trips the
    /// cancel flag, in-flight groups finish (including composite cleanup) and
    /// the pool drains. Preferred for standalone use, where taking over
    /// process-global signal disposition is acceptable.
    Interruptible,
    /// The same worker pool without the signal hook, for embedding inside a
    /// host application that owns signal handling. Cancellation is
    /// cooperative only, via [`CancelToken`] checked between groups; this
    /// mode cannot react to external interrupt signals.
    Threaded,
    /// Single-threaded on the calling thread. The correctness baseline, and
    /// the right choice for small catalogs where pool overhead dominates.
    Sequential,
}

impl Default for DownloadStrategy {
    fn default() -> Self {
        DownloadStrategy::Sequential
    }
}

/// A cooperative cancellation handle shared between a caller and the
/// download worker pool.
///
/// Workers check the token between groups; a group already dispatched runs
/// to completion so its composite object gets cleaned up. Cancelling is
/// idempotent and never un-cancels.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The shared flag itself; the interruptible strategy hands this to the
    /// signal hook.
    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

/// Options for [`download`][crate::download::download] and
/// [`fetch`][crate::download::fetch].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Upper bound on a composite object's size. Objects are greedily packed
    /// into compose groups up to this many bytes; `0` disables composition
    /// entirely and every object is downloaded directly.
    pub max_compose_bytes: u64,
    /// The scheduling strategy for group work.
    pub strategy: DownloadStrategy,
    /// Worker threads for the parallel strategies. Ignored by
    /// [`DownloadStrategy::Sequential`].
    pub workers: usize,
    /// Directory downloaded objects are written under; each object lands at
    /// `dest_dir/<object name>`.
    pub dest_dir: PathBuf,
    /// Cooperative cancellation handle, checked between groups by every
    /// strategy. The interruptible strategy additionally ties it to
    /// SIGINT/SIGTERM.
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_compose_bytes: 100 * 1024 * 1024,
            strategy: DownloadStrategy::Sequential,
            workers: 4,
            dest_dir: PathBuf::from("."),
            cancel: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_defaults() {
        let opts = ListOptions::default();
        assert_eq!(opts.max_parallelism, 1);
        assert_eq!(opts.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(opts.allowed_storage_classes, vec![StorageClass::Standard]);
        assert!(opts.skip_composite);
        assert!(!opts.include_folders);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
