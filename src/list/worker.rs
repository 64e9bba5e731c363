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

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use backon::BlockingRetryable;
use backon::ExponentialBuilder;
use log::debug;
use log::warn;

use super::range::successor;
use super::range::ListingRange;
use super::range::RangeSplitter;
use super::range::DEFAULT_ALPHABET;
use crate::download::COMPOSITE_PREFIX;
use crate::store::ListPage;
use crate::store::ListPageRequest;
use crate::store::ObjectStore;
use crate::Error;
use crate::ErrorKind;
use crate::ListOptions;
use crate::ObjectMetadata;
use crate::Result;

/// How long an idle worker sleeps between steal scans.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Shared state of one listing run.
///
/// The deques are index-addressable and each sits behind its own mutex:
/// stealing locks exactly the victim being split, never the whole pool, and
/// no store call is ever issued while a lock is held.
struct WorkerPool<'a, S: ?Sized> {
    store: &'a S,
    options: &'a ListOptions,
    deques: Vec<Mutex<VecDeque<ListingRange>>>,
    /// Workers currently waiting for work to steal.
    idle: AtomicUsize,
    /// Bumped on every successful steal; the quiescence check refuses to
    /// certify termination if it moved during the scan.
    steal_generation: AtomicU64,
    /// Set by the first worker to fail (or to finish); every loop bails out
    /// promptly once it flips.
    aborted: AtomicBool,
}

/// Arms the pool's abort flag on every exit path of a worker, including
/// panics. A normal exit only happens at global quiescence, where waking the
/// siblings is exactly what's wanted.
struct AbortGuard<'a>(&'a AtomicBool);

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run `options.max_parallelism` listing workers over the given initial
/// ranges and return each worker's raw result buffer.
///
/// The buffers are kept separate so callers (and tests) can observe that no
/// object was listed twice; merging and filtering belong to the controller.
pub(crate) fn run_pool<S: ObjectStore + ?Sized>(
    store: &S,
    options: &ListOptions,
    ranges: Vec<ListingRange>,
) -> Result<Vec<Vec<ObjectMetadata>>> {
    let workers = options.max_parallelism;
    let mut deques: Vec<Mutex<VecDeque<ListingRange>>> =
        (0..workers).map(|_| Mutex::new(VecDeque::new())).collect();
    for (i, range) in ranges.into_iter().enumerate() {
        deques[i].get_mut().unwrap().push_back(range);
    }

    let pool = WorkerPool {
        store,
        options,
        deques,
        idle: AtomicUsize::new(0),
        steal_generation: AtomicU64::new(0),
        aborted: AtomicBool::new(false),
    };

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let pool = &pool;
                scope.spawn(move || pool.run_worker(id))
            })
            .collect();

        let mut buffers = Vec::with_capacity(workers);
        let mut first_error = None;
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(buffer)) => buffers.push(buffer),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(
                            Error::new(
                                ErrorKind::Listing,
                                "a listing worker failed unrecoverably; the catalog would be incomplete",
                            )
                            .with_operation("run_pool")
                            .set_source(e),
                        );
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(
                            Error::new(ErrorKind::Listing, "a listing worker panicked")
                                .with_operation("run_pool")
                                .with_context("worker", id),
                        );
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(buffers),
        }
    })
}

impl<S: ObjectStore + ?Sized> WorkerPool<'_, S> {
    fn run_worker(&self, id: usize) -> Result<Vec<ObjectMetadata>> {
        let _guard = AbortGuard(&self.aborted);
        let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET)?;
        let mut results = Vec::new();
        debug!("listing worker {id} starting");

        loop {
            // Drain the own deque one page at a time.
            while self.list_front(id, &mut results)? {
                if self.aborted.load(Ordering::SeqCst) {
                    debug!("listing worker {id} bailing out");
                    return Ok(results);
                }
            }

            // Deque empty: steal from the widest sibling, or conclude the
            // pool is drained.
            match self.acquire(id, &mut splitter) {
                Some(range) => {
                    debug!("listing worker {id} stole {range}");
                    self.deques[id].lock().unwrap().push_back(range);
                }
                None => break,
            }
        }

        debug!("listing worker {id} done, {} objects", results.len());
        Ok(results)
    }

    /// List one page of the front item of `id`'s deque. Returns `false` when
    /// the deque is empty.
    fn list_front(&self, id: usize, results: &mut Vec<ObjectMetadata>) -> Result<bool> {
        let (lower, upper) = {
            let deque = self.deques[id].lock().unwrap();
            match deque.front() {
                None => return Ok(false),
                Some(item) => (item.lower.clone(), item.upper.clone()),
            }
        };

        let req = ListPageRequest {
            prefix: self.options.prefix.clone(),
            start_offset: lower,
            end_offset: upper,
            page_size: self.options.page_size,
        };
        let page = self.fetch_page(&req, id)?;

        // Reconcile under the lock: a thief may have shrunk this item's
        // upper bound while the page was in flight, in which case the names
        // at or beyond the new bound belong to the thief now and must be
        // dropped here.
        let mut deque = self.deques[id].lock().unwrap();
        let current_upper = deque
            .front()
            .expect("only the owner pops its deque")
            .upper
            .clone();

        let mut last_kept = None;
        for meta in page.objects {
            let rel = meta
                .name()
                .strip_prefix(&self.options.prefix)
                .unwrap_or(meta.name())
                .to_string();
            if let Some(upper) = &current_upper {
                if rel.as_str() >= upper.as_str() {
                    break;
                }
            }
            if self.keep(&meta) {
                results.push(meta);
            }
            last_kept = Some(rel);
        }

        let exhausted = if !page.truncated {
            // The store ran out of names in the requested interval, which
            // contains the (possibly shrunk) current interval.
            true
        } else {
            match last_kept {
                Some(last) => {
                    let item = deque.front_mut().expect("only the owner pops its deque");
                    item.lower = successor(&last);
                    item.is_empty()
                }
                // Every returned name was at or beyond the shrunk bound.
                None => true,
            }
        };
        if exhausted {
            deque.pop_front();
        }
        Ok(true)
    }

    /// One page request with bounded retry on temporary errors.
    fn fetch_page(&self, req: &ListPageRequest, id: usize) -> Result<ListPage> {
        let backoff = ExponentialBuilder::default()
            .with_jitter()
            .with_max_times(self.options.max_page_retries);

        (|| self.store.list_page(req))
            .retry(backoff)
            .when(Error::is_temporary)
            .notify(|err, dur| warn!("listing worker {id} retrying page in {dur:?}: {err}"))
            .call()
            .map_err(|e| {
                let e = if e.is_temporary() { e.set_persistent() } else { e };
                e.with_operation("list_page")
                    .with_context("worker", id)
                    .with_context("start", &req.start_offset)
                    .with_context("end", req.end_offset.as_deref().unwrap_or(".."))
            })
    }

    /// Listing-shape filters; the storage-class policy is applied by the
    /// controller after the pool drains.
    fn keep(&self, meta: &ObjectMetadata) -> bool {
        if self.options.skip_composite && meta.name().starts_with(COMPOSITE_PREFIX) {
            return false;
        }
        if !self.options.include_folders && meta.is_folder_placeholder() {
            return false;
        }
        true
    }

    /// Steal a range, or conclude that the pool is drained.
    ///
    /// Termination is consensus: every worker idle, nothing stealable, and
    /// the steal generation unchanged across the scan. A successful thief
    /// leaves the idle set *before* bumping the generation, so the check can
    /// never certify while a steal is between "taken" and "being processed".
    fn acquire(&self, me: usize, splitter: &mut RangeSplitter) -> Option<ListingRange> {
        self.idle.fetch_add(1, Ordering::SeqCst);
        loop {
            if self.aborted.load(Ordering::SeqCst) {
                return None;
            }
            let generation = self.steal_generation.load(Ordering::SeqCst);
            if let Some(range) = self.try_steal(me, splitter) {
                self.idle.fetch_sub(1, Ordering::SeqCst);
                self.steal_generation.fetch_add(1, Ordering::SeqCst);
                return Some(range);
            }
            if self.idle.load(Ordering::SeqCst) == self.deques.len()
                && self.steal_generation.load(Ordering::SeqCst) == generation
            {
                return None;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Scan the siblings for the widest remaining item and split off its
    /// upper half. The scan starts after `me` so concurrent thieves spread
    /// over different victims instead of herding on one.
    fn try_steal(&self, me: usize, splitter: &mut RangeSplitter) -> Option<ListingRange> {
        let n = self.deques.len();
        let mut best: Option<(usize, f64)> = None;
        for offset in 1..n {
            let victim = (me + offset) % n;
            let deque = self.deques[victim].lock().unwrap();
            for item in deque.iter() {
                let span = splitter.estimated_span(item);
                if span > 0.0 && best.map_or(true, |(_, s)| span > s) {
                    best = Some((victim, span));
                }
            }
        }
        let (victim, _) = best?;

        // Re-lock the chosen victim; its deque may have moved on since the
        // scan, so pick the widest item afresh under the lock.
        let mut deque = self.deques[victim].lock().unwrap();
        let mut widest: Option<(usize, f64)> = None;
        for (i, item) in deque.iter().enumerate() {
            let span = splitter.estimated_span(item);
            if span > 0.0 && widest.map_or(true, |(_, s)| span > s) {
                widest = Some((i, span));
            }
        }
        let (index, _) = widest?;
        let item = deque.get_mut(index)?;

        let mid = splitter
            .split_range(&item.lower, item.upper.as_deref(), 1)
            .expect("one split point is always a valid request")
            .into_iter()
            .next()?;
        let stolen = ListingRange::new(mid.clone(), item.upper.take());
        item.upper = Some(mid);
        Some(stolen)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::super::range::partition;
    use super::*;
    use crate::store::MemoryStore;

    fn opts(parallelism: usize, page_size: usize) -> ListOptions {
        ListOptions {
            max_parallelism: parallelism,
            page_size,
            ..ListOptions::default()
        }
    }

    fn run(store: &MemoryStore, options: &ListOptions) -> Vec<Vec<ObjectMetadata>> {
        let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET).unwrap();
        let ranges = partition(&mut splitter, options.max_parallelism).unwrap();
        run_pool(store, options, ranges).unwrap()
    }

    /// Flatten the buffers and assert no object was listed twice.
    fn merge_unique(buffers: Vec<Vec<ObjectMetadata>>) -> HashSet<String> {
        let total: usize = buffers.iter().map(Vec::len).sum();
        let names: HashSet<String> = buffers
            .into_iter()
            .flatten()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(total, names.len(), "an object was listed more than once");
        names
    }

    #[test]
    fn test_listing_is_invariant_to_worker_count() {
        let store = MemoryStore::new();
        let expected: HashSet<String> = (0..500)
            .map(|i| {
                let name = format!("obj-{i:04}");
                store.insert(name.clone(), vec![0u8; 8]);
                name
            })
            .collect();

        for parallelism in [1, 2, 8] {
            let buffers = run(&store, &opts(parallelism, 37));
            assert_eq!(merge_unique(buffers), expected, "parallelism {parallelism}");
        }
    }

    #[test]
    fn test_skewed_namespace_rebalances() {
        let store = MemoryStore::new();
        // 90% of the objects sit in the last partition; only stealing can
        // hand the other workers something to do.
        let mut expected = HashSet::new();
        for i in 0..900 {
            let name = format!("zzz-{i:04}");
            store.insert(name.clone(), vec![0u8; 8]);
            expected.insert(name);
        }
        for i in 0..100 {
            let name = format!("aaa-{i:04}");
            store.insert(name.clone(), vec![0u8; 8]);
            expected.insert(name);
        }

        let buffers = run(&store, &opts(4, 10));
        let busy = buffers.iter().filter(|b| !b.is_empty()).count();
        assert_eq!(merge_unique(buffers), expected);
        assert!(busy >= 2, "load never rebalanced, {busy} busy workers");
    }

    #[test]
    fn test_empty_bucket_terminates() {
        let store = MemoryStore::new();
        let buffers = run(&store, &opts(8, 100));
        assert!(buffers.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_prefix_bounds_listing() {
        let store = MemoryStore::new();
        store.insert("train/a", &b"x"[..]);
        store.insert("train/b", &b"x"[..]);
        store.insert("validate/a", &b"x"[..]);

        let options = ListOptions {
            prefix: "train/".to_string(),
            max_parallelism: 2,
            page_size: 1,
            ..ListOptions::default()
        };
        let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET).unwrap();
        let ranges = partition(&mut splitter, 2).unwrap();
        let buffers = run_pool(&store, &options, ranges).unwrap();
        let names = merge_unique(buffers);
        assert_eq!(
            names,
            HashSet::from(["train/a".to_string(), "train/b".to_string()])
        );
    }

    #[test]
    fn test_composite_leftovers_and_folders_are_skipped() {
        let store = MemoryStore::new();
        store.insert("data/part-0", &b"x"[..]);
        store.insert("data/sub/", &b""[..]);
        store.insert(format!("{COMPOSITE_PREFIX}stale"), &b"x"[..]);

        let buffers = run(&store, &opts(1, 100));
        let names = merge_unique(buffers);
        assert_eq!(names, HashSet::from(["data/part-0".to_string()]));
    }

    /// Fails every list call with a permanent error.
    struct BrokenStore;

    impl ObjectStore for BrokenStore {
        fn list_page(&self, _: &ListPageRequest) -> Result<ListPage> {
            Err(Error::new(ErrorKind::Unexpected, "bucket is on fire"))
        }
        fn compose(&self, _: &str, _: &[&str]) -> Result<ObjectMetadata> {
            unreachable!()
        }
        fn download(&self, _: &str) -> Result<bytes::Bytes> {
            unreachable!()
        }
        fn delete(&self, _: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn test_worker_failure_fails_the_pool() {
        let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET).unwrap();
        let ranges = partition(&mut splitter, 4).unwrap();
        let err = run_pool(&BrokenStore, &opts(4, 100), ranges).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Listing);
    }

    /// Fails the first `failures` list calls with a temporary error, then
    /// delegates.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl ObjectStore for FlakyStore {
        fn list_page(&self, req: &ListPageRequest) -> Result<ListPage> {
            let remaining = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if remaining.is_ok() {
                return Err(Error::new(ErrorKind::Unexpected, "transient glitch").set_temporary());
            }
            self.inner.list_page(req)
        }
        fn compose(&self, d: &str, s: &[&str]) -> Result<ObjectMetadata> {
            self.inner.compose(d, s)
        }
        fn download(&self, n: &str) -> Result<bytes::Bytes> {
            self.inner.download(n)
        }
        fn delete(&self, n: &str) -> Result<()> {
            self.inner.delete(n)
        }
    }

    #[test]
    fn test_temporary_errors_are_retried() {
        let inner = MemoryStore::new();
        inner.insert("a", &b"x"[..]);
        inner.insert("b", &b"x"[..]);
        let store = FlakyStore {
            inner,
            failures: AtomicUsize::new(1),
        };

        let mut splitter = RangeSplitter::new(DEFAULT_ALPHABET).unwrap();
        let ranges = partition(&mut splitter, 1).unwrap();
        let buffers = run_pool(&store, &opts(1, 100), ranges).unwrap();
        let names = merge_unique(buffers);
        assert_eq!(names, HashSet::from(["a".to_string(), "b".to_string()]));
    }
}
