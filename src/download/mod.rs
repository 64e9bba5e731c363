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

//! Compose-accelerated bulk download.
//!
//! Downloading millions of kilobyte-scale objects one request each spends
//! almost all of its time on per-request overhead. This module packs small
//! objects into size-bounded groups, has the store concatenate each group
//! server-side into one composite object, downloads that composite in a
//! single request, cuts it back apart at recorded offsets, and deletes the
//! composite. Objects too large to benefit are downloaded directly.
//!
//! Composites are transient: they exist from a successful compose call until
//! the local split lands, then get deleted best-effort. A failed deletion
//! costs storage, not correctness, so it surfaces as a
//! [`CleanupWarning`][crate::CleanupWarning] instead of failing the group.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use bytes::Bytes;
use log::debug;
use log::warn;
use uuid::Uuid;

use crate::store::ObjectStore;
use crate::CleanupWarning;
use crate::DownloadOptions;
use crate::DownloadReport;
use crate::DownloadStrategy;
use crate::Error;
use crate::ErrorKind;
use crate::GroupFailure;
use crate::ObjectMetadata;
use crate::Result;
use crate::WrittenObject;

mod plan;
pub use plan::plan;
pub use plan::ComposeGroup;

mod exec;

/// The name prefix under which transient composite objects are created.
///
/// Listing skips this namespace by default, so composites leaked by an
/// earlier crash never show up in a catalog (see
/// [`ListOptions::skip_composite`][crate::ListOptions::skip_composite]).
pub const COMPOSITE_PREFIX: &str = "datarush-composed-objects/";

/// Download `objects` into `options.dest_dir`, composing small objects into
/// larger blobs to cut request overhead.
///
/// Objects are planned into groups in the order given; pass a
/// [`Catalog::to_vec`][crate::Catalog::to_vec] for the deterministic
/// name-sorted order, or any reordered subset. Each object lands at
/// `dest_dir/<object name>`.
///
/// A group's failure is recorded in the report and does not abort sibling
/// groups; the call itself only fails on invalid configuration or an
/// unusable destination. All three strategies produce byte-identical file
/// sets; see [`DownloadStrategy`] for how they differ in scheduling and
/// cancellation.
///
/// # Examples
///
/// ```
/// use datarush::store::MemoryStore;
/// use datarush::{DownloadOptions, DownloadStrategy};
///
/// # fn main() -> datarush::Result<()> {
/// let store = MemoryStore::new();
/// store.insert("shard/0", vec![1u8; 512]);
/// store.insert("shard/1", vec![2u8; 512]);
///
/// let dir = tempfile::tempdir().unwrap();
/// let catalog = datarush::list_objects(&store, Default::default())?;
/// let report = datarush::download(
///     &store,
///     &catalog.to_vec(),
///     &DownloadOptions {
///         max_compose_bytes: 4096,
///         strategy: DownloadStrategy::Sequential,
///         dest_dir: dir.path().to_path_buf(),
///         ..DownloadOptions::default()
///     },
/// )?;
/// assert!(report.is_complete());
/// assert_eq!(report.written().len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn download<S: ObjectStore + ?Sized>(
    store: &S,
    objects: &[ObjectMetadata],
    options: &DownloadOptions,
) -> Result<DownloadReport> {
    fs::create_dir_all(&options.dest_dir).map_err(|e| {
        Error::new(ErrorKind::Unexpected, "failed to create destination directory")
            .with_operation("download")
            .with_context("dest_dir", options.dest_dir.display())
            .set_source(e)
    })?;

    let groups = plan(objects, options.max_compose_bytes);
    debug!(
        "downloading {} objects in {} groups ({:?})",
        objects.len(),
        groups.len(),
        options.strategy
    );

    let cancel = options.cancel.clone().unwrap_or_default();
    let run = |group: &ComposeGroup| process_group(store, group, &options.dest_dir);
    exec::execute(options.strategy, options.workers, cancel, groups, &run)
}

/// Download `objects` and return their contents in memory, in input order.
///
/// The sequential, bytes-in-hand variant of [`download`] for callers that
/// feed a loader directly instead of materializing files. Composition is
/// still applied per `options.max_compose_bytes`; strategy, workers and
/// destination are ignored. Unlike [`download`], the first failing group
/// fails the whole call, since a partial vector would misalign with the
/// input.
pub fn fetch<S: ObjectStore + ?Sized>(
    store: &S,
    objects: &[ObjectMetadata],
    options: &DownloadOptions,
) -> Result<Vec<Bytes>> {
    let groups = plan(objects, options.max_compose_bytes);
    let mut contents = Vec::with_capacity(objects.len());

    for group in &groups {
        if group.is_direct() {
            let object = &group.objects()[0];
            let bytes = store.download(object.name()).map_err(|e| {
                e.with_operation("fetch").with_context("object", object.name())
            })?;
            contents.push(bytes);
            continue;
        }

        let composite = composite_name();
        let names = group.names();
        let sources: Vec<&str> = names.iter().map(String::as_str).collect();
        store
            .compose(&composite, &sources)
            .map_err(|e| e.with_operation("fetch").with_context("composite", &composite))?;

        let result = store
            .download(&composite)
            .map_err(|e| e.with_operation("fetch").with_context("composite", &composite))
            .and_then(|bytes| split_group(group, &composite, bytes));

        // Best-effort cleanup on both paths; a leaked composite is a cost,
        // not a correctness problem.
        if let Err(e) = store.delete(&composite) {
            warn!("failed to delete composite object {composite}: {e}");
        }

        contents.extend(result?);
    }
    Ok(contents)
}

fn composite_name() -> String {
    format!("{COMPOSITE_PREFIX}{}", Uuid::new_v4())
}

/// Cut a downloaded composite into its members' byte views.
fn split_group(group: &ComposeGroup, composite: &str, bytes: Bytes) -> Result<Vec<Bytes>> {
    if bytes.len() as u64 != group.total() {
        return Err(
            Error::new(
                ErrorKind::Split,
                "composite length mismatches the planned group total",
            )
            .with_operation("split")
            .with_context("composite", composite)
            .with_context("expected", group.total())
            .with_context("actual", bytes.len()),
        );
    }
    Ok(group
        .objects()
        .iter()
        .zip(group.offsets())
        .map(|(object, offset)| {
            let start = *offset as usize;
            bytes.slice(start..start + object.size() as usize)
        })
        .collect())
}

/// Steps 1-4 for one group: compose, download, split into destination files,
/// delete the composite. Direct singletons skip straight to download.
fn process_group<S: ObjectStore + ?Sized>(
    store: &S,
    group: &ComposeGroup,
    dest_dir: &Path,
) -> DownloadReport {
    let mut report = DownloadReport::default();

    if group.is_direct() {
        let object = &group.objects()[0];
        match store.download(object.name()) {
            Ok(bytes) => write_members(&mut report, group, &[bytes], dest_dir),
            Err(e) => report.record_failure(GroupFailure {
                objects: group.names(),
                error: e
                    .with_operation("download")
                    .with_context("object", object.name()),
            }),
        }
        return report;
    }

    let composite = composite_name();
    let names = group.names();
    let sources: Vec<&str> = names.iter().map(String::as_str).collect();
    if let Err(e) = store.compose(&composite, &sources) {
        report.record_failure(GroupFailure {
            objects: names,
            error: e
                .with_operation("compose")
                .with_context("composite", &composite)
                .with_context("objects", group.names().join(",")),
        });
        return report;
    }

    let slices = store
        .download(&composite)
        .map_err(|e| e.with_operation("download").with_context("composite", &composite))
        .and_then(|bytes| split_group(group, &composite, bytes));
    match slices {
        Ok(slices) => write_members(&mut report, group, &slices, dest_dir),
        Err(e) => report.record_failure(GroupFailure {
            objects: names,
            error: e.with_context("objects", group.names().join(",")),
        }),
    }

    if let Err(e) = store.delete(&composite) {
        warn!("failed to delete composite object {composite}: {e}");
        report.record_cleanup_warning(CleanupWarning {
            composite,
            error: e.with_operation("delete"),
        });
    }
    report
}

/// Write each member's bytes to its destination path. A write failure fails
/// the member being written and every member after it, as one retryable
/// group failure; members already on disk stay recorded as written.
fn write_members(
    report: &mut DownloadReport,
    group: &ComposeGroup,
    slices: &[Bytes],
    dest_dir: &Path,
) {
    debug_assert_eq!(group.len(), slices.len());
    for (i, (object, bytes)) in group.objects().iter().zip(slices).enumerate() {
        match write_object(dest_dir, object.name(), bytes) {
            Ok(path) => report.record_written(WrittenObject {
                name: object.name().to_string(),
                path,
                size: bytes.len() as u64,
            }),
            Err(e) => {
                report.record_failure(GroupFailure {
                    objects: group.objects()[i..]
                        .iter()
                        .map(|o| o.name().to_string())
                        .collect(),
                    error: e,
                });
                return;
            }
        }
    }
}

fn write_object(dest_dir: &Path, name: &str, bytes: &Bytes) -> Result<PathBuf> {
    let path = dest_dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::new(ErrorKind::Unexpected, "failed to create parent directory")
                .with_operation("write_object")
                .with_context("path", path.display())
                .set_source(e)
        })?;
    }
    fs::write(&path, bytes).map_err(|e| {
        Error::new(ErrorKind::Unexpected, "failed to write object to destination")
            .with_operation("write_object")
            .with_context("path", path.display())
            .set_source(e)
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::MemoryStore;

    fn seeded_store(sizes: &[(&str, usize)]) -> (MemoryStore, Vec<ObjectMetadata>) {
        let store = MemoryStore::new();
        let mut objects = Vec::new();
        for (i, (name, size)) in sizes.iter().enumerate() {
            store.insert(name.to_string(), vec![i as u8 + 1; *size]);
            objects.push(ObjectMetadata::new(*name, *size as u64));
        }
        (store, objects)
    }

    #[test]
    fn test_round_trip_through_composite() {
        let (store, objects) = seeded_store(&[("a", 100), ("b", 250), ("c", 50)]);
        let dir = tempfile::tempdir().unwrap();

        let report = download(
            &store,
            &objects,
            &DownloadOptions {
                max_compose_bytes: 1000,
                dest_dir: dir.path().to_path_buf(),
                ..DownloadOptions::default()
            },
        )
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.written().len(), 3);
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), vec![1u8; 100]);
        assert_eq!(fs::read(dir.path().join("b")).unwrap(), vec![2u8; 250]);
        assert_eq!(fs::read(dir.path().join("c")).unwrap(), vec![3u8; 50]);
        // The transient composite was cleaned up.
        assert_eq!(store.object_count(), 3);
        assert!(report.cleanup_warnings().is_empty());
    }

    #[test]
    fn test_fetch_preserves_input_order() {
        let (store, objects) = seeded_store(&[("x", 10), ("y", 20), ("z", 30)]);

        // x and y compose into one blob, z stays direct.
        let contents = fetch(
            &store,
            &objects,
            &DownloadOptions {
                max_compose_bytes: 35,
                ..DownloadOptions::default()
            },
        )
        .unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0], Bytes::from(vec![1u8; 10]));
        assert_eq!(contents[1], Bytes::from(vec![2u8; 20]));
        assert_eq!(contents[2], Bytes::from(vec![3u8; 30]));
        assert_eq!(store.object_count(), 3);
    }

    #[test]
    fn test_missing_object_is_reported_not_fatal() {
        let (store, mut objects) = seeded_store(&[("present", 10)]);
        objects.push(ObjectMetadata::new("ghost", 10));
        let dir = tempfile::tempdir().unwrap();

        let report = download(
            &store,
            &objects,
            &DownloadOptions {
                // Composition off: each object is its own group, so only the
                // ghost's group fails.
                max_compose_bytes: 0,
                dest_dir: dir.path().to_path_buf(),
                ..DownloadOptions::default()
            },
        )
        .unwrap();

        assert_eq!(report.written().len(), 1);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].objects, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_compose_failure_carries_group_names() {
        let (store, mut objects) = seeded_store(&[("a", 10)]);
        objects.push(ObjectMetadata::new("ghost", 10));
        let dir = tempfile::tempdir().unwrap();

        let report = download(
            &store,
            &objects,
            &DownloadOptions {
                max_compose_bytes: 100,
                dest_dir: dir.path().to_path_buf(),
                ..DownloadOptions::default()
            },
        )
        .unwrap();

        assert!(report.written().is_empty());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(
            report.failures()[0].objects,
            vec!["a".to_string(), "ghost".to_string()]
        );
        assert_eq!(report.failures()[0].error.kind(), ErrorKind::Compose);
    }

    #[test]
    fn test_split_mismatch_is_detected() {
        let (_, objects) = seeded_store(&[("a", 10), ("b", 10)]);
        let group = &plan(&objects, 100)[0];

        // The store "returns" one byte short.
        let err = split_group(group, "composite", Bytes::from(vec![0u8; 19])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Split);
    }

    #[test]
    fn test_nested_names_create_directories() {
        let (store, objects) = seeded_store(&[("train/images/0001.jpg", 64)]);
        let dir = tempfile::tempdir().unwrap();

        let report = download(
            &store,
            &objects,
            &DownloadOptions {
                dest_dir: dir.path().to_path_buf(),
                ..DownloadOptions::default()
            },
        )
        .unwrap();

        assert!(report.is_complete());
        assert!(dir.path().join("train/images/0001.jpg").is_file());
    }
}
