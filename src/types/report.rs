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

use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;

use crate::Error;

/// One object successfully written to its destination path.
#[derive(Debug)]
pub struct WrittenObject {
    /// The object's full name.
    pub name: String,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}

/// One compose group that failed.
///
/// The group's object names are carried so the caller can retry exactly this
/// group (e.g. by passing the named objects back into
/// [`download`][crate::download::download]).
#[derive(Debug)]
pub struct GroupFailure {
    /// Names of every object in the failed group.
    pub objects: Vec<String>,
    /// What went wrong.
    pub error: Error,
}

/// A composite object whose best-effort deletion failed.
///
/// A leaked composite costs storage until the bucket's lifecycle rules or a
/// later cleanup removes it; it never affects the correctness of downloaded
/// data, so this is a warning, not a failure.
#[derive(Debug)]
pub struct CleanupWarning {
    /// Name of the composite object left behind.
    pub composite: String,
    /// Why deletion failed.
    pub error: Error,
}

/// Per-object outcome of a download operation.
///
/// One group's failure never aborts sibling groups, so a report can carry
/// successes and failures at once; the operation as a whole only errors when
/// no work could be attempted at all.
#[derive(Debug, Default)]
pub struct DownloadReport {
    written: Vec<WrittenObject>,
    failures: Vec<GroupFailure>,
    interrupted: Vec<String>,
    cleanup_warnings: Vec<CleanupWarning>,
}

impl DownloadReport {
    /// Objects written successfully.
    pub fn written(&self) -> &[WrittenObject] {
        &self.written
    }

    /// Groups that failed, each with its member object names.
    pub fn failures(&self) -> &[GroupFailure] {
        &self.failures
    }

    /// Names of objects whose groups were never attempted because the
    /// operation was cancelled first.
    pub fn interrupted(&self) -> &[String] {
        &self.interrupted
    }

    /// Composite objects whose deletion failed.
    pub fn cleanup_warnings(&self) -> &[CleanupWarning] {
        &self.cleanup_warnings
    }

    /// Whether every requested object was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.interrupted.is_empty()
    }

    /// Names of all objects that were not written, across failed groups and
    /// interrupted remainder.
    pub fn missing_objects(&self) -> impl Iterator<Item = &str> {
        self.failures
            .iter()
            .flat_map(|f| f.objects.iter())
            .chain(self.interrupted.iter())
            .map(String::as_str)
    }

    pub(crate) fn record_written(&mut self, written: WrittenObject) {
        self.written.push(written);
    }

    pub(crate) fn record_failure(&mut self, failure: GroupFailure) {
        self.failures.push(failure);
    }

    pub(crate) fn record_interrupted(&mut self, names: impl IntoIterator<Item = String>) {
        self.interrupted.extend(names);
    }

    pub(crate) fn record_cleanup_warning(&mut self, warning: CleanupWarning) {
        self.cleanup_warnings.push(warning);
    }

    pub(crate) fn merge(&mut self, other: DownloadReport) {
        self.written.extend(other.written);
        self.failures.extend(other.failures);
        self.interrupted.extend(other.interrupted);
        self.cleanup_warnings.extend(other.cleanup_warnings);
    }
}

impl Display for DownloadReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written: {}, failed: {} (in {} groups), interrupted: {}, cleanup warnings: {}",
            self.written.len(),
            self.failures.iter().map(|g| g.objects.len()).sum::<usize>(),
            self.failures.len(),
            self.interrupted.len(),
            self.cleanup_warnings.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_report_completeness() {
        let mut report = DownloadReport::default();
        report.record_written(WrittenObject {
            name: "a".to_string(),
            path: PathBuf::from("/tmp/a"),
            size: 3,
        });
        assert!(report.is_complete());

        report.record_failure(GroupFailure {
            objects: vec!["b".to_string(), "c".to_string()],
            error: Error::new(ErrorKind::Download, "composite download failed"),
        });
        report.record_interrupted(["d".to_string()]);

        assert!(!report.is_complete());
        let missing: Vec<_> = report.missing_objects().collect();
        assert_eq!(missing, vec!["b", "c", "d"]);
        assert_eq!(
            report.to_string(),
            "written: 1, failed: 2 (in 1 groups), interrupted: 1, cleanup warnings: 0"
        );
    }
}
