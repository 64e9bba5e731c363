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

use serde::Deserialize;
use serde::Serialize;

/// The storage class an object is stored under.
///
/// Listing keeps an object only if its class is in the configured allow-set;
/// non-standard classes usually carry retrieval fees that make them
/// unsuitable for repeated data-loading reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StorageClass {
    /// The store's default, immediately readable class.
    Standard,
    /// Infrequent access class.
    Nearline,
    /// Cold access class.
    Coldline,
    /// Archival class.
    Archive,
    /// A class this crate doesn't know about; carried through verbatim so
    /// callers can still allowlist it.
    Other(String),
}

impl StorageClass {
    /// Parse a storage class from the string the store reports.
    ///
    /// Matching is case-insensitive; unknown classes become
    /// [`StorageClass::Other`].
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STANDARD" => StorageClass::Standard,
            "NEARLINE" => StorageClass::Nearline,
            "COLDLINE" => StorageClass::Coldline,
            "ARCHIVE" => StorageClass::Archive,
            _ => StorageClass::Other(s.to_string()),
        }
    }

    /// The wire name of this storage class.
    pub fn as_str(&self) -> &str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::Nearline => "NEARLINE",
            StorageClass::Coldline => "COLDLINE",
            StorageClass::Archive => "ARCHIVE",
            StorageClass::Other(s) => s,
        }
    }
}

impl Default for StorageClass {
    fn default() -> Self {
        StorageClass::Standard
    }
}

impl Display for StorageClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ObjectMetadata describes one object as reported by a list page.
///
/// Metadata is immutable once produced by a list call: a later generation of
/// the same name is a different object version, not a mutation of this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectMetadata {
    name: String,
    size: u64,
    storage_class: StorageClass,
    generation: i64,
}

impl ObjectMetadata {
    /// Create a new metadata with the given name and size.
    ///
    /// Storage class defaults to [`StorageClass::Standard`] and generation to
    /// `0`; stores that track them should set both.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            storage_class: StorageClass::Standard,
            generation: 0,
        }
    }

    /// The full object name, including any listing prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object's size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The object's storage class.
    pub fn storage_class(&self) -> &StorageClass {
        &self.storage_class
    }

    /// Set the storage class.
    pub fn with_storage_class(mut self, v: StorageClass) -> Self {
        self.storage_class = v;
        self
    }

    /// The object's generation number.
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Set the generation number.
    pub fn with_generation(mut self, v: i64) -> Self {
        self.generation = v;
        self
    }

    /// Whether this object is a folder placeholder (a zero-width marker whose
    /// name ends in `/`). Such objects are skipped by listing unless
    /// [`ListOptions::include_folders`][crate::ListOptions] is set.
    pub fn is_folder_placeholder(&self) -> bool {
        self.name.ends_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_class_parse() {
        assert_eq!(StorageClass::parse("STANDARD"), StorageClass::Standard);
        assert_eq!(StorageClass::parse("standard"), StorageClass::Standard);
        assert_eq!(StorageClass::parse("NEARLINE"), StorageClass::Nearline);
        assert_eq!(
            StorageClass::parse("REGIONAL"),
            StorageClass::Other("REGIONAL".to_string())
        );
    }

    #[test]
    fn test_folder_placeholder() {
        assert!(ObjectMetadata::new("train/images/", 0).is_folder_placeholder());
        assert!(!ObjectMetadata::new("train/images/0001.jpg", 4096).is_folder_placeholder());
    }
}
