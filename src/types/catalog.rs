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

use crate::ObjectMetadata;

/// The deduplicated set of objects produced by a listing operation.
///
/// Workers list their ranges independently and a steal can hand a partially
/// listed range to a sibling, so the merged output may carry a name twice;
/// the catalog keeps one metadata per name. Iteration order is name-sorted,
/// which makes everything downstream of a catalog (notably compose planning)
/// reproducible across runs and worker counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    objects: BTreeMap<String, ObjectMetadata>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one object, replacing any previous entry with the same name.
    pub fn insert(&mut self, meta: ObjectMetadata) {
        self.objects.insert(meta.name().to_string(), meta);
    }

    /// The number of distinct objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the catalog holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether an object with the given name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Look up one object by name.
    pub fn get(&self, name: &str) -> Option<&ObjectMetadata> {
        self.objects.get(name)
    }

    /// Iterate objects in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectMetadata> {
        self.objects.values()
    }

    /// The sum of all object sizes in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.objects.values().map(|o| o.size()).sum()
    }

    /// Collect the objects into a vector, in name order.
    ///
    /// This is the form [`download`][crate::download::download] consumes;
    /// callers that want a different download order can reorder the vector.
    pub fn to_vec(&self) -> Vec<ObjectMetadata> {
        self.objects.values().cloned().collect()
    }
}

impl FromIterator<ObjectMetadata> for Catalog {
    fn from_iter<I: IntoIterator<Item = ObjectMetadata>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for meta in iter {
            catalog.insert(meta);
        }
        catalog
    }
}

impl IntoIterator for Catalog {
    type Item = ObjectMetadata;
    type IntoIter = std::collections::btree_map::IntoValues<String, ObjectMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_values()
    }
}
