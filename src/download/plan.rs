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

use crate::store::COMPOSE_SOURCE_LIMIT;
use crate::ObjectMetadata;

/// An ordered run of objects eligible for one server-side compose call.
///
/// The order is the concatenation order; `offsets[i]` is where object `i`'s
/// bytes begin inside the composite, so the downloaded blob can be cut back
/// into the originals without consulting the store again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeGroup {
    objects: Vec<ObjectMetadata>,
    offsets: Vec<u64>,
    total: u64,
}

impl ComposeGroup {
    fn new(objects: Vec<ObjectMetadata>) -> Self {
        let mut offsets = Vec::with_capacity(objects.len());
        let mut total = 0u64;
        for object in &objects {
            offsets.push(total);
            total += object.size();
        }
        Self {
            objects,
            offsets,
            total,
        }
    }

    /// The member objects, in concatenation order.
    pub fn objects(&self) -> &[ObjectMetadata] {
        &self.objects
    }

    /// Byte offset of each member inside the composite.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Total composite size in bytes.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of member objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the group is empty. Planning never produces one.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// A singleton group is downloaded directly; compose needs at least two
    /// sources to pay for itself.
    pub fn is_direct(&self) -> bool {
        self.objects.len() == 1
    }

    /// The member names, in concatenation order.
    pub fn names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name().to_string()).collect()
    }
}

/// Greedily pack `objects`, in the given order, into compose groups of at
/// most `max_compose_bytes` each.
///
/// The bound is strict: a group is closed as soon as the next object would
/// push it past the limit. An object alone above the bound becomes a direct
/// singleton, never composed. `max_compose_bytes == 0` disables composition
/// entirely. Groups also never exceed the store's compose fan-in limit.
///
/// Planning is a pure function of the input order and the bound, so the same
/// catalog always yields the same groups.
pub fn plan(objects: &[ObjectMetadata], max_compose_bytes: u64) -> Vec<ComposeGroup> {
    let mut groups = Vec::new();
    let mut current: Vec<ObjectMetadata> = Vec::new();
    let mut current_size = 0u64;

    for object in objects {
        if max_compose_bytes == 0 || object.size() > max_compose_bytes {
            if !current.is_empty() {
                groups.push(ComposeGroup::new(std::mem::take(&mut current)));
                current_size = 0;
            }
            groups.push(ComposeGroup::new(vec![object.clone()]));
            continue;
        }

        let over_size = current_size + object.size() > max_compose_bytes;
        let over_fan_in = current.len() == COMPOSE_SOURCE_LIMIT;
        if !current.is_empty() && (over_size || over_fan_in) {
            groups.push(ComposeGroup::new(std::mem::take(&mut current)));
            current_size = 0;
        }
        current_size += object.size();
        current.push(object.clone());
    }
    if !current.is_empty() {
        groups.push(ComposeGroup::new(current));
    }
    groups
}
