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

//! Datarush accelerates bulk listing and download of objects from cloud
//! object storage, for data-loading workloads that touch millions of small
//! objects.
//!
//! - Listing: a workstealing pool of OS threads partitions the key space and
//!   rebalances dynamically, see [`list`].
//! - Download: small objects are server-side composed into larger blobs,
//!   downloaded in one request each and split locally, see [`download`].
//! - The store itself stays behind the [`store::ObjectStore`] trait;
//!   project, bucket and credentials are the implementation's business.
//!
//! # Quick Start
//!
//! ```
//! use datarush::store::MemoryStore;
//! use datarush::{DownloadOptions, DownloadStrategy, ListOptions};
//!
//! fn main() -> datarush::Result<()> {
//!     // Any ObjectStore works; MemoryStore is the in-process one.
//!     let store = MemoryStore::new();
//!     for i in 0..100 {
//!         store.insert(format!("train/{i:04}.rec"), vec![0u8; 1024]);
//!     }
//!
//!     // Enumerate the prefix with four parallel workers.
//!     let catalog = datarush::list_objects(
//!         &store,
//!         ListOptions {
//!             prefix: "train/".to_string(),
//!             max_parallelism: 4,
//!             ..ListOptions::default()
//!         },
//!     )?;
//!     assert_eq!(catalog.len(), 100);
//!
//!     // Pull everything down, composing small objects along the way.
//!     let dir = tempfile::tempdir().unwrap();
//!     let report = datarush::download(
//!         &store,
//!         &catalog.to_vec(),
//!         &DownloadOptions {
//!             max_compose_bytes: 32 * 1024,
//!             strategy: DownloadStrategy::Threaded,
//!             workers: 4,
//!             dest_dir: dir.path().to_path_buf(),
//!             ..DownloadOptions::default()
//!         },
//!     )?;
//!     assert!(report.is_complete());
//!     Ok(())
//! }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]
// Deny unused qualifications.
#![deny(unused_qualifications)]

// Private module with public types, they will be accessed via `datarush::Xxxx`
mod types;
pub use types::*;

// Public modules, they will be accessed like `datarush::store::Xxxx`
pub mod download;
pub mod list;
pub mod store;

pub use download::download;
pub use download::fetch;
pub use list::list_objects;
