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

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

mod metadata;
pub use metadata::ObjectMetadata;
pub use metadata::StorageClass;

mod catalog;
pub use catalog::Catalog;

mod options;
pub use options::CancelToken;
pub use options::DownloadOptions;
pub use options::DownloadStrategy;
pub use options::ListOptions;
pub use options::DEFAULT_PAGE_SIZE;

mod report;
pub use report::CleanupWarning;
pub use report::DownloadReport;
pub use report::GroupFailure;
pub use report::WrittenObject;
