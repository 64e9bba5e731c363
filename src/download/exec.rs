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

//! The scheduling substrate under the download orchestrator.
//!
//! All three strategies run the same per-group closure over the same shared
//! queue; only the execution context differs. A cancelled run never abandons
//! a group mid-flight: the token is checked between groups, so a dispatched
//! group always reaches its cleanup step, and whatever is still queued when
//! the pool drains is reported as interrupted.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;

use log::debug;
use log::error;
use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGTERM;

use super::plan::ComposeGroup;
use crate::CancelToken;
use crate::DownloadReport;
use crate::DownloadStrategy;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Run every group through `run` under the given strategy and collect the
/// merged report.
pub(crate) fn execute<F>(
    strategy: DownloadStrategy,
    workers: usize,
    cancel: CancelToken,
    groups: Vec<ComposeGroup>,
    run: &F,
) -> Result<DownloadReport>
where
    F: Fn(&ComposeGroup) -> DownloadReport + Sync,
{
    let queue = Mutex::new(VecDeque::from(groups));
    let mut report = match strategy {
        DownloadStrategy::Sequential => drain(&queue, &cancel, run),
        DownloadStrategy::Threaded => run_pool(&queue, workers, &cancel, run, false)?,
        DownloadStrategy::Interruptible => run_pool(&queue, workers, &cancel, run, true)?,
    };

    // Whatever survived in the queue was never dispatched.
    let leftover = queue.into_inner().unwrap();
    if !leftover.is_empty() {
        debug!("{} groups interrupted before dispatch", leftover.len());
        report.record_interrupted(leftover.iter().flat_map(|g| g.names()));
    }
    Ok(report)
}

/// Pop and process groups until the queue runs dry or the token trips.
fn drain<F>(
    queue: &Mutex<VecDeque<ComposeGroup>>,
    cancel: &CancelToken,
    run: &F,
) -> DownloadReport
where
    F: Fn(&ComposeGroup) -> DownloadReport + Sync,
{
    let mut report = DownloadReport::default();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let group = queue.lock().unwrap().pop_front();
        let Some(group) = group else { break };
        report.merge(run(&group));
    }
    report
}

fn run_pool<F>(
    queue: &Mutex<VecDeque<ComposeGroup>>,
    workers: usize,
    cancel: &CancelToken,
    run: &F,
    hook_signals: bool,
) -> Result<DownloadReport>
where
    F: Fn(&ComposeGroup) -> DownloadReport + Sync,
{
    if workers == 0 {
        return Err(
            Error::new(ErrorKind::ConfigInvalid, "worker count must be at least one")
                .with_operation("download"),
        );
    }

    // The interruptible strategy owns process signal disposition for the
    // duration of the pool: SIGINT/SIGTERM set the shared cancel flag and
    // the pool drains gracefully. The threaded strategy must leave signal
    // state to the host application, so it skips this and relies on the
    // caller's token alone.
    let mut signal_ids = Vec::with_capacity(2);
    if hook_signals {
        for signal in [SIGINT, SIGTERM] {
            match signal_hook::flag::register(signal, cancel.flag()) {
                Ok(id) => signal_ids.push(id),
                Err(e) => {
                    for id in signal_ids {
                        signal_hook::low_level::unregister(id);
                    }
                    return Err(
                        Error::new(ErrorKind::Unexpected, "failed to register signal handler")
                            .with_operation("download")
                            .with_context("signal", signal)
                            .set_source(e),
                    );
                }
            }
        }
    }

    let report = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| scope.spawn(move || drain(queue, cancel, run)))
            .collect();

        let mut report = DownloadReport::default();
        for handle in handles {
            match handle.join() {
                Ok(partial) => report.merge(partial),
                // The panicking group is lost from the report; the caller
                // can still notice the gap by comparing against the request.
                Err(_) => error!("download worker panicked"),
            }
        }
        report
    });

    for id in signal_ids {
        signal_hook::low_level::unregister(id);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ObjectMetadata;

    fn groups(n: usize) -> Vec<ComposeGroup> {
        let objects: Vec<ObjectMetadata> = (0..n as u64)
            .map(|i| ObjectMetadata::new(format!("obj-{i:03}"), 1))
            .collect();
        super::super::plan::plan(&objects, 0)
    }

    #[test]
    fn test_every_group_runs_once() {
        for strategy in [
            DownloadStrategy::Sequential,
            DownloadStrategy::Threaded,
            DownloadStrategy::Interruptible,
        ] {
            let counter = AtomicUsize::new(0);
            let run = |_: &ComposeGroup| {
                counter.fetch_add(1, Ordering::SeqCst);
                DownloadReport::default()
            };
            let report = execute(strategy, 4, CancelToken::new(), groups(23), &run).unwrap();
            assert_eq!(counter.load(Ordering::SeqCst), 23, "{strategy:?}");
            assert!(report.interrupted().is_empty());
        }
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let run = |_: &ComposeGroup| DownloadReport::default();
        let err = execute(
            DownloadStrategy::Threaded,
            0,
            CancelToken::new(),
            groups(1),
            &run,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_pre_cancelled_run_dispatches_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let run = |_: &ComposeGroup| panic!("must not dispatch");
        let report = execute(DownloadStrategy::Sequential, 1, cancel, groups(5), &run).unwrap();
        assert_eq!(report.interrupted().len(), 5);
        assert!(report.written().is_empty());
    }

    #[test]
    fn test_cancellation_is_checked_between_groups() {
        let cancel = CancelToken::new();
        let cancel_inner = cancel.clone();
        let dispatched = AtomicUsize::new(0);
        let run = |_: &ComposeGroup| {
            dispatched.fetch_add(1, Ordering::SeqCst);
            // An in-flight group runs to completion and trips the token on
            // its way out; nothing after it may start.
            cancel_inner.cancel();
            DownloadReport::default()
        };
        let report =
            execute(DownloadStrategy::Sequential, 1, cancel, groups(10), &run).unwrap();
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(report.interrupted().len(), 9);
    }
}
