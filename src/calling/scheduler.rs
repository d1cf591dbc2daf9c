// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Region scheduling. The driver owns all concurrency: independent regions
//! are dispatched onto a pool of worker threads, each region is processed
//! single-threadedly, and outcomes are re-serialised into input (genomic)
//! order. Regions do not communicate.

use std::collections::BTreeMap;

use crossbeam::channel::bounded;
use crossbeam::thread::scope;
use serde::Serialize;

use crate::calling::{Caller, RegionInput, RegionOutcome};
use crate::utils::CancelToken;
use crate::variants::GenomicRegion;

/// Outcome of one region, tagged with the region it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionCalls {
    pub region: GenomicRegion,
    pub outcome: RegionOutcome,
}

/// Call the given regions on `threads` workers and return the outcomes in
/// input order. The driver is expected to feed regions in genomic order per
/// contig; workers may finish out of order, the ordering buffer restores it.
///
/// Raising the cancel flag stops feeding further regions; regions already in
/// flight finish as `Skipped(Cancelled)` via their own cancellation checks.
pub fn call_regions<I>(
    caller: &Caller,
    inputs: I,
    threads: usize,
    cancel: &CancelToken,
) -> Vec<RegionCalls>
where
    I: IntoIterator<Item = RegionInput>,
{
    let threads = threads.max(1);
    let (in_sender, in_receiver) = bounded::<(usize, RegionInput)>(threads * 2);
    let (out_sender, out_receiver) = bounded::<(usize, RegionCalls)>(threads * 2);

    scope(|scope| {
        let mut workers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let in_receiver = in_receiver.clone();
            let out_sender = out_sender.clone();
            workers.push(scope.spawn(move |_| {
                for (index, input) in in_receiver {
                    let outcome = caller.call_region(&input, cancel);
                    let calls = RegionCalls {
                        region: input.region,
                        outcome,
                    };
                    if out_sender.send((index, calls)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(in_receiver);
        drop(out_sender);

        let collector = scope.spawn(move |_| {
            let mut buffer = BTreeMap::new();
            for (index, calls) in out_receiver {
                buffer.insert(index, calls);
            }
            buffer.into_iter().map(|(_, calls)| calls).collect()
        });

        for item in inputs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if in_sender.send(item).is_err() {
                break;
            }
        }
        drop(in_sender);

        for worker in workers {
            worker.join().expect("bug: region worker panicked");
        }
        collector.join().expect("bug: collector thread panicked")
    })
    .expect("bug: scheduler scope panicked")
}
