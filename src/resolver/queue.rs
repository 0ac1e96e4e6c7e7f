//! Work queue behind [`ResolutionContext::resolve`].
//!
//! Every document reached by one resolve call gets a [`Frame`]. A frame is discovered when it is
//! pushed, waits while its lookups are fetched, and is settled once the last of them has reported
//! back. Fetches from all frames share one [`FuturesUnordered`], and settling a frame hands its
//! result to the parent's lookup slot from inside the loop. No resolve ever awaits another, so a
//! long chain of documents costs frames on the heap instead of nested polls on the stack.

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use serde_json::Value;
use tracing::Instrument;

use super::{
    context::{Discovery, LookupOutcome, LookupStep, PendingResolve, ResolutionContext},
    crawler::LookupTask,
    diagnostic::ResolveResult,
};
use crate::error::ResolverError;

struct Frame {
    context: ResolutionContext,
    pending: Option<PendingResolve>,
    /// One slot per lookup, in crawl order.
    outcomes: Vec<Option<LookupOutcome>>,
    waiting: usize,
    parent: Option<Parent>,
    span: tracing::Span,
}

/// The lookup a child frame answers.
struct Parent {
    frame: usize,
    slot: usize,
    task: LookupTask,
}

struct Fetched {
    frame: usize,
    slot: usize,
    task: LookupTask,
    payload: Result<Value, ResolverError>,
}

pub(super) struct ResolveQueue {
    frames: Vec<Frame>,
    fetches: FuturesUnordered<BoxFuture<'static, Fetched>>,
    root: Option<ResolveResult>,
}

impl ResolveQueue {
    /// Resolve `root` and every document it reaches. `root` keeps its working copy afterwards.
    pub(super) async fn run(
        root: &mut ResolutionContext,
        json_pointer: Option<String>,
        parent_path: Vec<String>,
    ) -> ResolveResult {
        let mut queue = ResolveQueue {
            frames: Vec::new(),
            fetches: FuturesUnordered::new(),
            root: None,
        };
        queue.push(root.detach(), json_pointer, parent_path, None);
        while let Some(fetched) = queue.fetches.next().await {
            queue.receive(fetched);
        }
        tracing::trace!("[ResolveQueue] drained after {} frames", queue.frames.len());

        if let Some(frame) = queue.frames.first_mut() {
            root.reattach(&mut frame.context);
        }
        match queue.root.take() {
            Some(result) => result,
            None => {
                tracing::error!("[ResolveQueue] drained before the root document settled");
                ResolveResult::new(root.document().clone(), root.summary())
            }
        }
    }

    fn push(
        &mut self,
        context: ResolutionContext,
        json_pointer: Option<String>,
        parent_path: Vec<String>,
        parent: Option<Parent>,
    ) {
        let id = self.frames.len();
        let span = tracing::debug_span!(
            "resolve",
            id = context.id(),
            depth = context.depth(),
            base = %context.base_uri()
        );
        let discovery = span.in_scope(|| context.discover(json_pointer, parent_path));
        self.frames.push(Frame {
            context,
            pending: None,
            outcomes: Vec::new(),
            waiting: 0,
            parent,
            span,
        });

        match discovery {
            Discovery::Done(result) => self.report(id, result),
            Discovery::Waiting(pending, lookups) => {
                let frame = &mut self.frames[id];
                frame.pending = Some(pending);
                frame.outcomes = lookups.iter().map(|_| None).collect();
                frame.waiting = lookups.len();
                if lookups.is_empty() {
                    if let Some(result) = self.settle(id) {
                        self.report(id, result);
                    }
                    return;
                }
                for (slot, task) in lookups.into_iter().enumerate() {
                    self.lookup_and_resolve_uri(id, slot, task);
                }
            }
        }
    }

    /// Start the lookup for `task`, or answer it right away when no fetch is needed.
    fn lookup_and_resolve_uri(&mut self, frame: usize, slot: usize, task: LookupTask) {
        let span = self.frames[frame].span.clone();
        let _entered = span.enter();
        let context = &self.frames[frame].context;
        match context.admit_lookup(&task) {
            LookupStep::Settled(outcome) => self.answer(frame, slot, outcome),
            LookupStep::Fetch(cache_key) => {
                let fetch = context.fetch_document(
                    &task.uri,
                    task.uri.fragment(),
                    &cache_key,
                    &task.parent_path,
                );
                let lookup_span = tracing::debug_span!("lookup", uri = %task.uri);
                self.fetches.push(
                    async move {
                        let payload = fetch.await;
                        Fetched {
                            frame,
                            slot,
                            task,
                            payload,
                        }
                    }
                    .instrument(lookup_span)
                    .boxed(),
                );
            }
        }
    }

    fn receive(&mut self, fetched: Fetched) {
        let Fetched {
            frame,
            slot,
            task,
            payload,
        } = fetched;
        let span = self.frames[frame].span.clone();
        let _entered = span.enter();
        match payload {
            Ok(document) => {
                let child = self.frames[frame]
                    .context
                    .lineage_child(task.uri.without_fragment(), document);
                let fragment = task.uri.pointer();
                let parent_path = task.parent_path.clone();
                self.push(child, Some(fragment), parent_path, Some(Parent { frame, slot, task }));
            }
            Err(e) => {
                let outcome = self.frames[frame]
                    .context
                    .lookup_failed(&task, e.to_string());
                self.answer(frame, slot, outcome);
            }
        }
    }

    fn answer(&mut self, frame: usize, slot: usize, outcome: LookupOutcome) {
        if let Some(result) = self.fill(frame, slot, outcome) {
            self.report(frame, result);
        }
    }

    /// Store `outcome`. Returns the settled result when it was the last lookup outstanding.
    fn fill(&mut self, frame: usize, slot: usize, outcome: LookupOutcome) -> Option<ResolveResult> {
        let entry = &mut self.frames[frame];
        entry.outcomes[slot] = Some(outcome);
        entry.waiting = entry.waiting.saturating_sub(1);
        if entry.waiting > 0 {
            return None;
        }
        self.settle(frame)
    }

    fn settle(&mut self, frame: usize) -> Option<ResolveResult> {
        let entry = &mut self.frames[frame];
        let pending = entry.pending.take()?;
        let outcomes: Vec<LookupOutcome> = std::mem::take(&mut entry.outcomes)
            .into_iter()
            .flatten()
            .collect();
        let context = &mut entry.context;
        Some(entry.span.in_scope(|| context.settle(pending, outcomes)))
    }

    /// Hand a settled result up the chain of parents, settling each parent whose last lookup
    /// this was.
    fn report(&mut self, mut frame: usize, mut result: ResolveResult) {
        loop {
            let Some(parent) = self.frames[frame].parent.take() else {
                self.root = Some(result);
                return;
            };
            let outcome = ResolutionContext::complete_lookup(parent.task, result);
            match self.fill(parent.frame, parent.slot, outcome) {
                Some(settled) => {
                    frame = parent.frame;
                    result = settled;
                }
                None => return,
            }
        }
    }
}
