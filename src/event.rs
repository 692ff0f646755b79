// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deferred event queue
//!
//! Operations posted here run on the serialized context during
//! [`AssetContext::pump`]. Each operation has a guard; while the guard
//! fails the operation is re-posted untouched. Once it runs, the
//! operation itself answers `Poll::Pending` to be re-posted or
//! `Poll::Ready(())` when consumed. There is no cancellation.

use std::collections::VecDeque;
use std::task::Poll;

use crate::context::AssetContext;

/// Type alias for deferred context mutations
pub type DeferredFn = Box<dyn FnMut(&mut AssetContext) -> Poll<()>>;

/// Condition checked before a deferred operation may run.
pub enum Guard {
    /// Run on the next pump
    Always,
    /// Run once no exclusive resource operation is in flight
    LoadingUnlocked,
    /// Caller-supplied predicate
    Custom(Box<dyn Fn(&AssetContext) -> bool>),
}

impl Guard {
    pub fn holds(&self, ctx: &AssetContext) -> bool {
        match self {
            Guard::Always => true,
            Guard::LoadingUnlocked => !ctx.loading_prevented(),
            Guard::Custom(predicate) => predicate(ctx),
        }
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Guard::Always => write!(f, "Always"),
            Guard::LoadingUnlocked => write!(f, "LoadingUnlocked"),
            Guard::Custom(_) => write!(f, "Custom(...)"),
        }
    }
}

/// One posted operation
pub struct DeferredOp {
    label: String,
    guard: Guard,
    op: DeferredFn,
    attempts: u32,
}

impl DeferredOp {
    pub fn new(label: impl Into<String>, guard: Guard, op: DeferredFn) -> Self {
        Self {
            label: label.into(),
            guard,
            op,
            attempts: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Times the operation was polled without being consumed
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check the guard and run the operation if it holds.
    pub(crate) fn poll(&mut self, ctx: &mut AssetContext) -> Poll<()> {
        if !self.guard.holds(ctx) {
            self.attempts += 1;
            return Poll::Pending;
        }
        match (self.op)(ctx) {
            Poll::Ready(()) => Poll::Ready(()),
            Poll::Pending => {
                self.attempts += 1;
                Poll::Pending
            }
        }
    }
}

impl std::fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredOp")
            .field("label", &self.label)
            .field("guard", &self.guard)
            .field("attempts", &self.attempts)
            .finish()
    }
}

/// FIFO of deferred operations owned by the context
#[derive(Default)]
pub struct EventQueue {
    ops: VecDeque<DeferredOp>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post<F>(&mut self, label: impl Into<String>, guard: Guard, op: F)
    where
        F: FnMut(&mut AssetContext) -> Poll<()> + 'static,
    {
        self.ops.push_back(DeferredOp::new(label, guard, Box::new(op)));
    }

    /// Post an operation that waits for loading to be unlocked
    pub fn post_when_unlocked<F>(&mut self, label: impl Into<String>, op: F)
    where
        F: FnMut(&mut AssetContext) -> Poll<()> + 'static,
    {
        self.post(label, Guard::LoadingUnlocked, op);
    }

    /// Remove up to `budget` operations from the front; 0 takes all.
    pub(crate) fn take_batch(&mut self, budget: usize) -> Vec<DeferredOp> {
        let count = if budget == 0 {
            self.ops.len()
        } else {
            budget.min(self.ops.len())
        };
        self.ops.drain(..count).collect()
    }

    /// Put pending operations back ahead of anything posted meanwhile
    pub(crate) fn requeue_front(&mut self, pending: Vec<DeferredOp>) {
        for op in pending.into_iter().rev() {
            self.ops.push_front(op);
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().map(|op| op.label())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ops.iter()).finish()
    }
}
