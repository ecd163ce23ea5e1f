//! FIFO of pending steps.
//!
//! Enqueue and dequeue are O(1) behind one small critical section. The
//! queue has no capacity bound; the depth limit is the terminator. The
//! empty-but-workers-in-flight case is the orchestrator's concern, not the
//! queue's.

use std::collections::VecDeque;
use std::sync::Mutex;

use intelflow_common::Step;

#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Step>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: Step) {
        self.items.lock().expect("queue lock poisoned").push_back(step);
    }

    pub fn pop(&self) -> Option<Step> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelflow_common::{Category, DomainTag};
    use uuid::Uuid;

    fn step(param: &str) -> Step {
        Step::seed(Uuid::new_v4(), DomainTag::Onapi, Category::CompanyName, param)
    }

    #[test]
    fn fifo_order() {
        let queue = WorkQueue::new();
        queue.push(step("a"));
        queue.push(step("b"));
        queue.push(step("c"));

        assert_eq!(queue.pop().unwrap().search_parameter, "a");
        assert_eq!(queue.pop().unwrap().search_parameter, "b");
        assert_eq!(queue.pop().unwrap().search_parameter, "c");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn len_tracks_pushes_and_pops() {
        let queue = WorkQueue::new();
        assert!(queue.is_empty());
        queue.push(step("a"));
        queue.push(step("b"));
        assert_eq!(queue.len(), 2);
        queue.pop();
        assert_eq!(queue.len(), 1);
    }
}
