use std::collections::VecDeque;

use argus_types::Priority;

/// What happened to an item offered to a full set of buckets.
#[derive(Debug)]
pub enum PushOutcome<T> {
    Queued,
    /// Queued after evicting the oldest item of a strictly lower level
    Evicted { victim: T, level: Priority },
    /// No lower-priority item to evict; the offered item is handed back
    Rejected(T),
}

/// Bounded strict-priority FIFO: one `VecDeque` per level, one shared capacity.
#[derive(Debug)]
pub struct PriorityBuckets<T> {
    levels: [VecDeque<T>; Priority::COUNT],
    len: usize,
    capacity: usize,
}

impl<T> PriorityBuckets<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            levels: std::array::from_fn(|_| VecDeque::new()),
            len: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len_at(&self, priority: Priority) -> usize {
        self.levels[priority.index()].len()
    }

    pub fn push(&mut self, priority: Priority, item: T) -> PushOutcome<T> {
        if self.len < self.capacity {
            self.levels[priority.index()].push_back(item);
            self.len += 1;
            return PushOutcome::Queued;
        }

        // Oldest item of the lowest non-empty level strictly below `priority`
        let victim_level = Priority::ALL[..priority.index()]
            .iter()
            .copied()
            .find(|p| !self.levels[p.index()].is_empty());

        match victim_level.and_then(|level| {
            self.levels[level.index()]
                .pop_front()
                .map(|victim| (level, victim))
        }) {
            Some((level, victim)) => {
                self.levels[priority.index()].push_back(item);
                PushOutcome::Evicted { victim, level }
            }
            None => PushOutcome::Rejected(item),
        }
    }

    /// Highest non-empty level first, FIFO within a level.
    pub fn pop(&mut self) -> Option<(Priority, T)> {
        for priority in Priority::ALL.iter().rev().copied() {
            if let Some(item) = self.levels[priority.index()].pop_front() {
                self.len -= 1;
                return Some((priority, item));
            }
        }
        None
    }

    /// Remove the first item (in drain order) matching `pred`.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<(Priority, T)> {
        for priority in Priority::ALL.iter().rev().copied() {
            let level = &mut self.levels[priority.index()];
            if let Some(pos) = level.iter().position(&mut pred) {
                let item = level.remove(pos)?;
                self.len -= 1;
                return Some((priority, item));
            }
        }
        None
    }

    /// Empty every level, in drain order.
    pub fn drain(&mut self) -> Vec<(Priority, T)> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Priority, &T)> {
        Priority::ALL
            .iter()
            .rev()
            .flat_map(move |p| self.levels[p.index()].iter().map(move |item| (*p, item)))
    }
}
