use std::collections::VecDeque;
use crate::core::generation::Generation;

/// Items retired by the writer, waiting until no reader can still observe them.
///
/// Items are inserted untagged, tagged with the current generation by
/// [`assign_generation`](Self::assign_generation), and handed back by
/// [`reclaim`](Self::reclaim) once the oldest used generation has moved past the tag.
pub struct GenerationHoldList<T> {
    pending: Vec<T>,
    held: VecDeque<(Generation, Vec<T>)>,
    len: usize,
}

impl<T> GenerationHoldList<T> {
    pub fn new() -> Self {
        GenerationHoldList {
            pending: Vec::new(),
            held: VecDeque::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, item: T) {
        self.pending.push(item);
        self.len += 1;
    }

    pub fn assign_generation(&mut self, current: Generation) {
        if self.pending.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.pending);
        match self.held.back_mut() {
            Some((generation, batch)) if *generation == current => batch.extend(items),
            _ => self.held.push_back((current, items)),
        }
    }

    pub fn reclaim(&mut self, oldest_used: Generation, mut f: impl FnMut(T)) {
        while let Some((generation, _)) = self.held.front() {
            if *generation >= oldest_used {
                break;
            }
            if let Some((_, batch)) = self.held.pop_front() {
                self.len -= batch.len();
                batch.into_iter().for_each(&mut f);
            }
        }
    }

    /// Drops every item regardless of generation. Only valid without readers.
    pub fn reclaim_all(&mut self, mut f: impl FnMut(T)) {
        for (_, batch) in self.held.drain(..) {
            batch.into_iter().for_each(&mut f);
        }
        self.pending.drain(..).for_each(&mut f);
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.held
            .iter()
            .flat_map(|(_, batch)| batch.iter())
            .chain(self.pending.iter())
    }
}

impl<T> Default for GenerationHoldList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaims_only_generations_older_than_oldest_used() {
        let mut list = GenerationHoldList::new();
        list.insert(1);
        list.assign_generation(3);
        list.insert(2);
        list.assign_generation(4);

        let mut freed = Vec::new();
        list.reclaim(3, |v| freed.push(v));
        assert!(freed.is_empty());
        list.reclaim(4, |v| freed.push(v));
        assert_eq!(freed, vec![1]);
        assert_eq!(list.len(), 1);
        list.reclaim(10, |v| freed.push(v));
        assert_eq!(freed, vec![1, 2]);
        assert!(list.is_empty());
    }

    #[test]
    fn untagged_items_are_not_reclaimed() {
        let mut list = GenerationHoldList::new();
        list.insert("a");
        let mut freed = Vec::new();
        list.reclaim(100, |v| freed.push(v));
        assert!(freed.is_empty());
        assert_eq!(list.len(), 1);
    }
}
