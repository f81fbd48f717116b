/// A double buffered quantity.
///
/// A pass reads `current` and writes `next`, then calls `swap` so that `current` is always the most recently written slot.
/// Swapping exchanges the handles only, the underlying storage is never touched.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
}

impl<T> PingPong<T> {
    pub fn new(current: T, next: T) -> Self {
        PingPong { slots: [current, next] }
    }

    pub fn current(&self) -> &T {
        &self.slots[0]
    }

    pub fn next(&self) -> &T {
        &self.slots[1]
    }

    pub fn swap(&mut self) {
        self.slots.swap(0, 1);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::PingPong;

    #[test]
    fn swap_exchanges_roles() {
        let mut pair = PingPong::new("a", "b");
        assert_eq!((*pair.current(), *pair.next()), ("a", "b"));
        pair.swap();
        assert_eq!((*pair.current(), *pair.next()), ("b", "a"));
        pair.swap();
        assert_eq!((*pair.current(), *pair.next()), ("a", "b"));
    }

    #[test]
    fn iterates_current_first() {
        let mut pair = PingPong::new(1, 2);
        pair.swap();
        assert_eq!(pair.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
    }
}
