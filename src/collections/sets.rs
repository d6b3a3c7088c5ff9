/// Simple vector set that ensures that all elements are unique. Elements are
/// not ordered (we expect the vector to be small).
#[derive(Debug, Clone)]
pub struct VecSet<T: Eq> {
    inner: Vec<T>,
}

impl<T: Eq> VecSet<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self{ inner: Vec::with_capacity(capacity) }
    }

    /// Pushes the element if it is not yet present. Returns whether it was
    /// inserted.
    #[inline]
    pub fn push(&mut self, to_push: T) -> bool {
        if self.contains(&to_push) {
            return false;
        }

        self.inner.push(to_push);
        true
    }

    #[inline]
    pub fn contains(&self, element: &T) -> bool {
        self.inner.iter().any(|v| v == element)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_duplicates() {
        let mut set = VecSet::with_capacity(2);
        assert!(set.push(3));
        assert!(set.push(1));
        assert!(!set.push(3));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&1));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![3, 1]);
    }
}
