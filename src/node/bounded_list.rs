//! Fixed-capacity ordered list used for the successor and predecessor
//! lists (spec.md §3, grounded on `server/chord/bounded_list.py`).

use log::warn;

#[derive(Clone, Debug)]
pub struct BoundedList<T: Clone> {
    capacity: usize,
    default: T,
    items: Vec<T>,
}

impl<T: Clone> BoundedList<T> {
    pub fn new(capacity: usize, default: T) -> Self {
        BoundedList {
            capacity,
            default,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Returns the element at `index`, or the default if out of range.
    pub fn get(&self, index: usize) -> T {
        self.items.get(index).cloned().unwrap_or_else(|| {
            warn!(
                "bounded list index {} out of range (len {}), returning default",
                index,
                self.items.len()
            );
            self.default.clone()
        })
    }

    /// Inserts `value` at `index`, shifting later elements right and
    /// truncating anything past capacity.
    pub fn set(&mut self, index: usize, value: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, value);
        if self.items.len() > self.capacity {
            self.items.truncate(self.capacity);
        }
    }

    pub fn erase(&mut self, index: usize) {
        if index < self.items.len() {
            self.items.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_default_out_of_range() {
        let list: BoundedList<i32> = BoundedList::new(3, -1);
        assert_eq!(list.get(0), -1);
    }

    #[test]
    fn set_inserts_and_shifts() {
        let mut list = BoundedList::new(3, 0);
        list.set(0, 1);
        list.set(0, 2);
        assert_eq!(list.to_vec(), vec![2, 1]);
    }

    #[test]
    fn set_truncates_at_capacity() {
        let mut list = BoundedList::new(2, 0);
        list.set(0, 1);
        list.set(1, 2);
        list.set(2, 3);
        assert_eq!(list.len(), 2);
        assert_eq!(list.to_vec(), vec![1, 2]);
    }

    #[test]
    fn erase_removes_and_shifts_left() {
        let mut list = BoundedList::new(3, 0);
        list.set(0, 1);
        list.set(1, 2);
        list.erase(0);
        assert_eq!(list.to_vec(), vec![2]);
    }

    #[test]
    fn clear_empties_the_list() {
        let mut list = BoundedList::new(3, 0);
        list.set(0, 1);
        list.clear();
        assert!(list.is_empty());
    }
}
