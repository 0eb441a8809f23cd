use crate::isa::ADDRESS_MASK;

/// Addresses at which `run` pauses, before the instruction there is fetched.
///
/// Kept sorted and free of duplicates.
#[derive(Clone, Default, Debug)]
pub struct Breakpoints(Vec<u16>);

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: u16) -> bool {
        self.0.binary_search(&(address & ADDRESS_MASK)).is_ok()
    }

    /// Returns whether the breakpoint was not already present.
    pub fn insert(&mut self, address: u16) -> bool {
        let address = address & ADDRESS_MASK;
        match self.0.binary_search(&address) {
            Ok(_) => false,
            Err(idx) => {
                self.0.insert(idx, address);
                true
            }
        }
    }

    /// Returns whether a breakpoint was found with given address
    pub fn remove(&mut self, address: u16) -> bool {
        match self.0.binary_search(&(address & ADDRESS_MASK)) {
            Ok(idx) => {
                self.0.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u16> for Breakpoints {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        let mut breakpoints = Breakpoints::new();
        for address in iter {
            breakpoints.insert(address);
        }
        breakpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_and_unique() {
        let mut bps: Breakpoints = [0x20, 0x05, 0x10].into_iter().collect();
        assert!(!bps.insert(0x10));
        assert!(bps.insert(0x01));
        assert_eq!(bps.iter().collect::<Vec<_>>(), vec![0x01, 0x05, 0x10, 0x20]);
    }

    #[test]
    fn remove() {
        let mut bps: Breakpoints = [7].into_iter().collect();
        assert!(bps.contains(7));
        assert!(bps.remove(7));
        assert!(!bps.remove(7));
        assert!(bps.is_empty());
    }

    #[test]
    fn addresses_wrap() {
        let mut bps = Breakpoints::new();
        bps.insert(0x1005);
        assert!(bps.contains(0x005));
    }
}
