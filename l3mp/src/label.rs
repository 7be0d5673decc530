//! Labels identifying managed interfaces on the wire and in the routing table.

use std::fmt;

use crate::error::Error;

/// Highest valid label.
pub const MAX_LABEL: u8 = 16;

/// Number of distinct labels, and the capacity of both kernel maps.
pub const LABEL_CAPACITY: u32 = MAX_LABEL as u32 + 1;

/// A label in `0..=MAX_LABEL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u8);

impl Label {
    pub fn new(value: i64) -> Result<Self, Error> {
        if (0..=MAX_LABEL as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(Error::InvalidLabel(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Map key used by the kernel-side tables.
    pub fn key(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(Label::new(0).is_ok());
        assert!(Label::new(16).is_ok());
        assert!(matches!(Label::new(17), Err(Error::InvalidLabel(17))));
        assert!(matches!(Label::new(-1), Err(Error::InvalidLabel(-1))));
    }

    #[test]
    fn test_capacity_covers_every_label() {
        assert_eq!(LABEL_CAPACITY, 17);
        assert_eq!(Label::new(16).unwrap().key(), LABEL_CAPACITY - 1);
    }
}
