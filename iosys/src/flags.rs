use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;

use tracing::{event, Level};

/// A set of up to 32 flags in which the lowest-numbered raised flag
/// has the highest priority.  The I/O processor keeps its interrupt
/// request and poll sets in this form (indexed by interrupt priority)
/// and the multiplexer channel keeps its service requests in it
/// (indexed by service request number).
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct PrioritySet<T> {
    bits: u32,
    index: PhantomData<T>,
}

impl<T> PrioritySet<T>
where
    T: Copy + Into<u32> + TryFrom<u32> + fmt::Display,
{
    pub(crate) fn new() -> PrioritySet<T> {
        PrioritySet {
            bits: 0,
            index: PhantomData,
        }
    }

    fn flagbit(flag: T) -> u32 {
        let n: u32 = flag.into();
        1_u32 << n
    }

    pub(crate) fn lower_all(&mut self) {
        self.bits = 0;
    }

    pub(crate) fn raise(&mut self, flag: T) {
        event!(Level::TRACE, "Raising flag {}", flag);
        self.bits |= Self::flagbit(flag);
    }

    pub(crate) fn lower(&mut self, flag: T) {
        event!(Level::TRACE, "Lowering flag {}", flag);
        self.bits &= !Self::flagbit(flag);
    }

    pub(crate) fn is_raised(&self, flag: T) -> bool {
        self.bits & Self::flagbit(flag) != 0
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// A mask containing only the highest-priority raised flag, or
    /// zero.
    pub(crate) fn highest_priority_mask(&self) -> u32 {
        self.bits & self.bits.wrapping_neg()
    }

    /// Return the index of the highest-priority (lowest-numbered)
    /// flag, or None if no flag is raised.
    pub(crate) fn highest_priority_raised_flag(&self) -> Option<T> {
        match self.bits.trailing_zeros() {
            32 => None,
            n => T::try_from(n).ok(),
        }
    }

    pub(crate) fn bits(&self) -> u32 {
        self.bits
    }
}

impl<T> Debug for PrioritySet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PrioritySet{{{:#o}}}", self.bits)
    }
}

#[test]
fn test_priority_set() {
    use base::prelude::*;

    let mut flags: PrioritySet<InterruptPriority> = PrioritySet::new();
    assert_eq!(flags.highest_priority_raised_flag(), None);
    assert_eq!(flags.highest_priority_mask(), 0);

    flags.raise(u5!(9));
    assert_eq!(flags.highest_priority_raised_flag(), Some(u5!(9)));
    flags.raise(u5!(31));
    // 9 is still raised, so it still has the highest priority.
    assert_eq!(flags.highest_priority_raised_flag(), Some(u5!(9)));
    assert_eq!(flags.highest_priority_mask(), 1 << 9);

    flags.raise(u5!(0));
    assert_eq!(flags.highest_priority_raised_flag(), Some(u5!(0)));
    assert!(flags.is_raised(u5!(31)));
    assert!(!flags.is_raised(u5!(30)));

    flags.lower(u5!(0));
    flags.lower(u5!(9));
    assert_eq!(flags.highest_priority_raised_flag(), Some(u5!(31)));
    assert_eq!(flags.bits(), 1 << 31);

    flags.lower_all();
    assert!(flags.is_empty());
}
