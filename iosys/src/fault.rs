use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

use super::memory::MemoryOpFailure;

/// The reasons a channel program can be aborted.  An abort is not
/// an error of the simulator; the channel signals XFERERROR to the
/// device and the device reports the failure to the software.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    MemoryRead(PhysicalAddress),
    MemoryWrite(PhysicalAddress),
    /// The data chain flag was set on an order which cannot be
    /// chained.
    IllegalOrder(u16),
    /// A chained order was not of the same class as its predecessor.
    InvalidChainedOrder { current: u16, next: u16 },
    /// The selector channel's device did not request service in time.
    ChansrTimeout,
    /// A multiplexer state register held more than one state.
    StateParity(u8),
}

impl AbortReason {
    pub(crate) fn memory_read(failure: MemoryOpFailure) -> AbortReason {
        match failure {
            MemoryOpFailure::NotMapped(addr) => AbortReason::MemoryRead(addr),
        }
    }

    pub(crate) fn memory_write(failure: MemoryOpFailure) -> AbortReason {
        match failure {
            MemoryOpFailure::NotMapped(addr) => AbortReason::MemoryWrite(addr),
        }
    }
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::MemoryRead(addr) => write!(f, "a memory read error at {addr}"),
            AbortReason::MemoryWrite(addr) => write!(f, "a memory write error at {addr}"),
            AbortReason::IllegalOrder(iocw) => write!(f, "an illegal order {iocw:06o}"),
            AbortReason::InvalidChainedOrder { current, next } => {
                write!(f, "an invalid chained order {next:06o} after {current:06o}")
            }
            AbortReason::ChansrTimeout => f.write_str("a CHANSR timeout"),
            AbortReason::StateParity(state) => {
                write!(f, "a state parity error (state {state:02o})")
            }
        }
    }
}

impl Error for AbortReason {}

#[test]
fn test_abort_reason_display() {
    assert_eq!(AbortReason::ChansrTimeout.to_string(), "a CHANSR timeout");
    assert_eq!(
        AbortReason::memory_read(MemoryOpFailure::NotMapped(PhysicalAddress::new(
            u4!(2),
            0o17
        )))
        .to_string(),
        "a memory read error at 2.000017"
    );
    assert_eq!(
        AbortReason::InvalidChainedOrder {
            current: 0o170000,
            next: 0o060000
        }
        .to_string(),
        "an invalid chained order 060000 after 170000"
    );
}
