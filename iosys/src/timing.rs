//! Channel cycle timing.
//!
//! The channels run in bursts.  After each CPU instruction the CPU
//! tells each channel how many clock ticks have elapsed, and the
//! channel performs as many sequencer states as fit into that many
//! cycles.  No documentation of the real per-state costs is known to
//! exist, so the figures here are estimates and are configurable.
//! Only the order in which states run is significant to software.

use conv::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTiming {
    /// Channel cycles per 175 ns CPU clock tick.
    pub cycles_per_tick: u32,
    /// Cost of one sequencer state, excluding memory accesses.
    pub cycles_per_state: i32,
    pub cycles_per_read: i32,
    pub cycles_per_write: i32,
    /// How long the selector channel waits for a device to request
    /// service after a Control, Read or Write order starts, in ticks.
    pub chansr_timeout_ticks: u32,
}

impl Default for ChannelTiming {
    fn default() -> ChannelTiming {
        ChannelTiming {
            cycles_per_tick: 1,
            cycles_per_state: 2,
            cycles_per_read: 3,
            cycles_per_write: 3,
            chansr_timeout_ticks: 1000,
        }
    }
}

impl ChannelTiming {
    /// The cycle allowance for a burst covering `ticks_elapsed`
    /// clock ticks.
    pub fn cycles_for(&self, ticks_elapsed: u32) -> i32 {
        let cycles = u64::from(ticks_elapsed) * u64::from(self.cycles_per_tick);
        i32::value_from(cycles).unwrap_or(i32::MAX)
    }

    /// The extra allowance given to the multiplexer channel when a
    /// device starts a channel program.  It covers states C, A and B
    /// (four reads and one write between them) so that a program
    /// started by SIO has fetched its first order before the CPU
    /// executes its next instruction.
    pub fn sio_bias(&self) -> i32 {
        3 * self.cycles_per_state + 4 * self.cycles_per_read + self.cycles_per_write
    }
}

/// The cycles remaining in one service burst.  The count goes
/// negative when the last state of a burst overruns the allowance;
/// the overrun is carried into the next burst.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CycleBudget {
    remaining: i32,
}

impl CycleBudget {
    pub(crate) fn new(allowance: i32) -> CycleBudget {
        CycleBudget {
            remaining: allowance,
        }
    }

    pub(crate) fn unlimited() -> CycleBudget {
        CycleBudget::new(i32::MAX)
    }

    pub(crate) fn charge(&mut self, cycles: i32) {
        self.remaining = self.remaining.saturating_sub(cycles);
    }

    pub(crate) fn is_available(&self) -> bool {
        self.remaining > 0
    }

    /// The overrun to carry into the next burst.
    pub(crate) fn excess(&self) -> i32 {
        if self.remaining < 0 {
            -self.remaining
        } else {
            0
        }
    }
}

#[test]
fn test_cycles_for_saturates() {
    let timing = ChannelTiming {
        cycles_per_tick: 4,
        ..ChannelTiming::default()
    };
    assert_eq!(timing.cycles_for(10), 40);
    assert_eq!(timing.cycles_for(u32::MAX), i32::MAX);
}

#[test]
fn test_budget_carries_overrun() {
    let mut budget = CycleBudget::new(5);
    budget.charge(3);
    assert!(budget.is_available());
    assert_eq!(budget.excess(), 0);
    budget.charge(4);
    assert!(!budget.is_available());
    assert_eq!(budget.excess(), 2);
}

#[test]
fn test_sio_bias() {
    let timing = ChannelTiming::default();
    assert_eq!(timing.sio_bias(), 3 * 2 + 4 * 3 + 3);
}
