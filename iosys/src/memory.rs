//! Main memory, as seen by the I/O processor and the channels.
//!
//! The Series III addresses memory as up to sixteen banks of 64K
//! words.  Channel programs and the Device Reference Table live in
//! bank 0; data transfers may use any bank which exists.
use std::error;
use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use base::prelude::*;

/// The kinds of memory access the I/O subsystem makes.  The CPU may
/// treat them differently (for example for tracing or for timing
/// contention between the channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccessClass {
    /// Bank 0 access by the I/O processor itself.
    AbsoluteIop,
    /// Bank 0 access by the multiplexer channel (program words and
    /// the Device Reference Table).
    AbsoluteMpx,
    /// Data transfer by the multiplexer channel.
    DmaMpx,
    /// Bank 0 access by the selector channel.
    AbsoluteSel,
    /// Data transfer by the selector channel.
    DmaSel,
}

impl Display for AccessClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessClass::AbsoluteIop => "absolute IOP",
            AccessClass::AbsoluteMpx => "absolute MPX",
            AccessClass::DmaMpx => "DMA MPX",
            AccessClass::AbsoluteSel => "absolute SEL",
            AccessClass::DmaSel => "DMA SEL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOpFailure {
    NotMapped(PhysicalAddress),
}

impl Display for MemoryOpFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MemoryOpFailure::NotMapped(addr) => {
                write!(f, "address {addr} is not mapped to functioning memory")
            }
        }
    }
}

impl error::Error for MemoryOpFailure {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfiguration {
    /// Number of installed 64K-word banks (1 to 16).
    pub banks: u8,
}

impl Default for MemoryConfiguration {
    fn default() -> MemoryConfiguration {
        MemoryConfiguration { banks: 2 }
    }
}

const BANK_WORDS: usize = 1 << 16;

pub struct MemoryUnit {
    words: Vec<u16>,
}

impl Debug for MemoryUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryUnit")
            .field("size", &self.words.len())
            .finish_non_exhaustive()
    }
}

impl MemoryUnit {
    pub fn new(config: &MemoryConfiguration) -> MemoryUnit {
        let banks = usize::from(config.banks.clamp(1, 16));
        MemoryUnit {
            words: vec![0; banks * BANK_WORDS],
        }
    }

    pub fn fetch(&self, addr: PhysicalAddress) -> Result<u16, MemoryOpFailure> {
        match self.words.get(usize::from(addr)) {
            Some(word) => Ok(*word),
            None => {
                event!(Level::DEBUG, "fetch from unmapped address {addr}");
                Err(MemoryOpFailure::NotMapped(addr))
            }
        }
    }

    pub fn store(&mut self, addr: PhysicalAddress, value: u16) -> Result<(), MemoryOpFailure> {
        match self.words.get_mut(usize::from(addr)) {
            Some(word) => {
                *word = value;
                Ok(())
            }
            None => {
                event!(Level::DEBUG, "store to unmapped address {addr}");
                Err(MemoryOpFailure::NotMapped(addr))
            }
        }
    }

    /// Copy `words` into consecutive bank 0 locations starting at
    /// `start`.
    pub fn load(&mut self, start: u16, words: &[u16]) -> Result<(), MemoryOpFailure> {
        for (offset, word) in (start..=u16::MAX).zip(words.iter()) {
            self.store(PhysicalAddress::absolute(offset), *word)?;
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }
}

#[test]
fn test_fetch_and_store() {
    let mut mem = MemoryUnit::new(&MemoryConfiguration { banks: 1 });
    let addr = PhysicalAddress::absolute(0o200);
    assert_eq!(mem.fetch(addr), Ok(0));
    mem.store(addr, 0o123456).expect("bank 0 should be mapped");
    assert_eq!(mem.fetch(addr), Ok(0o123456));
}

#[test]
fn test_missing_bank_is_not_mapped() {
    let mut mem = MemoryUnit::new(&MemoryConfiguration { banks: 1 });
    let addr = PhysicalAddress::new(u4!(1), 0);
    assert_eq!(mem.fetch(addr), Err(MemoryOpFailure::NotMapped(addr)));
    assert_eq!(mem.store(addr, 1), Err(MemoryOpFailure::NotMapped(addr)));
}

#[test]
fn test_load() {
    let mut mem = MemoryUnit::new(&MemoryConfiguration::default());
    mem.load(0o100, &[1, 2, 3]).expect("bank 0 should be mapped");
    assert_eq!(mem.fetch(PhysicalAddress::absolute(0o102)), Ok(3));
    assert_eq!(mem.size(), 2 * BANK_WORDS);
}
