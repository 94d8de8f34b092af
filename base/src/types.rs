//! Names for the narrow quantities used by the I/O hardware, and the
//! physical address formed from a bank number and a 16-bit offset.
use std::fmt::{self, Display, Formatter, Octal};

use serde::Serialize;

use super::error::ConversionFailed;
use super::unsigned::{Unsigned12Bit, Unsigned4Bit, Unsigned5Bit, Unsigned7Bit};

/// The direct I/O address of a device (0 to 127).
pub type DeviceNumber = Unsigned7Bit;

/// An interrupt priority.  Lower numbers are higher priorities.
pub type InterruptPriority = Unsigned5Bit;

/// A multiplexer channel service request number, which is also the
/// index of the channel's per-request register file.
pub type ServiceRequestNumber = Unsigned4Bit;

/// A memory bank number.
pub type Bank = Unsigned4Bit;

/// A channel word count, held as a 12-bit two's complement number.
pub type WordCount = Unsigned12Bit;

/// Size of the Device Reference Table entry for each device; the
/// entry for device `n` starts at absolute address `n * 4`.
pub const DRT_ENTRY_WORDS: u16 = 4;

/// The Device Reference Table address of a device's channel program
/// pointer.
pub fn drt_address(device_number: DeviceNumber) -> u16 {
    u16::from(device_number) * DRT_ENTRY_WORDS
}

/// A 20-bit physical memory address; four bits of bank number above
/// a 16-bit offset within the bank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    /// Combine a bank number and an offset (the `TO_PA` operation).
    pub const fn new(bank: Bank, offset: u16) -> PhysicalAddress {
        PhysicalAddress(((bank.bits() as u32) << 16) | offset as u32)
    }

    /// An address in bank 0, where the Device Reference Table and
    /// channel programs live.
    pub const fn absolute(offset: u16) -> PhysicalAddress {
        PhysicalAddress(offset as u32)
    }

    pub fn bank(&self) -> Bank {
        Bank::truncating_from((self.0 >> 16) as u8)
    }

    pub const fn offset(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl From<PhysicalAddress> for u32 {
    fn from(a: PhysicalAddress) -> u32 {
        a.0
    }
}

impl From<PhysicalAddress> for usize {
    fn from(a: PhysicalAddress) -> usize {
        a.0 as usize
    }
}

impl TryFrom<u32> for PhysicalAddress {
    type Error = ConversionFailed;
    fn try_from(n: u32) -> Result<PhysicalAddress, ConversionFailed> {
        if n > 0o3777777 {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(PhysicalAddress(n))
        }
    }
}

impl Octal for PhysicalAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Octal::fmt(&self.0, f)
    }
}

impl Display for PhysicalAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}.{:06o}", self.bank(), self.offset())
    }
}

#[test]
fn test_physical_address_parts() {
    let bank = Bank::try_from(3_u8).expect("test data should be in range");
    let pa = PhysicalAddress::new(bank, 0o177776);
    assert_eq!(pa.bank(), bank);
    assert_eq!(pa.offset(), 0o177776);
    assert_eq!(u32::from(pa), (3 << 16) | 0o177776);
    assert_eq!(pa.to_string(), "3.177776");
}

#[test]
fn test_drt_address() {
    let device = DeviceNumber::try_from(5_u8).expect("test data should be in range");
    assert_eq!(drt_address(device), 20);
    assert_eq!(drt_address(DeviceNumber::MAX), 508);
}

#[test]
fn test_physical_address_range() {
    assert!(PhysicalAddress::try_from(0xF_FFFF_u32).is_ok());
    assert_eq!(
        PhysicalAddress::try_from(0x10_0000_u32),
        Err(ConversionFailed::TooLarge)
    );
}
