//! Binary and symbolic representations of channel program words.
//!
//! Each step of a channel program occupies two 16-bit words: an I/O
//! Control Word (IOCW) followed by an I/O Address Word (IOAW).  Bits
//! are numbered from 0 at the most significant end, as in the HP
//! documentation.
//!
//! |DC   |Order  |Order/count|Word count or control bits|
//! |-----|-------|-----------|--------------------------|
//! |1 bit|3 bits |1 bit      |11 bits                   |
//! |(0)  |(1-3)  |(4)        |(5-15)                    |
//!
//! Bits 0 to 4 select the order through a 32-entry table.  For the
//! Write and Read orders bit 0 is the data chain flag; for the other
//! orders a set bit 0 is an error which the channels detect
//! separately.  For Interrupt, Control, Sense, Write and Read, bit 4
//! belongs to the operand, so those orders appear twice in each half
//! of the table.
//!
//! The IOAW is the memory address of the data (Read, Write), the
//! jump target (Jump, Conditional Jump), the place where a result is
//! stored (Return Residue, Sense, End) or the bank number (Set Bank,
//! low four bits).

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::{proptest, Arbitrary};

use super::types::{Bank, WordCount};

mod format;

pub use format::ProgramStep;

/// The data chain flag.
pub const IOCW_DC: u16 = 0o100000;
/// The bits which identify the general class of an order.  Chained
/// orders must agree with their predecessor in these bits.
pub const IOCW_SIO_MASK: u16 = 0o070000;
/// The bits which are decoded to select the order.
pub const IOCW_ORDER_MASK: u16 = 0o174000;
const IOCW_ORDER_SHIFT: u32 = 11;
/// The word count of a Read or Write order.
pub const IOCW_WCNT: u16 = 0o007777;
/// The control bits of a Control order.
pub const IOCW_CNTL: u16 = 0o007777;
/// The bank number field of the IOAW of a Set Bank order.
pub const IOAW_BANK: u16 = 0o000017;

/// The decoded order of one channel program step.  The declaration
/// order matters: every order from `Write` onwards transfers data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum SioOrder {
    Jump,
    JumpConditional,
    ReturnResidue,
    SetBank,
    Interrupt,
    End,
    EndWithInterrupt,
    Control,
    Sense,
    Write,
    WriteChained,
    Read,
    ReadChained,
}

/// Order decode table, indexed by IOCW bits 0 to 4.
const TO_SIO_ORDER: [SioOrder; 32] = [
    SioOrder::Jump,             // 000 0
    SioOrder::JumpConditional,  // 000 1
    SioOrder::ReturnResidue,    // 001 0
    SioOrder::SetBank,          // 001 1
    SioOrder::Interrupt,        // 010 x
    SioOrder::Interrupt,        //
    SioOrder::End,              // 011 0
    SioOrder::EndWithInterrupt, // 011 1
    SioOrder::Control,          // 100 x
    SioOrder::Control,          //
    SioOrder::Sense,            // 101 x
    SioOrder::Sense,            //
    SioOrder::Write,            // 110 x
    SioOrder::Write,            //
    SioOrder::Read,             // 111 x
    SioOrder::Read,             //
    SioOrder::Jump,             // DC 000 0
    SioOrder::JumpConditional,  // DC 000 1
    SioOrder::ReturnResidue,    // DC 001 0
    SioOrder::SetBank,          // DC 001 1
    SioOrder::Interrupt,        // DC 010 x
    SioOrder::Interrupt,        //
    SioOrder::End,              // DC 011 0
    SioOrder::EndWithInterrupt, // DC 011 1
    SioOrder::Control,          // DC 100 x
    SioOrder::Control,          //
    SioOrder::Sense,            // DC 101 x
    SioOrder::Sense,            //
    SioOrder::WriteChained,     // DC 110 x
    SioOrder::WriteChained,     //
    SioOrder::ReadChained,      // DC 111 x
    SioOrder::ReadChained,      //
];

impl SioOrder {
    pub const ALL: [SioOrder; 13] = [
        SioOrder::Jump,
        SioOrder::JumpConditional,
        SioOrder::ReturnResidue,
        SioOrder::SetBank,
        SioOrder::Interrupt,
        SioOrder::End,
        SioOrder::EndWithInterrupt,
        SioOrder::Control,
        SioOrder::Sense,
        SioOrder::Write,
        SioOrder::WriteChained,
        SioOrder::Read,
        SioOrder::ReadChained,
    ];

    /// Decode the order of an IOCW (the `IOCW_ORDER` operation).
    pub fn decode(iocw: u16) -> SioOrder {
        SioOrder::from_prefix(order_prefix(iocw))
    }

    /// Decode a five-bit order prefix (IOCW bits 0 to 4).  Bits above
    /// the low five are ignored.
    pub fn from_prefix(prefix: u8) -> SioOrder {
        TO_SIO_ORDER[usize::from(prefix & 0o37)]
    }

    /// Build an IOCW for this order.  The operand is the word count
    /// of a Read or Write order or the control bits of a Control
    /// order.  Bits of the operand which would change the order are
    /// discarded.
    pub fn iocw(self, operand: u16) -> u16 {
        let (order_bits, operand_mask) = match self {
            SioOrder::Jump => (0o000000, 0o003777),
            SioOrder::JumpConditional => (0o004000, 0o003777),
            SioOrder::ReturnResidue => (0o010000, 0o003777),
            SioOrder::SetBank => (0o014000, 0o003777),
            SioOrder::Interrupt => (0o020000, 0o007777),
            SioOrder::End => (0o030000, 0o003777),
            SioOrder::EndWithInterrupt => (0o034000, 0o003777),
            SioOrder::Control => (0o040000, IOCW_CNTL),
            SioOrder::Sense => (0o050000, 0o007777),
            SioOrder::Write => (0o060000, IOCW_WCNT),
            SioOrder::WriteChained => (IOCW_DC | 0o060000, IOCW_WCNT),
            SioOrder::Read => (0o070000, IOCW_WCNT),
            SioOrder::ReadChained => (IOCW_DC | 0o070000, IOCW_WCNT),
        };
        order_bits | (operand & operand_mask)
    }

    /// True for the orders which move data words (those from `Write`
    /// onwards).
    pub fn is_data_transfer(&self) -> bool {
        *self >= SioOrder::Write
    }

    pub fn is_chained(&self) -> bool {
        matches!(self, SioOrder::WriteChained | SioOrder::ReadChained)
    }

    pub fn is_read(&self) -> bool {
        matches!(self, SioOrder::Read | SioOrder::ReadChained)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, SioOrder::Write | SioOrder::WriteChained)
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            SioOrder::Jump => "JUMP",
            SioOrder::JumpConditional => "JUMPC",
            SioOrder::ReturnResidue => "RTRES",
            SioOrder::SetBank => "SBANK",
            SioOrder::Interrupt => "INTRP",
            SioOrder::End => "END",
            SioOrder::EndWithInterrupt => "ENDIN",
            SioOrder::Control => "CNTL",
            SioOrder::Sense => "SENSE",
            SioOrder::Write => "WRITE",
            SioOrder::WriteChained => "WRITEC",
            SioOrder::Read => "READ",
            SioOrder::ReadChained => "READC",
        }
    }
}

impl Display for SioOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// IOCW bits 0 to 4, right-justified.
pub fn order_prefix(iocw: u16) -> u8 {
    ((iocw & IOCW_ORDER_MASK) >> IOCW_ORDER_SHIFT) as u8
}

/// The word count field of an IOCW.
pub fn word_count(iocw: u16) -> WordCount {
    WordCount::truncating_from(iocw & IOCW_WCNT)
}

/// Sign-extend a 12-bit residue to a full word (the `IOCW_COUNT`
/// operation), as stored by a Return Residue order.
pub fn iocw_count(count: WordCount) -> u16 {
    let w = u16::from(count);
    if w & 0o4000 != 0 {
        w | 0o170000
    } else {
        w
    }
}

/// The bank number carried in the IOAW of a Set Bank order.
pub fn ioaw_bank(ioaw: u16) -> Bank {
    Bank::truncating_from((ioaw & IOAW_BANK) as u8)
}

/// True if the data chain flag is set on an order which cannot be
/// chained.
pub fn is_illegal_chain(iocw: u16) -> bool {
    iocw & IOCW_DC != 0 && !SioOrder::decode(iocw).is_data_transfer()
}

/// True if two IOCWs belong to the same general class of order, as
/// a chained order must.
pub fn same_order_class(current: u16, next: u16) -> bool {
    (current & IOCW_SIO_MASK) == (next & IOCW_SIO_MASK)
}

/// The word count field which transfers `words` words, for `words`
/// between 1 and 4096.
pub fn count_for_words(words: u16) -> Option<WordCount> {
    if (1..=0o10000).contains(&words) {
        Some(WordCount::truncating_from(0o10000 - words))
    } else {
        None
    }
}

/// The number of words (1 to 4096) which a word count field
/// transfers.
pub fn words_for_count(count: WordCount) -> u16 {
    0o10000 - u16::from(count)
}

#[cfg(test)]
#[proptest]
fn decode_inverts_iocw(order: SioOrder, operand: u16) {
    assert_eq!(SioOrder::decode(order.iocw(operand)), order);
}
