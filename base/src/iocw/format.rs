use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use super::{
    ioaw_bank, is_illegal_chain, word_count, words_for_count, SioOrder, IOCW_CNTL,
};

/// One step of a channel program, as it appears in memory.  The
/// `Display` implementation produces the symbolic form used in traces
/// and listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramStep {
    pub iocw: u16,
    pub ioaw: u16,
}

impl ProgramStep {
    pub fn new(order: SioOrder, operand: u16, ioaw: u16) -> ProgramStep {
        ProgramStep {
            iocw: order.iocw(operand),
            ioaw,
        }
    }

    pub fn order(&self) -> SioOrder {
        SioOrder::decode(self.iocw)
    }

    /// Split a sequence of words into program steps.  A trailing odd
    /// word is ignored.
    pub fn from_words(words: &[u16]) -> Vec<ProgramStep> {
        words
            .chunks_exact(2)
            .map(|pair| ProgramStep {
                iocw: pair[0],
                ioaw: pair[1],
            })
            .collect()
    }
}

impl Display for ProgramStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let order = self.order();
        if is_illegal_chain(self.iocw) {
            write!(f, "{order}(DC)")?;
        } else {
            write!(f, "{order}")?;
        }
        match order {
            SioOrder::Interrupt => Ok(()),
            SioOrder::SetBank => write!(f, " {:o}", ioaw_bank(self.ioaw)),
            SioOrder::Control => write!(f, " {:04o},{:06o}", self.iocw & IOCW_CNTL, self.ioaw),
            SioOrder::Write | SioOrder::WriteChained | SioOrder::Read | SioOrder::ReadChained => {
                write!(
                    f,
                    " {},{:06o}",
                    words_for_count(word_count(self.iocw)),
                    self.ioaw
                )
            }
            SioOrder::Jump
            | SioOrder::JumpConditional
            | SioOrder::ReturnResidue
            | SioOrder::End
            | SioOrder::EndWithInterrupt
            | SioOrder::Sense => write!(f, " {:06o}", self.ioaw),
        }
    }
}
