//! The signals exchanged between the I/O processor, the channels and
//! device interfaces.
//!
//! Signals travel in sets; a single call to a device interface may
//! assert several inbound signals at once, and the device may answer
//! with several outbound signals.  The names follow the HP 3000
//! Series III hardware documentation.

use std::fmt::{self, Display, Formatter};
use std::ops::{BitOr, BitOrAssign};

use serde::Serialize;

use super::error::ConversionFailed;

/// Signals sent to a device interface.
///
/// These acronyms are upper case to follow the names in the
/// documentation.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum InboundSignal {
    // Direct I/O, from the IOP.
    DSETINT,
    DCONTSTB,
    DSTARTIO,
    DWRITESTB,
    DRESETINT,
    DSTATSTB,
    DSETMASK,
    DREADSTB,
    // Interrupt poll, power fail and device number, from the IOP
    // and the channels.
    INTPOLLIN,
    DEVNODB,
    PFWARN,
    // Channel program execution.
    ACKSR,
    TOGGLESR,
    TOGGLESIOOK,
    TOGGLEINXFER,
    TOGGLEOUTXFER,
    READNEXTWD,
    SETINT,
    SETJMP,
    PCMD1,
    PCONTSTB,
    PSTATSTB,
    PWRITESTB,
    PREADSTB,
    EOT,
    CHANSO,
    XFERERROR,
}

/// Signals returned by a device interface.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OutboundSignal {
    /// Interrupt request.
    INTREQ,
    /// The device accepts the interrupt poll; the data word is its
    /// device number.
    INTACK,
    /// The device passes the interrupt poll on.
    INTPOLLOUT,
    /// The device has ended the transfer early.
    DEVEND,
    /// A Conditional Jump should be taken.
    JMPMET,
    /// Selector channel acknowledgement of CHANSO.
    CHANACK,
    /// Selector channel service request.
    CHANSR,
    /// Multiplexer channel service request.
    SRn,
    /// Request for channel program start, or (when the channel is
    /// already busy) completion of a channel abort.
    REQ,
}

impl InboundSignal {
    pub const ALL: [InboundSignal; 27] = [
        InboundSignal::DSETINT,
        InboundSignal::DCONTSTB,
        InboundSignal::DSTARTIO,
        InboundSignal::DWRITESTB,
        InboundSignal::DRESETINT,
        InboundSignal::DSTATSTB,
        InboundSignal::DSETMASK,
        InboundSignal::DREADSTB,
        InboundSignal::INTPOLLIN,
        InboundSignal::DEVNODB,
        InboundSignal::PFWARN,
        InboundSignal::ACKSR,
        InboundSignal::TOGGLESR,
        InboundSignal::TOGGLESIOOK,
        InboundSignal::TOGGLEINXFER,
        InboundSignal::TOGGLEOUTXFER,
        InboundSignal::READNEXTWD,
        InboundSignal::SETINT,
        InboundSignal::SETJMP,
        InboundSignal::PCMD1,
        InboundSignal::PCONTSTB,
        InboundSignal::PSTATSTB,
        InboundSignal::PWRITESTB,
        InboundSignal::PREADSTB,
        InboundSignal::EOT,
        InboundSignal::CHANSO,
        InboundSignal::XFERERROR,
    ];
}

impl OutboundSignal {
    pub const ALL: [OutboundSignal; 9] = [
        OutboundSignal::INTREQ,
        OutboundSignal::INTACK,
        OutboundSignal::INTPOLLOUT,
        OutboundSignal::DEVEND,
        OutboundSignal::JMPMET,
        OutboundSignal::CHANACK,
        OutboundSignal::CHANSR,
        OutboundSignal::SRn,
        OutboundSignal::REQ,
    ];
}

/// This macro defines a set type over one of the signal enumerations.
/// Each signal occupies the bit given by its discriminant.
macro_rules! signal_set {
    ($SetT:ident, $SignalT:ty) => {
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $SetT {
            bits: u32,
        }

        impl $SetT {
            pub const fn empty() -> $SetT {
                $SetT { bits: 0 }
            }

            const fn bit(signal: $SignalT) -> u32 {
                1 << (signal as u32)
            }

            pub const fn contains(&self, signal: $SignalT) -> bool {
                self.bits & Self::bit(signal) != 0
            }

            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            pub fn insert(&mut self, signal: $SignalT) {
                self.bits |= Self::bit(signal);
            }

            pub fn remove(&mut self, signal: $SignalT) {
                self.bits &= !Self::bit(signal);
            }

            pub const fn with(self, signal: $SignalT) -> $SetT {
                $SetT {
                    bits: self.bits | Self::bit(signal),
                }
            }

            /// Add `signal` only when `condition` holds.
            pub const fn with_if(self, condition: bool, signal: $SignalT) -> $SetT {
                if condition {
                    self.with(signal)
                } else {
                    self
                }
            }

            /// The members of the set, in declaration order.
            pub fn iter(&self) -> impl Iterator<Item = $SignalT> + '_ {
                <$SignalT>::ALL
                    .into_iter()
                    .filter(move |signal| self.contains(*signal))
            }
        }

        impl From<$SignalT> for $SetT {
            fn from(signal: $SignalT) -> $SetT {
                $SetT::empty().with(signal)
            }
        }

        impl FromIterator<$SignalT> for $SetT {
            fn from_iter<I: IntoIterator<Item = $SignalT>>(iter: I) -> $SetT {
                iter.into_iter().fold($SetT::empty(), $SetT::with)
            }
        }

        impl BitOr<$SignalT> for $SignalT {
            type Output = $SetT;
            fn bitor(self, rhs: $SignalT) -> $SetT {
                $SetT::from(self).with(rhs)
            }
        }

        impl BitOr<$SignalT> for $SetT {
            type Output = $SetT;
            fn bitor(self, rhs: $SignalT) -> $SetT {
                self.with(rhs)
            }
        }

        impl BitOr<$SetT> for $SetT {
            type Output = $SetT;
            fn bitor(self, rhs: $SetT) -> $SetT {
                $SetT {
                    bits: self.bits | rhs.bits,
                }
            }
        }

        impl BitOrAssign<$SignalT> for $SetT {
            fn bitor_assign(&mut self, rhs: $SignalT) {
                self.insert(rhs);
            }
        }

        impl BitOrAssign<$SetT> for $SetT {
            fn bitor_assign(&mut self, rhs: $SetT) {
                self.bits |= rhs.bits;
            }
        }

        impl Display for $SetT {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                if self.is_empty() {
                    return f.write_str("(none)");
                }
                for (i, signal) in self.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{signal:?}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $SetT {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($SetT), "{{{}}}"), self)
            }
        }
    };
}

signal_set!(InboundSet, InboundSignal);
signal_set!(OutboundSet, OutboundSignal);

/// The response of a device interface: a set of outbound signals and
/// a data word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalsData {
    pub signals: OutboundSet,
    pub data: u16,
}

impl SignalsData {
    pub fn new<S: Into<OutboundSet>>(signals: S, data: u16) -> SignalsData {
        SignalsData {
            signals: signals.into(),
            data,
        }
    }

    /// A response carrying signals but no meaningful data.
    pub fn signals<S: Into<OutboundSet>>(signals: S) -> SignalsData {
        SignalsData::new(signals, 0)
    }

    /// The response of a device which ignores what it was sent.
    pub fn none() -> SignalsData {
        SignalsData::default()
    }

    pub fn has(&self, signal: OutboundSignal) -> bool {
        self.signals.contains(signal)
    }
}

/// The eight direct I/O commands the CPU can issue.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IoCommand {
    /// Set interrupt.
    SIN,
    /// Control I/O.
    CIO,
    /// Start I/O.
    SIO,
    /// Write I/O.
    WIO,
    /// Reset interrupt.
    RIN,
    /// Test I/O.
    TIO,
    /// Set interrupt mask.
    SMSK,
    /// Read I/O.
    RIO,
}

impl IoCommand {
    /// The direct I/O signal which carries the command to a device.
    pub fn signal(&self) -> InboundSignal {
        match self {
            IoCommand::SIN => InboundSignal::DSETINT,
            IoCommand::CIO => InboundSignal::DCONTSTB,
            IoCommand::SIO => InboundSignal::DSTARTIO,
            IoCommand::WIO => InboundSignal::DWRITESTB,
            IoCommand::RIN => InboundSignal::DRESETINT,
            IoCommand::TIO => InboundSignal::DSTATSTB,
            IoCommand::SMSK => InboundSignal::DSETMASK,
            IoCommand::RIO => InboundSignal::DREADSTB,
        }
    }
}

impl TryFrom<u8> for IoCommand {
    type Error = ConversionFailed;
    fn try_from(n: u8) -> Result<IoCommand, ConversionFailed> {
        match n {
            0 => Ok(IoCommand::SIN),
            1 => Ok(IoCommand::CIO),
            2 => Ok(IoCommand::SIO),
            3 => Ok(IoCommand::WIO),
            4 => Ok(IoCommand::RIN),
            5 => Ok(IoCommand::TIO),
            6 => Ok(IoCommand::SMSK),
            7 => Ok(IoCommand::RIO),
            _ => Err(ConversionFailed::TooLarge),
        }
    }
}

impl Display for IoCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[test]
fn test_signal_set_membership() {
    let mut set = InboundSignal::PREADSTB | InboundSignal::EOT;
    assert!(set.contains(InboundSignal::PREADSTB));
    assert!(set.contains(InboundSignal::EOT));
    assert!(!set.contains(InboundSignal::ACKSR));
    set |= InboundSignal::ACKSR;
    set.remove(InboundSignal::EOT);
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![InboundSignal::ACKSR, InboundSignal::PREADSTB]
    );
}

#[test]
fn test_signal_set_display() {
    assert_eq!(InboundSet::empty().to_string(), "(none)");
    let set: OutboundSet = [OutboundSignal::SRn, OutboundSignal::INTREQ]
        .into_iter()
        .collect();
    assert_eq!(set.to_string(), "INTREQ | SRn");
}

#[test]
fn test_with_if() {
    let set = InboundSet::from(InboundSignal::PWRITESTB)
        .with_if(false, InboundSignal::EOT)
        .with_if(true, InboundSignal::CHANSO);
    assert_eq!(set, InboundSignal::PWRITESTB | InboundSignal::CHANSO);
}

#[test]
fn test_all_signals_fit_in_a_set() {
    for signal in InboundSignal::ALL {
        assert!((signal as u32) < 32);
        assert!(InboundSet::from(signal).contains(signal));
    }
    for signal in OutboundSignal::ALL {
        assert!(OutboundSet::from(signal).contains(signal));
    }
}

#[test]
fn test_io_command_signals() {
    let signals: Vec<InboundSignal> = (0..8_u8)
        .map(|n| IoCommand::try_from(n).map(|c| c.signal()))
        .collect::<Result<_, _>>()
        .expect("all eight commands should decode");
    assert_eq!(
        signals,
        vec![
            InboundSignal::DSETINT,
            InboundSignal::DCONTSTB,
            InboundSignal::DSTARTIO,
            InboundSignal::DWRITESTB,
            InboundSignal::DRESETINT,
            InboundSignal::DSTATSTB,
            InboundSignal::DSETMASK,
            InboundSignal::DREADSTB,
        ]
    );
    assert_eq!(IoCommand::try_from(8_u8), Err(ConversionFailed::TooLarge));
}
