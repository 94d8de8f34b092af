//! The I/O subsystem of the HP 3000 Series III: the I/O processor
//! (IOP), the multiplexer channel (MPX) and the selector channel
//! (SEL).
//!
//! The CPU drives everything.  It calls [`IoSystem::iop_direct_io`]
//! to execute direct I/O instructions, [`IoSystem::iop_poll`] to look
//! for interrupts, and [`IoSystem::mpx_service`] and
//! [`IoSystem::sel_service`] after each instruction to let the
//! channels run channel programs for the time which has passed.
//! Devices implement [`device::Device`].
//!
//! Nothing here runs concurrently.  A caller on a multi-threaded
//! runtime must serialize all access to an `IoSystem`.

pub mod cpu;
pub mod device;
mod fault;
mod flags;
pub mod iop;
pub mod memory;
pub mod mpx;
pub mod sel;
mod system;
pub mod timing;

#[cfg(test)]
mod testing;

pub use fault::AbortReason;
pub use system::IoSystem;
