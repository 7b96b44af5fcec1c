//! Trap handlers owned by the memory subsystem, and a software vector table
//! to run them on.
//!
//! [`VectorTable`] stands in for the IDT where there is no processor to
//! dispatch through. Exceptions arrive synchronously through
//! [`VectorTable::trap`]; device interrupts are latched in
//! [`SoftInterrupts`] and only reach their handler at a preemption point,
//! [`VectorTable::deliver_pending`], with interrupts masked as an interrupt
//! gate would.

pub mod page_fault;

use crate::collaborators::{InterruptTable, TrapFrame, TrapHandler};
use kernel_sync::{InterruptControl, SoftInterrupts};
use log::{trace, warn};

const VECTORS: usize = 256;

pub struct VectorTable<'k> {
    handlers: [Option<&'k dyn TrapHandler>; VECTORS],
}

impl<'k> VectorTable<'k> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handlers: [None; VECTORS],
        }
    }

    #[must_use]
    pub fn is_installed(&self, vector: u8) -> bool {
        self.handlers[usize::from(vector)].is_some()
    }

    /// Number of vectors with a handler.
    #[must_use]
    pub fn installed(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Deliver `frame` to the handler for its vector, leaving the interrupt
    /// flag as it is. Returns `false` if no handler is installed.
    pub fn trap(&self, frame: &TrapFrame) -> bool {
        let Some(handler) = self.handlers[usize::from(frame.vector)] else {
            warn!("unhandled trap: {frame}");
            return false;
        };
        handler.handle(frame);
        true
    }

    /// A preemption point: hand every latched vector to its handler, one at
    /// a time and with interrupts masked. Returns the number delivered.
    ///
    /// Nothing is delivered while interrupts are masked.
    pub fn deliver_pending(&self, irq: &SoftInterrupts) -> usize {
        let mut delivered = 0;
        while let Some(vector) = irq.take_pending() {
            trace!("delivering vector {vector}");
            irq.disable();
            if self.trap(&TrapFrame {
                vector,
                ..TrapFrame::default()
            }) {
                delivered += 1;
            }
            irq.enable();
        }
        delivered
    }
}

impl Default for VectorTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'k> InterruptTable<'k> for VectorTable<'k> {
    fn install_handler(&mut self, vector: u8, handler: &'k dyn TrapHandler) {
        if self.handlers[usize::from(vector)].replace(handler).is_some() {
            warn!("replaced the handler for vector {vector}");
        }
    }
}
