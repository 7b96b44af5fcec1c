//! # Kernel synchronization primitives
//!
//! The kernel runs on a single core, so the only sources of concurrency are
//! interrupts and the preemption they cause. Shared state is guarded by a
//! [`SpinLock`] per resource; code that can race an interrupt handler for the
//! same resource takes the lock through [`SpinLock::lock_irq`], which masks
//! interrupts for exactly the lifetime of the guard.
//!
//! Interrupt masking itself goes through the [`InterruptControl`] seam so
//! that the same code runs against the CPU's `IF` flag on bare metal and
//! against [`SoftInterrupts`] on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{InterruptControl, IrqGuard, IrqSpinLockGuard, SoftInterrupts};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
