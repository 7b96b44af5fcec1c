//! # Typed 32-bit x86 Control Registers
//!
//! [`Cr0`] carries the paging enable bit, [`Cr2`] the faulting linear
//! address of the last page fault, and [`Cr3`] the physical base of the
//! active page directory. Loading and storing them is privileged and only
//! compiled with the `asm` feature on `x86`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr0;
mod cr2;
mod cr3;

pub use cr0::Cr0;
pub use cr2::Cr2;
pub use cr3::Cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
