//! # Physical Memory Management
//!
//! The kernel's physical frame pool and the ways the kernel touches
//! physical memory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              FramePool                              │
//! │    • one Page record per 4 KiB frame                │
//! │    • owning linear address + PTE back-pointer       │
//! │    • KERNEL / LOCKED / PAGEABLE / ALLOCATED flags   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ frames
//! ┌─────────────────▼───────────────────────────────────┐
//! │              PhysMapper                             │
//! │    • IdentityPhysMapper: the kernel's identity map  │
//! │    • EmulatedRam: host memory (tests, `emulation`)  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The pool itself is not synchronized; the kernel keeps it behind a
//! [`SpinLock`](https://docs.rs/kernel-sync) taken with interrupts masked,
//! since the page-fault handler allocates and frees frames too.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod frame_pool;
pub mod phys_mapper;

pub use frame_pool::{FramePool, Page, PageFlags, PinState};
#[cfg(any(test, feature = "emulation"))]
pub use phys_mapper::EmulatedRam;
pub use phys_mapper::IdentityPhysMapper;
