//! # Kernel Configuration and Boot Interface
//!
//! Boot-time facts handed to the memory subsystem and the compile-time
//! layout constants it is built around.
//!
//! ## Boot Information ([`boot`])
//! What the loader tells the kernel about the machine. The virtual memory
//! manager only needs the amount of installed RAM, from which it derives
//! the number of 4 KiB frames to identity-map.
//!
//! ## Memory Layout ([`memory`])
//! ```text
//! Linear Address Space Layout (32-bit, paged isolation):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  page 0: never mapped           │
//! 0x0000_1000 ├─────────────────────────────────┤
//!             │  Identity map of physical RAM   │
//!             │  (kernel text, data, heap)      │
//!             │                                 │
//! USER_VM_BASE├─────────────────────────────────┤ 0x8000_0000
//!             │  Process image                  │
//!             │  (segments, stack, argv block)  │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! With segmented isolation there is no per-process linear range; each
//! process sees its image at offset 0 of its own code and data segments.
//! Paged processes see it the same way, through segments based at
//! `USER_VM_BASE`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;

pub use boot::BootInfo;
