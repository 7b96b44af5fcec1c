//! # Interrupt state
//!
//! [`InterruptControl`] abstracts the processor's interrupt-enable flag.
//! [`IrqGuard`] masks interrupts for a scope and restores the previous state
//! on drop; [`SpinLock::lock_irq`] pairs such a guard with a lock.
//!
//! Interrupts are modeled as asynchronous events that are only *delivered*
//! at preemption points, never in the middle of a critical section: while the
//! flag is clear, raised vectors stay pending.

use crate::{SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The processor's interrupt-enable flag.
pub trait InterruptControl {
    /// Whether maskable interrupts are currently enabled.
    fn are_enabled(&self) -> bool;

    /// Mask interrupts (`cli`).
    fn disable(&self);

    /// Unmask interrupts (`sti`).
    fn enable(&self);
}

impl<I: InterruptControl + ?Sized> InterruptControl for &I {
    #[inline]
    fn are_enabled(&self) -> bool {
        (**self).are_enabled()
    }

    #[inline]
    fn disable(&self) {
        (**self).disable();
    }

    #[inline]
    fn enable(&self) {
        (**self).enable();
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// Interrupts are re-enabled on drop **only** if they were enabled when the
/// guard was created, so guards nest.
///
/// ```
/// use kernel_sync::{InterruptControl, IrqGuard, SoftInterrupts};
///
/// let irq = SoftInterrupts::new(true);
/// {
///     let _outer = IrqGuard::new(&irq);
///     {
///         let _inner = IrqGuard::new(&irq);
///     }
///     assert!(!irq.are_enabled());
/// }
/// assert!(irq.are_enabled());
/// ```
pub struct IrqGuard<'a, I: InterruptControl + ?Sized> {
    ctl: &'a I,
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl<'a, I: InterruptControl + ?Sized> IrqGuard<'a, I> {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new(ctl: &'a I) -> Self {
        let were_enabled = ctl.are_enabled();
        if were_enabled {
            ctl.disable();
        }
        Self { ctl, were_enabled }
    }

    /// Whether interrupts will be re-enabled when this guard drops.
    #[inline]
    #[must_use]
    pub const fn restores(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.were_enabled {
            self.ctl.enable();
        }
    }
}

/// A spin lock guard that also keeps interrupts masked while held.
///
/// Field order matters: the lock is released before interrupts are restored.
pub struct IrqSpinLockGuard<'a, T, I: InterruptControl + ?Sized> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard<'a, I>,
}

impl<T> SpinLock<T> {
    /// Acquires the lock with interrupts disabled for the guard's lifetime.
    #[inline]
    pub fn lock_irq<'a, I: InterruptControl + ?Sized>(
        &'a self,
        ctl: &'a I,
    ) -> IrqSpinLockGuard<'a, T, I> {
        let irq = IrqGuard::new(ctl);
        let guard = self.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }

    /// Closure convenience over [`SpinLock::lock_irq`].
    #[inline]
    pub fn with_lock_irq<I: InterruptControl + ?Sized, R>(
        &self,
        ctl: &I,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut g = self.lock_irq(ctl);
        f(&mut g)
    }
}

impl<T, I: InterruptControl + ?Sized> Deref for IrqSpinLockGuard<'_, T, I> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, I: InterruptControl + ?Sized> DerefMut for IrqSpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Software model of the interrupt flag with a pending-vector latch.
///
/// Vectors `0..64` can be raised at any time; [`SoftInterrupts::take_pending`]
/// only hands them out while interrupts are enabled, which is what a
/// preemption point does.
#[derive(Debug)]
pub struct SoftInterrupts {
    enabled: AtomicBool,
    pending: AtomicU64,
}

impl SoftInterrupts {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            pending: AtomicU64::new(0),
        }
    }

    /// Latch `vector` for delivery at the next preemption point.
    ///
    /// # Panics
    /// If `vector` is 64 or above.
    pub fn raise(&self, vector: u8) {
        assert!(vector < 64, "vector {vector} out of range");
        self.pending.fetch_or(1 << vector, Ordering::AcqRel);
    }

    /// Deliver the lowest pending vector, if interrupts are enabled.
    pub fn take_pending(&self) -> Option<u8> {
        if !self.are_enabled() {
            return None;
        }
        let mut current = self.pending.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return None;
            }
            let vector = current.trailing_zeros();
            match self.pending.compare_exchange_weak(
                current,
                current & !(1 << vector),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                #[allow(clippy::cast_possible_truncation)]
                Ok(_) => return Some(vector as u8),
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether any vector is latched.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }
}

impl Default for SoftInterrupts {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InterruptControl for SoftInterrupts {
    fn are_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }
}

/// The `IF` flag of a 32-bit x86 processor.
///
/// # Safety & Privilege
///
/// `cli`/`sti` must only execute where they are permitted (ring 0).
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuInterrupts;

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl CpuInterrupts {
    /// Returns the current `EFLAGS` value (via `pushfd/pop`).
    #[inline]
    #[must_use]
    pub fn eflags() -> u32 {
        let r: u32;
        // SAFETY: pushes and pops one word of our own stack
        unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(preserves_flags)) }
        r
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl InterruptControl for CpuInterrupts {
    #[inline]
    fn are_enabled(&self) -> bool {
        Self::eflags() & (1 << 9) != 0
    }

    #[inline]
    fn disable(&self) {
        // SAFETY: ring 0
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    fn enable(&self) {
        // SAFETY: ring 0; callers only enable after their own disable
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}
