//! Process address spaces: layout, construction, and the reference count
//! of execution contexts attached to them.

use crate::isolation::MemoryIsolation;
use crate::{MemoryServices, ProcessError, ProcessorControl, argblock};
use alloc::sync::Arc;
use kernel_elf::ExecutableImage;
use kernel_info::memory::DEFAULT_USER_STACK_SIZE;
use kernel_memory_addresses::{PhysicalPage, round_up_to_page};
use kernel_sync::SpinLock;
use kernel_vmem::PhysMapper;
use log::{debug, info, warn};

/// Where the parts of a process image go.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Layout {
    /// Highest `start + size_in_memory` over all segments.
    pub segment_end: u32,
    /// Top of the stack, start of the argument block.
    pub stack_base: u32,
    pub arg_block_size: u32,
    /// Size of the backing store.
    pub total: u32,
}

impl Layout {
    /// `None` if the image does not fit 32 bits.
    #[must_use]
    pub fn compute(image: &ExecutableImage, arg_block_size: u32) -> Option<Self> {
        let segment_end = image.max_segment_end()?;
        let stack_base = round_up_to_page(segment_end)?.checked_add(round_up_to_page(DEFAULT_USER_STACK_SIZE)?)?;
        let total = stack_base.checked_add(round_up_to_page(arg_block_size)?)?;
        Some(Self {
            segment_end,
            stack_base,
            arg_block_size,
            total,
        })
    }
}

struct State<I> {
    ref_count: u32,
    memory: Option<I>,
}

/// The isolated memory of one process.
///
/// At most one execution context may be attached at a time. The backing
/// memory is released when the last context detaches.
pub struct AddressSpace<I> {
    entry: u32,
    stack_pointer: u32,
    arg_block: u32,
    size: u32,
    state: SpinLock<State<I>>,
}

impl<I: MemoryIsolation> AddressSpace<I> {
    fn new(memory: I, entry: u32, stack_base: u32) -> Self {
        let size = memory.size();
        Self {
            entry,
            stack_pointer: stack_base,
            arg_block: stack_base,
            size,
            state: SpinLock::new(State {
                ref_count: 0,
                memory: Some(memory),
            }),
        }
    }

    /// Process address of the first instruction.
    #[must_use]
    pub const fn entry(&self) -> u32 {
        self.entry
    }

    /// Initial stack pointer.
    #[must_use]
    pub const fn stack_pointer(&self) -> u32 {
        self.stack_pointer
    }

    /// Process address of the argument block.
    #[must_use]
    pub const fn arg_block(&self) -> u32 {
        self.arg_block
    }

    /// Size of the backing store.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    pub fn ref_count<M: PhysMapper>(&self, services: &MemoryServices<'_, M>) -> u32 {
        self.state.lock_irq(services.irq).ref_count
    }

    pub fn is_destroyed<M: PhysMapper>(&self, services: &MemoryServices<'_, M>) -> bool {
        self.state.lock_irq(services.irq).memory.is_none()
    }

    /// Run `f` on the backing memory.
    ///
    /// # Errors
    /// [`ProcessError::Destroyed`] once the memory has been released.
    pub fn with_memory<M: PhysMapper, R>(
        &self,
        services: &MemoryServices<'_, M>,
        f: impl FnOnce(&I) -> R,
    ) -> Result<R, ProcessError> {
        let state = self.state.lock_irq(services.irq);
        state.memory.as_ref().map(f).ok_or(ProcessError::Destroyed)
    }

    #[must_use]
    pub fn validate_range<M: PhysMapper>(&self, services: &MemoryServices<'_, M>, addr: u32, len: u32) -> bool {
        self.with_memory(services, |m| m.validate_range(addr, len))
            .unwrap_or(false)
    }

    /// See [`MemoryIsolation::copy_in`].
    ///
    /// # Errors
    /// As there, plus [`ProcessError::Destroyed`].
    pub fn copy_in<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        dest: &mut [u8],
        user_src: u32,
    ) -> Result<(), ProcessError> {
        self.with_memory(services, |m| m.copy_in(services, dest, user_src))?
    }

    /// See [`MemoryIsolation::copy_out`].
    ///
    /// # Errors
    /// As there, plus [`ProcessError::Destroyed`].
    pub fn copy_out<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        user_dest: u32,
        src: &[u8],
    ) -> Result<(), ProcessError> {
        self.with_memory(services, |m| m.copy_out(services, user_dest, src))?
    }

    /// Install this address space on `cpu`.
    ///
    /// # Errors
    /// [`ProcessError::Destroyed`].
    pub fn activate<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        cpu: &dyn ProcessorControl,
    ) -> Result<(), ProcessError> {
        self.with_memory(services, |m| m.activate(cpu))
    }

    pub fn page_directory<M: PhysMapper>(&self, services: &MemoryServices<'_, M>) -> Option<PhysicalPage> {
        self.with_memory(services, I::page_directory)
            .ok()
            .flatten()
    }

    /// Release a space no context was ever attached to, e.g. when starting
    /// its thread failed.
    pub fn discard<M: PhysMapper>(self, services: &MemoryServices<'_, M>) {
        if let Some(memory) = self.state.into_inner().memory {
            memory.release(services);
        }
    }

    fn attach<M: PhysMapper>(&self, services: &MemoryServices<'_, M>) -> Result<(), ProcessError> {
        let mut state = self.state.lock_irq(services.irq);
        if state.memory.is_none() {
            return Err(ProcessError::Destroyed);
        }
        if state.ref_count != 0 {
            return Err(ProcessError::AlreadyAttached);
        }
        state.ref_count += 1;
        Ok(())
    }

    /// Drop one reference. Returns whether the space was destroyed.
    fn detach<M: PhysMapper>(&self, services: &MemoryServices<'_, M>) -> bool {
        let memory = {
            let mut state = self.state.lock_irq(services.irq);
            if state.ref_count == 0 {
                warn!("detach from an address space with no contexts");
                return false;
            }
            state.ref_count -= 1;
            if state.ref_count > 0 {
                return false;
            }
            state.memory.take()
        };
        memory.is_some_and(|memory| {
            memory.release(services);
            true
        })
    }
}

/// The address space slot of one execution context.
///
/// Kernel-only contexts leave it empty.
pub struct ContextSlot<I> {
    space: Option<Arc<AddressSpace<I>>>,
}

impl<I> Default for ContextSlot<I> {
    fn default() -> Self {
        Self { space: None }
    }
}

impl<I: MemoryIsolation> ContextSlot<I> {
    /// A slot for a kernel-only context.
    #[must_use]
    pub const fn kernel() -> Self {
        Self { space: None }
    }

    #[must_use]
    pub const fn space(&self) -> Option<&Arc<AddressSpace<I>>> {
        self.space.as_ref()
    }

    /// Attach `space` to this context, making it a user process.
    ///
    /// # Errors
    /// [`ProcessError::AlreadyAttached`] if either side is already attached,
    /// [`ProcessError::Destroyed`] if the space is gone.
    pub fn attach<M: PhysMapper>(
        &mut self,
        space: Arc<AddressSpace<I>>,
        services: &MemoryServices<'_, M>,
    ) -> Result<(), ProcessError> {
        if self.space.is_some() {
            return Err(ProcessError::AlreadyAttached);
        }
        space.attach(services)?;
        self.space = Some(space);
        Ok(())
    }

    /// Detach the address space, if any, destroying it when this was the
    /// last reference. Returns whether it was destroyed.
    pub fn detach<M: PhysMapper>(&mut self, services: &MemoryServices<'_, M>) -> bool {
        self.space.take().is_some_and(|space| space.detach(services))
    }

    /// Install the attached address space before returning to user mode.
    /// Kernel-only contexts leave the processor alone.
    ///
    /// # Errors
    /// [`ProcessError::Destroyed`].
    pub fn activate_for<M: PhysMapper>(
        &self,
        services: &MemoryServices<'_, M>,
        cpu: &dyn ProcessorControl,
    ) -> Result<(), ProcessError> {
        self.space
            .as_ref()
            .map_or(Ok(()), |space| space.activate(services, cpu))
    }
}

/// Build the process image for `image` loaded from `file`, with
/// `command` as its argument block.
///
/// The result has no contexts attached.
///
/// # Errors
/// - [`ProcessError::OutOfMemory`] if the image does not fit 32 bits or
///   memory runs out.
/// - [`ProcessError::MalformedExecutable`] if a segment lies outside `file`
///   or outside the image.
///
/// Everything allocated so far is released on failure.
pub fn build<I: MemoryIsolation, M: PhysMapper>(
    services: &MemoryServices<'_, M>,
    file: &[u8],
    image: &ExecutableImage,
    command: &str,
) -> Result<AddressSpace<I>, ProcessError> {
    let args = argblock::measure(command).ok_or(ProcessError::OutOfMemory)?;
    let layout = Layout::compute(image, args.bytes).ok_or(ProcessError::OutOfMemory)?;
    debug!(
        "layout: segments end {:#x}, stack base {:#x}, argument block {:#x} bytes, total {:#x}",
        layout.segment_end, layout.stack_base, layout.arg_block_size, layout.total
    );

    let memory = I::allocate(services, layout.total)?;
    if let Err(e) = populate(&memory, services, file, image, command, &layout) {
        memory.release(services);
        return Err(e);
    }

    info!(
        "created {} address space: {:#x} bytes, entry {:#x}, {} arguments",
        I::KIND,
        layout.total,
        image.entry,
        args.argc
    );
    Ok(AddressSpace::new(memory, image.entry, layout.stack_base))
}

fn populate<I: MemoryIsolation, M: PhysMapper>(
    memory: &I,
    services: &MemoryServices<'_, M>,
    file: &[u8],
    image: &ExecutableImage,
    command: &str,
    layout: &Layout,
) -> Result<(), ProcessError> {
    for segment in image.segments() {
        let bytes = segment
            .file_bytes(file)
            .ok_or(ProcessError::MalformedExecutable)?;
        if bytes.is_empty() {
            continue;
        }
        memory
            .copy_out(services, segment.start_address, bytes)
            .map_err(|_| ProcessError::MalformedExecutable)?;
    }
    let block = argblock::format(command, layout.stack_base).ok_or(ProcessError::OutOfMemory)?;
    memory.copy_out(services, layout.stack_base, &block)
}
