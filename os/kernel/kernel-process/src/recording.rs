//! A processor model that records privileged operations instead of
//! performing them.

use crate::{ProcessorControl, SegmentSelector};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::TranslationControl;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CpuEvent {
    LoadDirectory(PhysicalPage),
    EnablePaging,
    InvalidatePage(VirtualAddress),
    LoadLdt(SegmentSelector),
}

#[derive(Default)]
pub struct RecordingProcessor {
    events: SpinLock<Vec<CpuEvent>>,
    paging: AtomicBool,
}

impl RecordingProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<CpuEvent> {
        self.events.lock().clone()
    }

    /// Everything recorded so far, clearing the log.
    pub fn take(&self) -> Vec<CpuEvent> {
        core::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: CpuEvent) {
        self.events.lock().push(event);
    }
}

impl TranslationControl for RecordingProcessor {
    fn load_directory(&self, directory: PhysicalPage) {
        self.record(CpuEvent::LoadDirectory(directory));
    }

    fn enable_paging(&self) {
        self.paging.store(true, Ordering::Release);
        self.record(CpuEvent::EnablePaging);
    }

    fn paging_enabled(&self) -> bool {
        self.paging.load(Ordering::Acquire)
    }

    fn invalidate_page(&self, va: VirtualAddress) {
        self.record(CpuEvent::InvalidatePage(va));
    }
}

impl ProcessorControl for RecordingProcessor {
    fn load_ldt(&self, selector: SegmentSelector) {
        self.record(CpuEvent::LoadLdt(selector));
    }
}
