use crate::collaborators::{FileSystem, Pid, Scheduler};
use crate::{SpawnError, VmContext};
use alloc::sync::Arc;
use kernel_process::{MemoryIsolation, build};
use kernel_swap::BlockDevice;
use kernel_vmem::PhysMapper;
use log::{info, warn};

/// Load the executable at `path` and start it with `command` as its
/// argument line.
///
/// Every resource taken on the way is given back if a later step fails.
///
/// # Errors
/// [`SpawnError`]; [`SpawnError::code`] tells a missing program apart from
/// every other failure.
pub fn spawn_process<M, D, I>(
    vm: &VmContext<'_, M, D>,
    fs: &dyn FileSystem,
    scheduler: &dyn Scheduler<I>,
    path: &str,
    command: &str,
) -> Result<Pid, SpawnError>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    spawn_inner(vm, fs, scheduler, path, command).inspect_err(|e| warn!("cannot spawn {path}: {e}"))
}

fn spawn_inner<M, D, I>(
    vm: &VmContext<'_, M, D>,
    fs: &dyn FileSystem,
    scheduler: &dyn Scheduler<I>,
    path: &str,
    command: &str,
) -> Result<Pid, SpawnError>
where
    M: PhysMapper,
    D: BlockDevice,
    I: MemoryIsolation,
{
    let file = fs.read_fully(path)?;
    let image = kernel_elf::parse(&file)?;
    let space = Arc::new(build::<I, M>(vm.memory(), &file, &image, command)?);

    let Some(pid) = scheduler.start_user_thread(Arc::clone(&space), false) else {
        // The scheduler kept no reference, so this is the only one.
        if let Ok(space) = Arc::try_unwrap(space) {
            space.discard(vm.memory());
        }
        return Err(SpawnError(crate::VmError::OutOfMemory));
    };
    info!("spawned {path} as pid {pid}");
    Ok(pid)
}
