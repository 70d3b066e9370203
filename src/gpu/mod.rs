mod cleaner;
mod guard;

pub use cleaner::{CommandCleaner, DeviceCleaner, NoopCleaner};
pub use guard::{GpuGuard, GpuLease, GpuStats};
