use super::DeviceCleaner;
use crate::{Error, Result, config::AcquireMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of lease activity since the guard was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuStats {
    pub acquired: usize,
    pub released: usize,
    pub in_use: bool,
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Single-holder lock around the GPU.
///
/// Wraps a semaphore with one permit. The device cleaner runs when a lease is
/// taken and again when it is released, so a holder always starts from
/// baseline memory even if the previous workload crashed.
pub struct GpuGuard {
    semaphore: Arc<Semaphore>,
    mode: AcquireMode,
    acquire_timeout: Option<Duration>,
    cleaner: Arc<dyn DeviceCleaner>,
    counters: Arc<Counters>,
}

impl GpuGuard {
    pub fn new(mode: AcquireMode, cleaner: Arc<dyn DeviceCleaner>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            mode,
            acquire_timeout: None,
            cleaner,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    pub async fn acquire(&self) -> Result<GpuLease> {
        let permit = match self.mode {
            AcquireMode::NonBlocking => {
                self.semaphore
                    .clone()
                    .try_acquire_owned()
                    .map_err(|e| match e {
                        TryAcquireError::NoPermits => Error::ResourceBusy,
                        TryAcquireError::Closed => Error::internal("GPU guard closed"),
                    })?
            }
            AcquireMode::Blocking => self.wait_for_permit().await?,
        };

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);

        let mut lease = GpuLease {
            id: Uuid::new_v4(),
            permit: Some(permit),
            cleaner: Arc::clone(&self.cleaner),
            counters: Arc::clone(&self.counters),
        };

        // Clear anything a crashed predecessor left behind.
        if let Err(e) = self.cleaner.reset().await {
            warn!("GPU cleanup before lease {} failed: {}", lease.id, e);
            lease.give_back();
            return Err(into_corrupted(e));
        }

        info!("GPU lease {} acquired", lease.id);
        Ok(lease)
    }

    async fn wait_for_permit(&self) -> Result<OwnedSemaphorePermit> {
        let pending = self.semaphore.clone().acquire_owned();

        let permit = match self.acquire_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Gave up waiting for the GPU after {:?}", limit);
                    return Err(Error::ResourceBusy);
                }
            },
            None => pending.await,
        };

        permit.map_err(|_| Error::internal("GPU guard closed"))
    }

    pub fn stats(&self) -> GpuStats {
        GpuStats {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
            in_use: self.semaphore.available_permits() == 0,
        }
    }
}

/// Exclusive claim on the GPU. Release it with [`GpuLease::release`].
pub struct GpuLease {
    id: Uuid,
    permit: Option<OwnedSemaphorePermit>,
    cleaner: Arc<dyn DeviceCleaner>,
    counters: Arc<Counters>,
}

impl GpuLease {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }

    /// Frees device memory, then gives the GPU to the next waiter.
    ///
    /// The lease is released even when cleanup fails; the error is reported as
    /// `ResourceCorrupted`. Calling this again is a no-op.
    pub async fn release(&mut self) -> Result<()> {
        if self.permit.is_none() {
            debug!("GPU lease {} already released", self.id);
            return Ok(());
        }

        let cleanup = self.cleaner.reset().await;
        self.give_back();

        match cleanup {
            Ok(()) => {
                info!("GPU lease {} released", self.id);
                Ok(())
            }
            Err(e) => {
                warn!("GPU lease {} released with failed cleanup: {}", self.id, e);
                Err(into_corrupted(e))
            }
        }
    }

    fn give_back(&mut self) {
        if self.permit.take().is_some() {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for GpuLease {
    fn drop(&mut self) {
        if self.permit.is_some() {
            warn!(
                "GPU lease {} dropped without release; the next holder will clean up",
                self.id
            );
            self.give_back();
        }
    }
}

fn into_corrupted(e: Error) -> Error {
    match e {
        Error::ResourceCorrupted(_) => e,
        other => Error::corrupted(other.to_string()),
    }
}
