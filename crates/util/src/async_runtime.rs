//! Bridge from the synchronous step contract to async HTTP adapters.
//!
//! Build steps run one after another on a plain thread, while the REST client
//! is async. [`block_on_future`] drives a future to completion from such a
//! thread without caring whether a Tokio runtime already exists.

use std::future::Future;

use anyhow::Context;
use tokio::{runtime::Handle, task};

/// Runs `future` to completion on the current thread.
///
/// When called inside a Tokio runtime (a worker or a `spawn_blocking` thread)
/// the ambient runtime drives the future; otherwise a throwaway
/// current-thread runtime is built for the call.
pub fn block_on_future<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => task::block_in_place(|| handle.block_on(future)),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build fallback tokio runtime")?
            .block_on(future),
    }
}
