use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::TaskClass;

/// Origin recorded for tasks started by an element that has no path yet.
const UNWIRED: &str = "<unwired>";

static FALLBACK: OnceLock<Runtime> = OnceLock::new();

/// Runtime for continuations started outside any tokio context, such as a
/// load kicked off from a plain thread. One worker is enough: store tasks
/// only await producers and fan out emissions.
fn fallback() -> &'static Runtime {
	FALLBACK.get_or_init(|| {
		Builder::new_multi_thread()
			.worker_threads(1)
			.thread_name("cellar-fallback")
			.enable_time()
			.build()
			.expect("cellar: cannot start fallback runtime")
	})
}

/// Spawns a store task inside a `cellar.task` span carrying its class and the
/// path of the element that started it.
///
/// Runs on the caller's runtime when there is one, so a continuation shares
/// the scheduler (and paused clock, in tests) of the code that started it.
pub fn spawn<F>(class: TaskClass, origin: Option<&str>, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let origin = origin.unwrap_or(UNWIRED);
	let span = tracing::trace_span!("cellar.task", class = class.as_str(), origin);
	let fut = fut.instrument(span);
	match Handle::try_current() {
		Ok(handle) => handle.spawn(fut),
		Err(_) => {
			tracing::trace!(class = class.as_str(), origin, "cellar.task.fallback");
			fallback().spawn(fut)
		}
	}
}
