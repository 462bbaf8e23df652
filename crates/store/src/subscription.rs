use cellar_worker::Scope;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

struct Subscriber<T> {
	tx: mpsc::UnboundedSender<T>,
	scope: Option<Scope>,
}

/// Producer side of a stream: one unbounded queue per subscriber, so every
/// emission reaches every live subscriber no matter how far behind it is.
pub(crate) struct Fanout<T> {
	subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Default for Fanout<T> {
	fn default() -> Self {
		Self {
			subscribers: Mutex::new(Vec::new()),
		}
	}
}

impl<T: Clone> Fanout<T> {
	/// Delivers `item` to every live subscriber. Subscribers whose handle was
	/// dropped or whose scope ended are pruned here.
	pub(crate) fn send(&self, item: T) {
		self.subscribers.lock().retain(|sub| {
			if sub.scope.as_ref().is_some_and(Scope::is_ended) {
				return false;
			}
			sub.tx.send(item.clone()).is_ok()
		});
	}

	pub(crate) fn subscribe(&self, replay: Option<T>, scope: Option<&Scope>) -> Subscription<T> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.subscribers.lock().push(Subscriber { tx, scope: scope.cloned() });
		Subscription {
			replay,
			rx,
			scope: scope.cloned(),
		}
	}

	#[cfg(test)]
	pub(crate) fn subscriber_count(&self) -> usize {
		self.subscribers.lock().len()
	}
}

/// Consumer end of a cell or registry stream.
///
/// Delivers an optional replayed item first, then every emission made after
/// the subscription was taken, in emission order. When bound to a [`Scope`],
/// nothing is delivered once the scope has ended, including emissions that
/// were already queued.
#[derive(Debug)]
pub struct Subscription<T> {
	replay: Option<T>,
	rx: mpsc::UnboundedReceiver<T>,
	scope: Option<Scope>,
}

impl<T> Subscription<T> {
	/// Returns true once the bound scope has ended.
	pub fn is_released(&self) -> bool {
		self.scope.as_ref().is_some_and(Scope::is_ended)
	}

	/// Waits for the next item.
	///
	/// Returns `None` when the scope ends or the producer is gone.
	pub async fn recv(&mut self) -> Option<T> {
		if self.is_released() {
			return None;
		}
		if let Some(item) = self.replay.take() {
			return Some(item);
		}
		match &self.scope {
			Some(scope) => tokio::select! {
				biased;
				() = scope.ended() => None,
				item = self.rx.recv() => item,
			},
			None => self.rx.recv().await,
		}
	}

	/// Returns the next queued item without waiting.
	pub fn try_recv(&mut self) -> Option<T> {
		if self.is_released() {
			return None;
		}
		if let Some(item) = self.replay.take() {
			return Some(item);
		}
		match self.rx.try_recv() {
			Ok(item) => Some(item),
			Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
		}
	}

	/// Drains every queued item without waiting.
	pub fn drain(&mut self) -> Vec<T> {
		std::iter::from_fn(|| self.try_recv()).collect()
	}
}
