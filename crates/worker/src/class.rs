/// Execution classes used to tag spawned store work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Consumer callbacks forwarding stream emissions.
	Observer,
	/// Continuations of asynchronous loads populating a cell.
	Load,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Observer => "observer",
			Self::Load => "load",
		}
	}
}
