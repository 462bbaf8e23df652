//! End-to-end behavior of a store tree built from the public API.

use std::sync::Arc;
use std::time::Duration;

use cellar_store::{Cell, LoadOutcome, LogSink, Registry, Scope, StoreConfig, StoreElement, StoreTree, initialize};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq)]
struct User {
	id: u32,
	name: String,
}

#[derive(Debug, Clone, PartialEq)]
struct WorkPackage {
	subject: String,
}

#[derive(StoreTree)]
struct Users {
	current: Cell<User>,
	detail: Cell<User>,
}

#[derive(StoreTree)]
struct Store {
	users: Users,
	#[store(rename = "workPackages")]
	work_packages: Registry<WorkPackage>,
	#[store(skip)]
	config: StoreConfig,
}

impl Store {
	fn new(config: StoreConfig) -> Self {
		Self {
			users: Users {
				current: Cell::with_config(&config),
				detail: Cell::with_config(&config),
			},
			work_packages: Registry::with_config(&config),
			config,
		}
	}
}

#[derive(StoreTree)]
struct Tabs(Cell<u32>, #[store(skip)] Cell<u32>);

#[derive(StoreTree)]
struct Panel<T: Clone + Send + 'static> {
	value: Cell<T>,
}

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn capture() -> (LogSink, Arc<Mutex<Vec<String>>>) {
	let lines = Arc::new(Mutex::new(Vec::new()));
	let sink_lines = Arc::clone(&lines);
	let sink: LogSink = Arc::new(move |line: &str| sink_lines.lock().push(line.to_string()));
	(sink, lines)
}

#[test]
fn derive_assigns_nested_paths() {
	init_tracing();
	let store = Store::new(StoreConfig::default());
	assert_eq!(initialize(&store, None), Ok(3));

	assert_eq!(store.users.current.path(), Some("users.current"));
	assert_eq!(store.users.detail.path(), Some("users.detail"));
	assert_eq!(store.work_packages.path(), Some("workPackages"));
	assert_eq!(store.config.stale_after_ms, 30_000);
}

#[test]
fn tuple_and_generic_structs() {
	let tabs = Tabs(Cell::new(), Cell::new());
	assert_eq!(initialize(&tabs, None), Ok(1));
	assert_eq!(tabs.0.path(), Some("0"));
	assert_eq!(tabs.1.path(), None);

	let panel = Panel::<String> { value: Cell::new() };
	assert_eq!(initialize(&panel, None), Ok(1));
	assert_eq!(panel.value.path(), Some("value"));
}

#[tokio::test]
async fn load_lifecycle_is_reported_to_the_sink() {
	init_tracing();
	let (sink, lines) = capture();
	let store = Store::new(StoreConfig::default());
	initialize(&store, Some(sink)).unwrap();

	let current = &store.users.current;
	let handle = current
		.put_from_async_load_if_pristine(|| async {
			Ok::<_, String>(User {
				id: 1,
				name: "ada".to_string(),
			})
		})
		.unwrap();
	assert_eq!(handle.settled().await, LoadOutcome::Stored);

	let failed = store.users.detail.put_from_async_load(async { Err::<User, _>("404 not found") });
	assert_eq!(failed.settled().await, LoadOutcome::Failed);

	store.users.current.clear_with_reason("logout");

	assert_eq!(
		*lines.lock(),
		vec![
			"[users.current] clear() // async load started",
			"[users.current] put_from_async_load(...)",
			"[users.detail] clear() // async load started",
			"[users.detail] put_from_async_load failed // 404 not found",
			"[users.current] clear() // logout",
		]
	);
}

#[tokio::test]
async fn registry_drives_a_keyed_consumer() {
	init_tracing();
	let store = Store::new(StoreConfig::default());
	initialize(&store, None).unwrap();

	let scope = Scope::new();
	let mut changed = store.work_packages.subscribe(Some(&scope));

	store.work_packages.get("1").put(WorkPackage {
		subject: "Write docs".to_string(),
	});
	store.work_packages.get("2").put(WorkPackage {
		subject: "Fix login".to_string(),
	});
	store.work_packages.get("1").clear();

	let mut seen = Vec::new();
	for _ in 0..3 {
		let key = changed.recv().await.unwrap();
		let member = store.work_packages.get(&key);
		seen.push((key, member.peek().map(|wp| wp.subject)));
	}
	assert_eq!(
		seen,
		vec![
			("1".to_string(), None),
			("2".to_string(), Some("Fix login".to_string())),
			("1".to_string(), None),
		]
	);

	scope.end();
	store.work_packages.get("3").put(WorkPackage {
		subject: "Unseen".to_string(),
	});
	assert_eq!(changed.recv().await, None);
}

#[tokio::test]
async fn concurrent_consumers_share_a_single_load() {
	let store = Store::new(StoreConfig::default());
	let detail = store.users.detail.clone();
	let (tx, rx) = tokio::sync::oneshot::channel::<User>();
	let mut rx = Some(rx);

	let mut handles = Vec::new();
	for _ in 0..4 {
		if let Some(handle) = detail.put_from_async_load_if_pristine(|| {
			let rx = rx.take();
			async move {
				match rx {
					Some(rx) => rx.await.map_err(|err| err.to_string()),
					None => Err("load started twice".to_string()),
				}
			}
		}) {
			handles.push(handle);
		}
	}
	assert_eq!(handles.len(), 1);

	let waiters: Vec<_> = (0..3)
		.map(|_| {
			let detail = detail.clone();
			tokio::spawn(async move { detail.await_value().await })
		})
		.collect();

	tx.send(User {
		id: 7,
		name: "grace".to_string(),
	})
	.unwrap();
	for handle in handles {
		assert_eq!(handle.settled().await, LoadOutcome::Stored);
	}
	for waiter in waiters {
		assert_eq!(waiter.await.unwrap().id, 7);
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn polling_consumer_refreshes_stale_cells() {
	let config = StoreConfig::from_toml_str("stale_after_ms = 1000").unwrap();
	let store = Store::new(config);
	let current = &store.users.current;
	let loads = Arc::new(Mutex::new(0u32));

	let refresh = |cell: &Cell<User>| {
		if cell.is_stale() {
			let loads = Arc::clone(&loads);
			Some(cell.put_from_async_load(async move {
				let mut count = loads.lock();
				*count += 1;
				Ok::<_, String>(User {
					id: *count,
					name: "ada".to_string(),
				})
			}))
		} else {
			None
		}
	};

	refresh(current).unwrap().settled().await;
	assert_eq!(current.peek().map(|u| u.id), Some(1));
	assert!(refresh(current).is_none());

	tokio::time::advance(Duration::from_millis(1001)).await;
	refresh(current).unwrap().settled().await;
	assert_eq!(current.peek().map(|u| u.id), Some(2));
}
