use std::{process::Stdio, sync::Arc};

use tokio::{
	process::Command,
	sync::mpsc::{self, error::TrySendError},
};
use tracing::{debug, warn};

use crate::{BoxFuture, Error, Result};

/// Starts the external lineage viewer for a set of root uids.
pub trait Launcher
where
	Self: Send + Sync,
{
	fn launch<'a>(&'a self, root_uids: &'a [String]) -> BoxFuture<'a, Result<()>>;
}

/// Runs `program args... uid...` and reaps the child in the background.
pub struct ProcessLauncher {
	program: String,
	args: Vec<String>,
}
impl ProcessLauncher {
	pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
		Self { program: program.into(), args }
	}

	pub fn from_config(cfg: &lexgraph_config::Notifier) -> Self {
		Self::new(cfg.program.clone(), cfg.args.clone())
	}
}

impl Launcher for ProcessLauncher {
	fn launch<'a>(&'a self, root_uids: &'a [String]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut child = Command::new(&self.program)
				.args(&self.args)
				.args(root_uids)
				.stdin(Stdio::null())
				.spawn()
				.map_err(|err| Error::Notifier {
					message: format!("Failed to start {:?}: {err}.", self.program),
				})?;
			let program = self.program.clone();

			tokio::spawn(async move {
				match child.wait().await {
					Ok(status) if status.success() => {
						debug!(program = %program, "Notifier process exited.");
					},
					Ok(status) => {
						warn!(program = %program, status = %status, "Notifier process failed.");
					},
					Err(err) => {
						warn!(program = %program, error = %err, "Failed to wait for notifier process.");
					},
				}
			});

			Ok(())
		})
	}
}

/// Fire-and-forget handle for announcing expanded roots.
///
/// `notify` never blocks and never fails the caller. Root sets are queued to a background task
/// that owns the launcher; when the queue is full the set is dropped with a warning.
#[derive(Clone)]
pub struct Notifier {
	tx: Option<mpsc::Sender<Vec<String>>>,
}
impl Notifier {
	pub fn disabled() -> Self {
		Self { tx: None }
	}

	/// Starts the dispatch task. Must be called inside a Tokio runtime.
	pub fn spawn(launcher: Arc<dyn Launcher>, queue_capacity: usize) -> Self {
		let (tx, mut rx) = mpsc::channel::<Vec<String>>(queue_capacity.max(1));

		tokio::spawn(async move {
			while let Some(root_uids) = rx.recv().await {
				if let Err(err) = launcher.launch(&root_uids).await {
					warn!(roots = root_uids.len(), error = %err, "Notifier dispatch failed.");
				}
			}
		});

		Self { tx: Some(tx) }
	}

	pub fn from_config(cfg: &lexgraph_config::Notifier) -> Self {
		if !cfg.enabled {
			return Self::disabled();
		}

		Self::spawn(Arc::new(ProcessLauncher::from_config(cfg)), cfg.queue_capacity)
	}

	pub fn is_enabled(&self) -> bool {
		self.tx.is_some()
	}

	pub fn notify(&self, root_uids: Vec<String>) {
		let Some(tx) = self.tx.as_ref() else {
			return;
		};

		if root_uids.is_empty() {
			debug!("No roots to announce.");

			return;
		}

		match tx.try_send(root_uids) {
			Ok(()) => {},
			Err(TrySendError::Full(dropped)) => {
				warn!(roots = dropped.len(), "Notifier queue is full; dropping root set.");
			},
			Err(TrySendError::Closed(dropped)) => {
				warn!(roots = dropped.len(), "Notifier dispatcher stopped; dropping root set.");
			},
		}
	}
}

impl Default for Notifier {
	fn default() -> Self {
		Self::disabled()
	}
}
