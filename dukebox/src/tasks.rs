//! Running many small tasks on a fixed number of threads.
//!
//! Every task runs to its end, even if others fail. A task panicking counts as the task failing. Errors are annotated
//! with the name of the task.
//!
//! There are two ways of waiting for the tasks:
//! - [`TaskRunner::invoke_all`] and [`TaskRunner::consume_all`] block until all tasks are done.
//! - [`TaskRunner::submit_invoke_all`] and [`TaskRunner::submit_consume_all`] give back a [`Batch`], which is a
//!   [`Future`] resolving once all tasks are done.
//!
//! Results keep the order the tasks were given in, and tasks giving `None` are left out.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};
use anyhow::{anyhow, bail, Context, Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rayon::prelude::*;
use tokio::sync::oneshot;

/// A named piece of work.
pub struct Task<F> {
	name: String,
	f: F,
}

impl<F> Task<F> {
	pub fn new(name: impl Into<String>, f: F) -> Task<F> {
		Task { name: name.into(), f }
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl<T, F> Task<F>
where
	F: FnOnce() -> Result<Option<T>>,
{
	fn run(self) -> Result<Option<T>> {
		let Task { name, f } = self;
		let result = match catch_unwind(AssertUnwindSafe(f)) {
			Ok(result) => result,
			Err(panic) => Err(anyhow!("task panicked: {}", panic_message(&*panic))),
		};
		result.with_context(|| anyhow!("failed to execute task {name}"))
	}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
	if let Some(message) = panic.downcast_ref::<&str>() {
		message
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message
	} else {
		"unknown panic payload"
	}
}

fn discard_result<F>(task: Task<F>) -> Task<impl FnOnce() -> Result<Option<()>>>
where
	F: FnOnce() -> Result<()>,
{
	let Task { name, f } = task;
	Task { name, f: move || f().map(|()| None) }
}

pub struct TaskRunner {
	pool: ThreadPool,
}

impl std::fmt::Debug for TaskRunner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskRunner").field("threads", &self.pool.current_num_threads()).finish()
	}
}

impl TaskRunner {
	pub fn new(threads: usize) -> Result<TaskRunner> {
		if threads == 0 {
			bail!("need at least one thread to run tasks on");
		}
		let pool = ThreadPoolBuilder::new()
			.num_threads(threads)
			.thread_name(|index| format!("dukerename-worker-{index}"))
			.build()
			.context("failed to create thread pool")?;
		Ok(TaskRunner { pool })
	}

	pub fn threads(&self) -> usize {
		self.pool.current_num_threads()
	}

	/// Runs all tasks and waits for them. Gives the first error in task order, if any task fails.
	pub fn invoke_all<T, F>(&self, tasks: Vec<Task<F>>) -> Result<Vec<T>>
	where
		T: Send,
		F: FnOnce() -> Result<Option<T>> + Send,
	{
		let results: Vec<Result<Option<T>>> = self.pool.install(|| {
			tasks.into_par_iter()
				.map(Task::run)
				.collect()
		});

		let mut values = Vec::with_capacity(results.len());
		for result in results {
			if let Some(value) = result? {
				values.push(value);
			}
		}
		Ok(values)
	}

	/// Runs all tasks and waits for them.
	pub fn consume_all<F>(&self, tasks: Vec<Task<F>>) -> Result<()>
	where
		F: FnOnce() -> Result<()> + Send,
	{
		self.invoke_all::<(), _>(tasks.into_iter().map(discard_result).collect())?;
		Ok(())
	}

	/// Starts all tasks, without waiting for them.
	///
	/// The batch fails with the error of the first task that fails, in the order the tasks finish.
	pub fn submit_invoke_all<T, F>(&self, tasks: Vec<Task<F>>) -> Batch<Vec<T>>
	where
		T: Send + 'static,
		F: FnOnce() -> Result<Option<T>> + Send + 'static,
	{
		self.submit(tasks, |values| values)
	}

	/// Starts all tasks, without waiting for them.
	pub fn submit_consume_all<F>(&self, tasks: Vec<Task<F>>) -> Batch<()>
	where
		F: FnOnce() -> Result<()> + Send + 'static,
	{
		self.submit(tasks.into_iter().map(discard_result).collect(), |_| ())
	}

	fn submit<T, R, F>(&self, tasks: Vec<Task<F>>, finish: fn(Vec<T>) -> R) -> Batch<R>
	where
		T: Send + 'static,
		R: Send + 'static,
		F: FnOnce() -> Result<Option<T>> + Send + 'static,
	{
		let (sender, receiver) = oneshot::channel();

		if tasks.is_empty() {
			// no task would be left to send the result
			let _ = sender.send(Ok(finish(Vec::new())));
			return Batch { receiver };
		}

		let state = Arc::new(BatchState {
			slots: tasks.iter().map(|_| Mutex::new(None)).collect(),
			remaining: AtomicUsize::new(tasks.len()),
			error: Mutex::new(None),
			sender: Mutex::new(Some(sender)),
			finish,
		});

		for (index, task) in tasks.into_iter().enumerate() {
			let state = state.clone();
			self.pool.spawn(move || {
				match task.run() {
					Ok(value) => *lock(&state.slots[index]) = value,
					Err(e) => {
						lock(&state.error).get_or_insert(e);
					},
				}

				if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
					state.complete();
				}
			});
		}

		Batch { receiver }
	}
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BatchState<T, R> {
	slots: Vec<Mutex<Option<T>>>,
	remaining: AtomicUsize,
	/// The first error, by the time the tasks finish.
	error: Mutex<Option<Error>>,
	sender: Mutex<Option<oneshot::Sender<Result<R>>>>,
	finish: fn(Vec<T>) -> R,
}

impl<T, R> BatchState<T, R> {
	/// Called by the last task to finish.
	fn complete(&self) {
		let result = match lock(&self.error).take() {
			Some(e) => Err(e),
			None => Ok((self.finish)(self.slots.iter().filter_map(|slot| lock(slot).take()).collect())),
		};
		if let Some(sender) = lock(&self.sender).take() {
			// the batch may have been dropped already, then no one is interested in the result
			let _ = sender.send(result);
		}
	}
}

/// Tasks running in the background, resolving to their combined result.
///
/// Either `.await` it, or use [`Batch::wait`] outside of async code.
#[must_use = "the result of the tasks is only seen by waiting for the batch"]
pub struct Batch<T> {
	receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Batch<T> {
	/// Blocks until all tasks are done.
	///
	/// This must not be called from within async code, `.await` the batch there.
	pub fn wait(self) -> Result<T> {
		self.receiver.blocking_recv()
			.context("tasks stopped without giving a result")?
	}
}

impl<T> Future for Batch<T> {
	type Output = Result<T>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.receiver).poll(cx)
			.map(|result| result.unwrap_or_else(|_| Err(anyhow!("tasks stopped without giving a result"))))
	}
}

#[cfg(test)]
mod testing {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use anyhow::{bail, Result};
	use pretty_assertions::assert_eq;
	use crate::tasks::{Task, TaskRunner};

	#[test]
	fn zero_threads() {
		assert!(TaskRunner::new(0).is_err());
	}

	#[test]
	fn panics_are_errors() -> Result<()> {
		let runner = TaskRunner::new(2)?;
		let tasks: Vec<Task<Box<dyn FnOnce() -> Result<Option<u32>> + Send>>> = vec![
			Task::new("fine", Box::new(|| -> Result<Option<u32>> { Ok(Some(1)) })),
			Task::new("broken", Box::new(|| -> Result<Option<u32>> { panic!("oh no") })),
		];

		let error = runner.invoke_all(tasks).err().map(|e| format!("{e:#}"));
		assert_eq!(error.as_deref(), Some("failed to execute task broken: task panicked: oh no"));
		Ok(())
	}

	#[test]
	fn all_tasks_run_despite_failures() -> Result<()> {
		let runner = TaskRunner::new(3)?;
		let ran = AtomicUsize::new(0);
		let tasks = (0..20).map(|i| {
			let ran = &ran;
			Task::new(format!("task {i}"), move || {
				ran.fetch_add(1, Ordering::SeqCst);
				if i % 7 == 3 {
					bail!("task {i} fails");
				}
				Ok(())
			})
		}).collect();

		let error = runner.consume_all(tasks).err().map(|e| e.to_string());
		assert_eq!(error.as_deref(), Some("failed to execute task task 3"));
		assert_eq!(ran.load(Ordering::SeqCst), 20);
		Ok(())
	}
}
