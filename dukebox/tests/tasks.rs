use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use dukebox::tasks::{Task, TaskRunner};

fn squares(count: u32) -> Vec<Task<impl FnOnce() -> Result<Option<u32>> + Send + 'static>> {
	(0..count)
		.map(|i| Task::new(format!("square {i}"), move || -> Result<Option<u32>> {
			// leave out the multiples of three
			Ok((i % 3 != 0).then_some(i * i))
		}))
		.collect()
}

#[test]
fn invoke_all_keeps_the_order() -> Result<()> {
	let runner = TaskRunner::new(4)?;
	assert_eq!(runner.threads(), 4);
	assert_eq!(runner.invoke_all(squares(10))?, [1, 4, 16, 25, 49, 64]);
	Ok(())
}

#[tokio::test]
async fn batches_can_be_awaited() -> Result<()> {
	let runner = TaskRunner::new(3)?;
	let batch = runner.submit_invoke_all(squares(10));
	assert_eq!(batch.await?, [1, 4, 16, 25, 49, 64]);
	Ok(())
}

#[tokio::test]
async fn failing_batch() -> Result<()> {
	let runner = TaskRunner::new(3)?;
	let ran = Arc::new(AtomicUsize::new(0));
	let tasks = (0..8)
		.map(|i| {
			let ran = ran.clone();
			Task::new(format!("task {i}"), move || {
				ran.fetch_add(1, Ordering::SeqCst);
				if i == 5 {
					bail!("five is not allowed");
				}
				Ok(())
			})
		})
		.collect();

	let error = runner.submit_consume_all(tasks).await.err().map(|e| format!("{e:#}"));
	assert_eq!(error.as_deref(), Some("failed to execute task task 5: five is not allowed"));
	// the other tasks weren't cancelled
	assert_eq!(ran.load(Ordering::SeqCst), 8);
	Ok(())
}

#[test]
fn waiting_for_a_batch() -> Result<()> {
	let runner = TaskRunner::new(2)?;
	assert_eq!(runner.submit_invoke_all(squares(4)).wait()?, [1, 4]);

	let nothing: Vec<Task<fn() -> Result<Option<u8>>>> = Vec::new();
	assert_eq!(runner.submit_invoke_all(nothing).wait()?, Vec::<u8>::new());
	Ok(())
}
