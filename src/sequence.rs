use std::fmt::Display;
use std::future::Future;

use log::warn;

/// What to do when one task in a sequence fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, leave `None` in its slot and carry on.
    Continue,
    /// Return the first error; later tasks are never started.
    Abort,
}

/// Run deferred tasks strictly one at a time, in order.
///
/// Each item is a factory, not a future: task `n + 1` is not even created until task `n`
/// has settled. The returned list lines up with the input, with `None` standing in for
/// failures under [`FailurePolicy::Continue`].
pub async fn run_sequential<I, F, Fut, T, E>(
    tasks: I,
    policy: FailurePolicy,
) -> Result<Vec<Option<T>>, E>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let tasks = tasks.into_iter();
    let mut results = Vec::with_capacity(tasks.size_hint().0);

    for (index, task) in tasks.enumerate() {
        match task().await {
            Ok(value) => results.push(Some(value)),
            Err(e) => match policy {
                FailurePolicy::Continue => {
                    warn!("Task {} failed, continuing: {}", index, e);
                    results.push(None);
                }
                FailurePolicy::Abort => return Err(e),
            },
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    async fn step(log: &RefCell<Vec<String>>, name: &'static str, ok: bool) -> Result<&'static str, String> {
        log.borrow_mut().push(format!("start {name}"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        log.borrow_mut().push(format!("end {name}"));
        if ok { Ok(name) } else { Err(format!("{name} broke")) }
    }

    fn plan() -> Vec<(&'static str, bool)> {
        vec![("a", true), ("b", true), ("c", false), ("d", true)]
    }

    #[tokio::test]
    async fn test_continue_keeps_going_and_aligns_results() {
        let log = RefCell::new(Vec::new());
        let results = run_sequential(
            plan().into_iter().map(|(name, ok)| {
                let log = &log;
                move || step(log, name, ok)
            }),
            FailurePolicy::Continue,
        )
        .await
        .unwrap();

        assert_eq!(results, vec![Some("a"), Some("b"), None, Some("d")]);
        assert_eq!(
            log.into_inner(),
            vec!["start a", "end a", "start b", "end b", "start c", "end c", "start d", "end d"]
        );
    }

    #[tokio::test]
    async fn test_abort_never_invokes_remaining_tasks() {
        let log = RefCell::new(Vec::new());
        let result = run_sequential(
            plan().into_iter().map(|(name, ok)| {
                let log = &log;
                move || step(log, name, ok)
            }),
            FailurePolicy::Abort,
        )
        .await;

        assert_eq!(result.unwrap_err(), "c broke");
        assert!(!log.borrow().iter().any(|entry| entry.ends_with('d')));
    }

    #[tokio::test]
    async fn test_empty_sequence() {
        let tasks: Vec<fn() -> std::future::Ready<Result<u8, String>>> = vec![];
        let results = run_sequential(tasks, FailurePolicy::Abort).await.unwrap();
        assert!(results.is_empty());
    }
}
