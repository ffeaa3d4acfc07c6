// SPDX-License-Identifier: GPL-3.0-only

use tracing::{debug, info, warn};

use crate::lock::{LockGuard, TransactionLock};
use crate::{Result, StepResult, TransactionError};

/// One unit of a transaction.
///
/// `prepare` must be short and must not change system state. `abort` is
/// best-effort cleanup, not a guaranteed rollback.
pub trait Step {
    fn title(&self) -> &str;

    fn prepare(&mut self) -> StepResult {
        Ok(())
    }

    fn commit(&mut self) -> StepResult {
        Ok(())
    }

    fn abort(&mut self) -> StepResult {
        Ok(())
    }
}

/// A step that only commits, built from a closure
pub struct FnStep<F> {
    title: String,
    commit: F,
}

impl<F> FnStep<F>
where
    F: FnMut() -> StepResult,
{
    pub fn new(title: impl Into<String>, commit: F) -> Self {
        Self {
            title: title.into(),
            commit,
        }
    }
}

impl<F> Step for FnStep<F>
where
    F: FnMut() -> StepResult,
{
    fn title(&self) -> &str {
        &self.title
    }

    fn commit(&mut self) -> StepResult {
        (self.commit)()
    }
}

enum Element<'a> {
    Step(Box<dyn Step + 'a>),
    Nested(Transaction<'a>),
}

/// Ordered steps with all-or-nothing intent.
///
/// Nested transactions are flattened into their leaf steps when run, so a
/// caller counting steps sees no difference between nesting and a flat list.
/// Steps may borrow host handles for `'a`.
pub struct Transaction<'a> {
    title: String,
    elements: Vec<Element<'a>>,
}

impl<'a> Transaction<'a> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn push(&mut self, step: impl Step + 'a) {
        self.elements.push(Element::Step(Box::new(step)));
    }

    pub fn push_boxed(&mut self, step: Box<dyn Step + 'a>) {
        self.elements.push(Element::Step(step));
    }

    /// Append a commit-only step.
    pub fn push_fn<F>(&mut self, title: impl Into<String>, commit: F)
    where
        F: FnMut() -> StepResult + 'a,
    {
        self.push(FnStep::new(title, commit));
    }

    pub fn with(mut self, step: impl Step + 'a) -> Self {
        self.push(step);
        self
    }

    /// Nest another transaction.
    pub fn append(&mut self, other: Transaction<'a>) {
        self.elements.push(Element::Nested(other));
    }

    /// Number of leaf steps.
    pub fn len(&self) -> usize {
        self.elements
            .iter()
            .map(|element| match element {
                Element::Step(_) => 1,
                Element::Nested(tx) => tx.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Titles of the leaf steps in execution order.
    pub fn step_titles(&self) -> Vec<String> {
        let mut titles = Vec::new();
        for element in &self.elements {
            match element {
                Element::Step(step) => titles.push(step.title().to_string()),
                Element::Nested(tx) => titles.extend(tx.step_titles()),
            }
        }
        titles
    }

    fn into_leaves(self) -> Vec<Box<dyn Step + 'a>> {
        let mut leaves = Vec::new();
        for element in self.elements {
            match element {
                Element::Step(step) => leaves.push(step),
                Element::Nested(tx) => leaves.extend(tx.into_leaves()),
            }
        }
        leaves
    }

    /// Prepare every step, then commit every step, under the lock.
    ///
    /// When step K fails in either phase, steps 1..K-1 are aborted in
    /// reverse order. Step K and the steps after it are never aborted.
    pub fn run(self, lock: &TransactionLock) -> Result<()> {
        let guard = lock.acquire()?;
        self.run_locked(&guard)
    }

    /// [`run`](Self::run) for a caller that already holds the lock.
    pub fn run_locked(self, _guard: &LockGuard) -> Result<()> {
        info!("Running transaction '{}'", self.title);
        let title = self.title.clone();
        let mut steps = self.into_leaves();

        if let Err(e) = prepare_all(&title, &mut steps) {
            warn!("Transaction '{}' failed during prepare: {}", title, e);
            return Err(e);
        }

        for index in 0..steps.len() {
            debug!("Committing step '{}'", steps[index].title());
            if let Err(e) = steps[index].commit() {
                warn!(
                    "Transaction '{}' failed at step '{}': {}",
                    title,
                    steps[index].title(),
                    e
                );
                abort_reverse(&mut steps[..index]);
                return Err(TransactionError::failed(&title, &e));
            }
        }

        info!("Transaction '{}' succeeded", title);
        Ok(())
    }

    /// Take the lock, prepare all steps and hand them out one by one.
    ///
    /// The lock is held until the returned iterator is dropped. Committing
    /// (and aborting on failure) is up to the caller.
    pub fn step(self, lock: &TransactionLock) -> Result<TransactionSteps<'a>> {
        let guard = lock.acquire()?;
        let title = self.title.clone();
        let mut steps = self.into_leaves();
        debug!("Preparing transaction '{}'", title);
        prepare_all(&title, &mut steps)?;

        Ok(TransactionSteps {
            title,
            steps: steps.into_iter().enumerate(),
            _guard: guard,
        })
    }
}

fn prepare_all(title: &str, steps: &mut [Box<dyn Step + '_>]) -> Result<()> {
    for index in 0..steps.len() {
        debug!("Preparing step '{}'", steps[index].title());
        if let Err(e) = steps[index].prepare() {
            abort_reverse(&mut steps[..index]);
            return Err(TransactionError::failed(title, &e));
        }
    }
    Ok(())
}

fn abort_reverse(steps: &mut [Box<dyn Step + '_>]) {
    for step in steps.iter_mut().rev() {
        debug!("Aborting step '{}'", step.title());
        if let Err(e) = step.abort() {
            warn!("Abort of step '{}' failed: {}", step.title(), e);
        }
    }
}

/// Prepared steps of a transaction, yielded with their index
pub struct TransactionSteps<'a> {
    title: String,
    steps: std::iter::Enumerate<std::vec::IntoIter<Box<dyn Step + 'a>>>,
    _guard: LockGuard,
}

impl TransactionSteps<'_> {
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl<'a> Iterator for TransactionSteps<'a> {
    type Item = (usize, Box<dyn Step + 'a>);

    fn next(&mut self) -> Option<Self::Item> {
        self.steps.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: String,
        journal: Journal,
        fail_prepare: bool,
        fail_commit: bool,
    }

    impl Recorder {
        fn new(name: &str, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                journal: journal.clone(),
                fail_prepare: false,
                fail_commit: false,
            }
        }

        fn failing_commit(mut self) -> Self {
            self.fail_commit = true;
            self
        }

        fn failing_prepare(mut self) -> Self {
            self.fail_prepare = true;
            self
        }

        fn log(&self, phase: &str) {
            self.journal
                .borrow_mut()
                .push(format!("{phase} {}", self.name));
        }
    }

    impl Step for Recorder {
        fn title(&self) -> &str {
            &self.name
        }

        fn prepare(&mut self) -> StepResult {
            self.log("prepare");
            if self.fail_prepare {
                return Err(format!("{} not ready", self.name).into());
            }
            Ok(())
        }

        fn commit(&mut self) -> StepResult {
            self.log("commit");
            if self.fail_commit {
                return Err(format!("{} broke", self.name).into());
            }
            Ok(())
        }

        fn abort(&mut self) -> StepResult {
            self.log("abort");
            Ok(())
        }
    }

    fn lock() -> (tempfile::TempDir, TransactionLock) {
        let dir = tempfile::tempdir().unwrap();
        let lock = TransactionLock::new(dir.path().join("transaction-in-progress"));
        (dir, lock)
    }

    fn aborted(journal: &Journal) -> Vec<String> {
        journal
            .borrow()
            .iter()
            .filter(|entry| entry.starts_with("abort"))
            .cloned()
            .collect()
    }

    #[test]
    fn commits_all_steps_in_order() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let tx = Transaction::new("Steps")
            .with(Recorder::new("a", &journal))
            .with(Recorder::new("b", &journal));

        assert_eq!(tx.len(), 2);
        tx.run(&lock).unwrap();
        assert_eq!(
            *journal.borrow(),
            vec!["prepare a", "prepare b", "commit a", "commit b"]
        );
    }

    #[test]
    fn commit_failure_aborts_earlier_steps_in_reverse() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let tx = Transaction::new("Steps")
            .with(Recorder::new("1", &journal))
            .with(Recorder::new("2", &journal))
            .with(Recorder::new("3", &journal).failing_commit())
            .with(Recorder::new("4", &journal));

        let err = tx.run(&lock).unwrap_err();
        assert_eq!(err.to_string(), "transaction 'Steps' failed: 3 broke");
        assert_eq!(aborted(&journal), vec!["abort 2", "abort 1"]);
        assert!(!journal.borrow().contains(&"commit 4".to_string()));
    }

    #[test]
    fn prepare_failure_commits_nothing() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let tx = Transaction::new("Steps")
            .with(Recorder::new("1", &journal))
            .with(Recorder::new("2", &journal).failing_prepare())
            .with(Recorder::new("3", &journal));

        assert!(matches!(
            tx.run(&lock),
            Err(TransactionError::Failed { ref title, .. }) if title == "Steps"
        ));
        assert_eq!(aborted(&journal), vec!["abort 1"]);
        assert!(!journal.borrow().iter().any(|e| e.starts_with("commit")));
        assert!(!journal.borrow().contains(&"prepare 3".to_string()));
    }

    #[test]
    fn nested_transactions_flatten() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let mut outer = Transaction::new("Outer").with(Recorder::new("a", &journal));
        outer.append(
            Transaction::new("Inner")
                .with(Recorder::new("b", &journal))
                .with(Recorder::new("c", &journal).failing_commit()),
        );

        assert_eq!(outer.len(), 3);
        assert_eq!(outer.step_titles(), vec!["a", "b", "c"]);
        assert!(outer.run(&lock).is_err());
        assert_eq!(aborted(&journal), vec!["abort b", "abort a"]);
    }

    #[test]
    fn stepping_holds_the_lock() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let tx = Transaction::new("Steps")
            .with(Recorder::new("a", &journal))
            .with(Recorder::new("b", &journal));

        let mut steps = tx.step(&lock).unwrap();
        assert_eq!(
            *journal.borrow(),
            vec!["prepare a", "prepare b"]
        );

        let blocked = Transaction::new("Other").run(&lock);
        assert!(matches!(blocked, Err(TransactionError::AlreadyRunning { .. })));

        let (index, mut step) = steps.next().unwrap();
        assert_eq!(index, 0);
        step.commit().unwrap();
        let (index, _) = steps.next().unwrap();
        assert_eq!(index, 1);
        assert!(steps.next().is_none());

        drop(steps);
        assert!(Transaction::new("Other").run(&lock).is_ok());
    }

    #[test]
    fn runs_under_a_held_lock() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let guard = lock.acquire().unwrap();

        Transaction::new("Steps")
            .with(Recorder::new("a", &journal))
            .run_locked(&guard)
            .unwrap();
        assert_eq!(*journal.borrow(), vec!["prepare a", "commit a"]);
        assert!(matches!(
            Transaction::new("Other").run(&lock),
            Err(TransactionError::AlreadyRunning { .. })
        ));
    }

    #[test]
    fn closures_become_steps() {
        let (_dir, lock) = lock();
        let journal = Journal::default();
        let mut tx = Transaction::new("Closures");
        let log = journal.clone();
        tx.push_fn("Write config", move || {
            log.borrow_mut().push("written".to_string());
            Ok(())
        });

        assert_eq!(tx.step_titles(), vec!["Write config"]);
        tx.run(&lock).unwrap();
        assert_eq!(*journal.borrow(), vec!["written"]);
    }
}
