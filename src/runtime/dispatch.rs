//! Notification dispatcher.
//!
//! Workers never call observer code directly. They push [`Event`]s into one
//! unbounded FIFO channel; a dedicated thread drains it and invokes the
//! [`Observer`]. The completion event is queued by the run supervisor after
//! every worker has been joined, so it is always the last event of a run and
//! is delivered exactly once.
//!
//! ```text
//!  worker 0 ─┐
//!  worker 1 ─┼──Event──▶ mpsc (FIFO) ──▶ dispatch thread ──▶ Observer
//!  worker N ─┘                 ▲
//!  supervisor ──Complete───────┘
//! ```

use crate::data::Sample;
use crate::error::{Error, Result, Status};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Checkpoint progress: `completed` of `total` samples are at or above `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: u32,
    pub completed: usize,
    pub total: usize,
}

/// Aggregate counts at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples in the store when the run started.
    pub total: usize,
    /// Samples completed during the run.
    pub completed: usize,
    /// Samples whose stage function failed.
    pub failed: usize,
    /// Samples left pending (non-zero only after cancellation or regrouping).
    pub pending: usize,
}

/// Terminal notification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// `Ok` or `Cancelled`.
    pub status: Status,
    pub summary: RunSummary,
}

impl Completion {
    pub fn is_cancelled(&self) -> bool {
        self.status == Status::Cancelled
    }

    /// Convert into a `Result`, mapping a cancelled run to `Error::Cancelled`.
    pub fn into_result(self) -> Result<RunSummary> {
        match self.status {
            Status::Cancelled => Err(Error::Cancelled),
            _ => Ok(self.summary),
        }
    }
}

/// Receiver of run notifications. Every method runs on the dispatch thread.
pub trait Observer: Send + 'static {
    /// A checkpoint count changed.
    fn on_progress(&mut self, _progress: Progress) {}

    /// A sample crossed a checkpoint; `sample` is its state at that moment.
    fn on_sample(&mut self, _id: &str, _sample: &Sample) {}

    /// The run ended. Called exactly once, after every other notification.
    fn on_complete(&mut self, _completion: Completion) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

type ProgressFn = Box<dyn FnMut(Progress) + Send>;
type SampleFn = Box<dyn FnMut(&str, &Sample) + Send>;
type CompleteFn = Box<dyn FnOnce(Completion) + Send>;

/// Closure-based observer.
///
/// ```
/// use saxs_runtime::runtime::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_progress(|p| println!("stage {}: {}/{}", p.stage, p.completed, p.total))
///     .on_complete(|c| println!("done: {:?}", c.status));
/// # drop(callbacks);
/// ```
#[derive(Default)]
pub struct Callbacks {
    progress: Option<ProgressFn>,
    sample: Option<SampleFn>,
    complete: Option<CompleteFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress<P>(mut self, f: P) -> Self
    where
        P: FnMut(Progress) + Send + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_sample<S>(mut self, f: S) -> Self
    where
        S: FnMut(&str, &Sample) + Send + 'static,
    {
        self.sample = Some(Box::new(f));
        self
    }

    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }
}

impl Observer for Callbacks {
    fn on_progress(&mut self, progress: Progress) {
        if let Some(f) = self.progress.as_mut() {
            f(progress);
        }
    }

    fn on_sample(&mut self, id: &str, sample: &Sample) {
        if let Some(f) = self.sample.as_mut() {
            f(id, sample);
        }
    }

    fn on_complete(&mut self, completion: Completion) {
        if let Some(f) = self.complete.take() {
            f(completion);
        }
    }
}

/// A queued notification.
#[derive(Debug)]
pub(crate) enum Event {
    Progress(Progress),
    Sample(Box<Sample>),
    Complete(Completion),
}

/// Worker-side handle for queueing notifications.
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: UnboundedSender<Event>,
}

impl Notifier {
    pub(crate) fn progress(&self, progress: Progress) {
        self.send(Event::Progress(progress));
    }

    pub(crate) fn sample(&self, sample: Sample) {
        self.send(Event::Sample(Box::new(sample)));
    }

    fn send(&self, event: Event) {
        // The receiver only goes away after the completion event.
        if self.tx.send(event).is_err() {
            log::warn!("Notification dropped: dispatcher already finished");
        }
    }
}

/// Owner of the dispatch thread for one run.
pub(crate) struct Dispatcher {
    tx: UnboundedSender<Event>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the dispatch thread.
    pub(crate) fn spawn<O: Observer>(observer: O) -> Result<Self> {
        let (tx, rx) = unbounded_channel();
        let handle = thread::Builder::new()
            .name("saxs-dispatch".to_string())
            .spawn(move || drain(rx, observer))
            .map_err(Error::WorkerPool)?;

        Ok(Self { tx, handle })
    }

    pub(crate) fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.tx.clone(),
        }
    }

    /// Queue the completion event and close this run's channel.
    ///
    /// The returned handle joins the dispatch thread once every event has
    /// been delivered.
    pub(crate) fn complete(self, completion: Completion) -> JoinHandle<()> {
        if self.tx.send(Event::Complete(completion)).is_err() {
            log::error!("Dispatch thread exited before run completion");
        }
        self.handle
    }
}

fn drain<O: Observer>(mut rx: UnboundedReceiver<Event>, mut observer: O) {
    while let Some(event) = rx.blocking_recv() {
        let finished = matches!(event, Event::Complete(_));
        let delivered = catch_unwind(AssertUnwindSafe(|| match event {
            Event::Progress(progress) => observer.on_progress(progress),
            Event::Sample(sample) => observer.on_sample(sample.id(), &sample),
            Event::Complete(completion) => observer.on_complete(completion),
        }));
        // Keep draining so the completion event still arrives.
        if delivered.is_err() {
            log::warn!("Observer panicked while handling a notification");
        }
        if finished {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Observer for Recorder {
        fn on_progress(&mut self, p: Progress) {
            self.log
                .lock()
                .unwrap()
                .push(format!("progress {} {}/{}", p.stage, p.completed, p.total));
        }

        fn on_sample(&mut self, id: &str, sample: &Sample) {
            self.log
                .lock()
                .unwrap()
                .push(format!("sample {} @{}", id, sample.stage()));
        }

        fn on_complete(&mut self, c: Completion) {
            self.log
                .lock()
                .unwrap()
                .push(format!("complete {:?}", c.status));
        }
    }

    #[test]
    fn test_events_delivered_in_order_and_complete_last() {
        let recorder = Recorder::default();
        let dispatcher = Dispatcher::spawn(recorder.clone()).unwrap();
        let notifier = dispatcher.notifier();

        let mut sample = Sample::new("s1", vec![1.0], vec![1.0], vec![0.1]).unwrap();
        sample.advance_stage();

        notifier.progress(Progress {
            stage: 1,
            completed: 1,
            total: 2,
        });
        notifier.sample(sample);
        notifier.progress(Progress {
            stage: 1,
            completed: 2,
            total: 2,
        });
        drop(notifier);

        let handle = dispatcher.complete(Completion {
            status: Status::Ok,
            summary: RunSummary::default(),
        });
        handle.join().unwrap();

        let log = recorder.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "progress 1 1/2",
                "sample s1 @1",
                "progress 1 2/2",
                "complete Ok",
            ]
        );
    }

    #[test]
    fn test_callbacks_complete_once() {
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        let mut callbacks = Callbacks::new().on_complete(move |_| *seen.lock().unwrap() += 1);

        let completion = Completion {
            status: Status::Cancelled,
            summary: RunSummary::default(),
        };
        Observer::on_complete(&mut callbacks, completion);
        Observer::on_complete(&mut callbacks, completion);

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(completion.is_cancelled());
        assert!(matches!(completion.into_result(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_observer_panic_does_not_block_completion() {
        let completions = Arc::new(Mutex::new(Vec::new()));
        let seen = completions.clone();
        let callbacks = Callbacks::new()
            .on_progress(|_| panic!("observer bug"))
            .on_sample(|_, _| panic!("observer bug"))
            .on_complete(move |c| seen.lock().unwrap().push(c.status));

        let dispatcher = Dispatcher::spawn(callbacks).unwrap();
        let notifier = dispatcher.notifier();
        notifier.progress(Progress {
            stage: 1,
            completed: 1,
            total: 1,
        });
        notifier.sample(Sample::new("s1", vec![1.0], vec![1.0], vec![0.1]).unwrap());
        drop(notifier);

        let handle = dispatcher.complete(Completion {
            status: Status::Ok,
            summary: RunSummary::default(),
        });
        assert!(handle.join().is_ok());
        assert_eq!(*completions.lock().unwrap(), vec![Status::Ok]);
    }
}
