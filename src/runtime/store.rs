//! Sample store: sole owner of the samples handed to a runtime.

use crate::data::Sample;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Scheduling status of a stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleStatus {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Held by a worker.
    InFlight,
    /// Reached its last stage.
    Completed,
    /// A stage function failed.
    Failed,
}

/// Read-only view of a stored sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    pub id: String,
    pub stage: u32,
    pub status: SampleStatus,
}

/// How a worker hands a sample back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// More stages remain.
    Pending,
    Completed,
    Failed,
}

/// Result of a claim attempt.
#[derive(Debug)]
pub enum Claim {
    /// A sample moved out of the store; the caller must release it.
    Ready(Sample),
    /// Nothing pending, but other samples are in flight and may come back.
    Wait,
    /// Nothing pending and nothing in flight.
    Drained,
}

struct Entry {
    seq: u64,
    ticket: u64,
    stage: u32,
    status: SampleStatus,
    /// `None` while a worker holds the sample.
    sample: Option<Sample>,
}

impl Entry {
    fn info(&self, id: &str) -> SampleInfo {
        SampleInfo {
            id: id.to_string(),
            stage: self.stage,
            status: self.status,
        }
    }
}

/// Queue slot; lower stage numbers are claimed first, then insertion order.
#[derive(PartialEq, Eq)]
struct Queued {
    stage: u32,
    ticket: u64,
    id: String,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .stage
            .cmp(&self.stage)
            .then_with(|| other.ticket.cmp(&self.ticket))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Samples keyed by identifier, with a priority queue of pending ones.
///
/// Queue slots are invalidated lazily: a slot whose ticket no longer matches
/// its entry (regrouped, re-queued or completed) is skipped on claim.
#[derive(Default)]
pub struct SampleStore {
    entries: HashMap<String, Entry>,
    queue: BinaryHeap<Queued>,
    next_seq: u64,
    in_flight: usize,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a sample into the store as pending.
    ///
    /// # Errors
    /// `DuplicateSample` if the identifier is already present; the store is
    /// left unchanged.
    pub fn insert(&mut self, sample: Sample) -> Result<()> {
        if self.entries.contains_key(sample.id()) {
            return Err(Error::DuplicateSample(sample.id().to_string()));
        }

        let seq = self.bump();
        let id = sample.id().to_string();
        let stage = sample.stage();
        self.queue.push(Queued {
            stage,
            ticket: seq,
            id: id.clone(),
        });
        self.entries.insert(
            id,
            Entry {
                seq,
                ticket: seq,
                stage,
                status: SampleStatus::Pending,
                sample: Some(sample),
            },
        );
        Ok(())
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Borrow a stored sample.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `SampleBusy` while a worker holds it.
    pub fn get(&self, id: &str) -> Result<&Sample> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        entry
            .sample
            .as_ref()
            .ok_or_else(|| Error::SampleBusy(id.to_string()))
    }

    /// Stage and status of a stored sample, available even while in flight.
    pub fn info(&self, id: &str) -> Result<SampleInfo> {
        self.entries
            .get(id)
            .map(|e| e.info(id))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Snapshot of every stored sample, in insertion order.
    pub fn infos(&self) -> Vec<SampleInfo> {
        let mut infos: Vec<(u64, SampleInfo)> = self
            .entries
            .iter()
            .map(|(id, e)| (e.seq, e.info(id)))
            .collect();
        infos.sort_by_key(|(seq, _)| *seq);
        infos.into_iter().map(|(_, info)| info).collect()
    }

    /// Set a resident sample's stage.
    ///
    /// # Errors
    /// `NotFound`, `SampleBusy`, or `StageRegression` if `stage` is below the
    /// current stage.
    pub fn advance_stage(&mut self, id: &str, stage: u32) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let sample = entry
            .sample
            .as_mut()
            .ok_or_else(|| Error::SampleBusy(id.to_string()))?;

        sample.advance_to(stage)?;
        entry.stage = stage;

        if entry.status == SampleStatus::Pending {
            let ticket = self.next_seq;
            self.next_seq += 1;
            entry.ticket = ticket;
            self.queue.push(Queued {
                stage,
                ticket,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Take the next pending sample out of the store.
    pub fn claim(&mut self) -> Claim {
        while let Some(slot) = self.queue.pop() {
            let Some(entry) = self.entries.get_mut(&slot.id) else {
                continue;
            };
            if entry.ticket != slot.ticket || entry.status != SampleStatus::Pending {
                continue;
            }
            let Some(sample) = entry.sample.take() else {
                continue;
            };

            entry.status = SampleStatus::InFlight;
            self.in_flight += 1;
            return Claim::Ready(sample);
        }

        if self.in_flight > 0 {
            Claim::Wait
        } else {
            Claim::Drained
        }
    }

    /// Hand a claimed sample back.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `InvalidArgument` if the sample is not
    /// in flight, `StageRegression` if its stage went backwards.
    pub fn release(&mut self, sample: Sample, disposition: Disposition) -> Result<()> {
        let id = sample.id().to_string();
        let ticket = self.next_seq;
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        if entry.status != SampleStatus::InFlight {
            return Err(Error::InvalidArgument(format!(
                "sample {} released without being claimed",
                id
            )));
        }
        if sample.stage() < entry.stage {
            return Err(Error::StageRegression {
                id,
                current: entry.stage,
                requested: sample.stage(),
            });
        }

        entry.stage = sample.stage();
        entry.sample = Some(sample);
        entry.status = match disposition {
            Disposition::Pending => SampleStatus::Pending,
            Disposition::Completed => SampleStatus::Completed,
            Disposition::Failed => SampleStatus::Failed,
        };
        self.in_flight -= 1;

        if disposition == Disposition::Pending {
            self.next_seq += 1;
            entry.ticket = ticket;
            self.queue.push(Queued {
                stage: entry.stage,
                ticket,
                id,
            });
        }
        Ok(())
    }

    /// Remove up to `max_count` resident samples matching `pred`, oldest
    /// first. In-flight samples are never selected.
    pub fn remove_where<F>(&mut self, max_count: usize, mut pred: F) -> Vec<Sample>
    where
        F: FnMut(&SampleInfo) -> bool,
    {
        let mut selected: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.sample.is_some())
            .filter(|(id, e)| pred(&e.info(id)))
            .map(|(id, e)| (e.seq, id.clone()))
            .collect();
        selected.sort_unstable();
        selected.truncate(max_count);

        selected
            .into_iter()
            .filter_map(|(_, id)| self.entries.remove(&id).and_then(|e| e.sample))
            .collect()
    }

    /// Samples still to be driven (pending or in flight).
    pub fn pending_count(&self) -> usize {
        self.count_status(|s| matches!(s, SampleStatus::Pending | SampleStatus::InFlight))
    }

    pub fn completed_count(&self) -> usize {
        self.count_status(|s| s == SampleStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count_status(|s| s == SampleStatus::Failed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn count_status(&self, pred: impl Fn(SampleStatus) -> bool) -> usize {
        self.entries.values().filter(|e| pred(e.status)).count()
    }

    /// Number of stored samples at or above `stage`.
    pub fn count_at_or_above(&self, stage: u32) -> usize {
        self.entries.values().filter(|e| e.stage >= stage).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every sample. Samples held by workers are forgotten as well.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queue.clear();
        self.in_flight = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    fn make_sample(id: &str, stage: u32) -> Sample {
        let mut s = Sample::new(id, vec![1.0], vec![1.0], vec![0.1]).unwrap();
        s.advance_to(stage).unwrap();
        s
    }

    fn claim(store: &mut SampleStore) -> Sample {
        match store.claim() {
            Claim::Ready(sample) => sample,
            other => panic!("expected a sample, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 0)).unwrap();

        let err = store.insert(make_sample("a", 3)).unwrap_err();
        assert!(matches!(err, Error::DuplicateSample(_)));
        assert_eq!(err.status(), Status::InvalidArgument);
        assert_eq!(store.len(), 1);
        assert_eq!(store.info("a").unwrap().stage, 0);
    }

    #[test]
    fn test_lookup() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 2)).unwrap();

        assert_eq!(store.get("a").unwrap().stage(), 2);
        assert_eq!(store.get("zz").unwrap_err().status(), Status::NotFound);
        assert_eq!(store.info("zz").unwrap_err().status(), Status::NotFound);

        let _held = claim(&mut store);
        assert!(matches!(store.get("a"), Err(Error::SampleBusy(_))));
        assert_eq!(store.info("a").unwrap().status, SampleStatus::InFlight);
    }

    #[test]
    fn test_claim_lowest_stage_first() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 5)).unwrap();
        store.insert(make_sample("b", 3)).unwrap();
        store.insert(make_sample("c", 7)).unwrap();
        store.insert(make_sample("d", 3)).unwrap();

        let order: Vec<String> = (0..4).map(|_| claim(&mut store).id().to_string()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
        assert!(matches!(store.claim(), Claim::Wait));
        assert_eq!(store.in_flight(), 4);
    }

    #[test]
    fn test_release_and_drain() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 0)).unwrap();

        let mut sample = claim(&mut store);
        sample.advance_stage();
        store.release(sample, Disposition::Pending).unwrap();
        assert_eq!(store.pending_count(), 1);

        let mut sample = claim(&mut store);
        sample.advance_stage();
        store.release(sample, Disposition::Completed).unwrap();

        assert!(matches!(store.claim(), Claim::Drained));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.completed_count(), 1);
        assert_eq!(store.info("a").unwrap().stage, 2);
    }

    #[test]
    fn test_release_requires_claim() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 0)).unwrap();

        let stray = make_sample("a", 1);
        assert!(store.release(stray, Disposition::Completed).is_err());

        let unknown = make_sample("b", 0);
        assert_eq!(
            store
                .release(unknown, Disposition::Completed)
                .unwrap_err()
                .status(),
            Status::NotFound
        );
    }

    #[test]
    fn test_advance_stage_monotonic() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 2)).unwrap();

        store.advance_stage("a", 4).unwrap();
        assert_eq!(store.info("a").unwrap().stage, 4);

        let err = store.advance_stage("a", 1).unwrap_err();
        assert!(matches!(err, Error::StageRegression { .. }));
        assert_eq!(err.status(), Status::RuntimeError);
        assert_eq!(store.get("a").unwrap().stage(), 4);

        // The stale queue slot for stage 2 is skipped.
        let sample = claim(&mut store);
        assert_eq!(sample.stage(), 4);
        assert!(matches!(store.claim(), Claim::Wait));
    }

    #[test]
    fn test_remove_where() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 3)).unwrap();
        store.insert(make_sample("b", 5)).unwrap();
        store.insert(make_sample("c", 7)).unwrap();
        store.insert(make_sample("d", 9)).unwrap();

        let held = claim(&mut store); // "a", lowest stage
        assert_eq!(held.id(), "a");

        let removed = store.remove_where(2, |info| info.stage >= 3);
        let ids: Vec<&str> = removed.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(store.len(), 2);

        let none = store.remove_where(10, |info| info.stage >= 100);
        assert!(none.is_empty());
        assert_eq!(store.len(), 2);

        // Regrouped samples leave no claimable slot behind.
        let next = claim(&mut store);
        assert_eq!(next.id(), "d");
    }

    #[test]
    fn test_counts_and_clear() {
        let mut store = SampleStore::new();
        store.insert(make_sample("a", 1)).unwrap();
        store.insert(make_sample("b", 4)).unwrap();

        let sample = claim(&mut store);
        store.release(sample, Disposition::Failed).unwrap();

        assert_eq!(store.failed_count(), 1);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.count_at_or_above(2), 1);
        assert_eq!(store.infos().len(), 2);

        store.clear();
        assert!(store.is_empty());
        assert!(matches!(store.claim(), Claim::Drained));
    }
}
