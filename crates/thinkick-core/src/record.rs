//! Fixed-capacity synchrotron-radiation record shared by thin slices.
//!
//! Slots are reserved atomically and written exactly once, so any number
//! of workers can record concurrently without coordination. The record is
//! owned by whoever started internal logging; elements only hold a shared
//! handle to it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use thinkick_physics::synrad::{RadiationRecordEntry, RadiationRecordSink};

/// Atomic slot counter of a record.
#[derive(Debug)]
pub struct RecordIndex {
    capacity: usize,
    num_recorded: AtomicUsize,
    num_dropped: AtomicUsize,
}

impl RecordIndex {
    pub fn new(capacity: usize) -> Self {
        RecordIndex {
            capacity,
            num_recorded: AtomicUsize::new(0),
            num_dropped: AtomicUsize::new(0),
        }
    }

    /// Reserve the next free slot, or `None` once the record is full.
    ///
    /// `num_recorded` never exceeds `capacity`.
    pub fn get_slot(&self) -> Option<usize> {
        let reserved = self
            .num_recorded
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok();
        if reserved.is_none() {
            self.num_dropped.fetch_add(1, Ordering::Relaxed);
        }
        reserved
    }

    pub fn num_recorded(&self) -> usize {
        self.num_recorded.load(Ordering::Acquire)
    }

    /// Reservations refused because the record was full.
    pub fn num_dropped(&self) -> usize {
        self.num_dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Debug)]
pub struct SynchrotronRadiationRecord {
    index: RecordIndex,
    slots: Vec<OnceLock<RadiationRecordEntry>>,
}

impl SynchrotronRadiationRecord {
    pub fn new(capacity: usize) -> Self {
        SynchrotronRadiationRecord {
            index: RecordIndex::new(capacity),
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn index(&self) -> &RecordIndex {
        &self.index
    }

    pub fn num_recorded(&self) -> usize {
        self.index.num_recorded()
    }

    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.num_recorded() >= self.capacity()
    }

    /// Written entries in slot order.
    pub fn entries(&self) -> Vec<RadiationRecordEntry> {
        self.slots[..self.num_recorded()]
            .iter()
            .filter_map(|slot| slot.get().copied())
            .collect()
    }
}

impl RadiationRecordSink for SynchrotronRadiationRecord {
    fn reserve_slot(&self) -> Option<usize> {
        self.index.get_slot()
    }

    fn write(&self, slot: usize, entry: RadiationRecordEntry) {
        if let Some(cell) = self.slots.get(slot) {
            // Slots come from the atomic index, so a cell is never set twice.
            let _ = cell.set(entry);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordSummary {
    pub n_entries: usize,
    pub total_photons: u64,
    pub total_photon_energy_ev: f64,
    pub mean_photon_energy_ev: f64,
    /// Mean relative momentum change per recorded kick
    pub mean_dp: f64,
}

/// Photon statistics over everything recorded so far.
pub fn summarize_record(record: &SynchrotronRadiationRecord) -> RecordSummary {
    let entries = record.entries();
    let n_entries = entries.len();
    let total_photons: u64 = entries.iter().map(|e| e.n_photons).sum();
    let total_photon_energy_ev: f64 = entries.iter().map(|e| e.photon_energy_ev).sum();
    let mean_photon_energy_ev = if total_photons > 0 {
        total_photon_energy_ev / total_photons as f64
    } else {
        0.0
    };
    let mean_dp = if n_entries > 0 {
        entries.iter().map(|e| e.dp_entry + e.dp_exit).sum::<f64>() / n_entries as f64
    } else {
        0.0
    };
    RecordSummary {
        n_entries,
        total_photons,
        total_photon_energy_ev,
        mean_photon_energy_ev,
        mean_dp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn entry(id: usize, n_photons: u64, energy: f64) -> RadiationRecordEntry {
        RadiationRecordEntry {
            particle_id: id,
            n_photons,
            photon_energy_ev: energy,
            dp_entry: -1e-6,
            dp_exit: -1e-6,
            ..RadiationRecordEntry::default()
        }
    }

    #[test]
    fn test_slots_are_sequential_until_full() {
        let index = RecordIndex::new(3);
        assert_eq!(index.get_slot(), Some(0));
        assert_eq!(index.get_slot(), Some(1));
        assert_eq!(index.get_slot(), Some(2));
        assert_eq!(index.get_slot(), None);
        assert_eq!(index.get_slot(), None);
        assert_eq!(index.num_recorded(), 3);
        assert_eq!(index.num_dropped(), 2);
    }

    #[test]
    fn test_zero_capacity_never_records() {
        let record = SynchrotronRadiationRecord::new(0);
        assert!(record.is_full());
        assert_eq!(record.reserve_slot(), None);
        assert!(record.entries().is_empty());
    }

    #[test]
    fn test_concurrent_reservations_are_unique() {
        let record = SynchrotronRadiationRecord::new(10_000);
        (0..12_000usize).into_par_iter().for_each(|i| {
            if let Some(slot) = record.reserve_slot() {
                record.write(slot, entry(i, 1, 1.0));
            }
        });
        assert_eq!(record.num_recorded(), 10_000);
        assert_eq!(record.index().num_dropped(), 2_000);
        let mut ids: Vec<usize> = record.entries().iter().map(|e| e.particle_id).collect();
        assert_eq!(ids.len(), 10_000);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10_000, "two events landed in one slot");
    }

    #[test]
    fn test_summary_statistics() {
        let record = SynchrotronRadiationRecord::new(4);
        for (i, (n, e)) in [(2u64, 10.0), (0, 0.0), (3, 20.0)].into_iter().enumerate() {
            let slot = record.reserve_slot().unwrap();
            record.write(slot, entry(i, n, e));
        }
        let s = summarize_record(&record);
        assert_eq!(s.n_entries, 3);
        assert_eq!(s.total_photons, 5);
        assert!((s.total_photon_energy_ev - 30.0).abs() < 1e-12);
        assert!((s.mean_photon_energy_ev - 6.0).abs() < 1e-12);
        assert!((s.mean_dp + 2e-6).abs() < 1e-18);
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let s = summarize_record(&SynchrotronRadiationRecord::new(8));
        assert_eq!(s.n_entries, 0);
        assert_eq!(s.mean_photon_energy_ev, 0.0);
        assert_eq!(s.mean_dp, 0.0);
    }
}
