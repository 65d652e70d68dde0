//! Process groups: the set of ranks a reduction runs across.
//!
//! A [`ProcessGroup`] only knows how to start a sum all-reduce over a
//! flat `f32` buffer and hand back a [`ReduceWork`] handle. Waiting is a
//! separate step so callers can put several reductions in flight before
//! blocking on any of them.

use std::{collections::HashMap, sync::Arc};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Handle to an in-flight reduction
pub trait ReduceWork: Send {
    /// Block until every rank contributed; returns the summed buffer.
    fn wait(self: Box<Self>) -> Result<Vec<f32>>;
}

/// Collective communication seam.
///
/// Members must issue reductions in the same order on every rank.
pub trait ProcessGroup: Send + Sync {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Start a sum all-reduce of `buffer` across the group.
    fn all_reduce_sum(&self, buffer: Vec<f32>) -> Result<Box<dyn ReduceWork>>;
}

// ─── Single process ───────────────────────────────────────────────────────────

/// The trivial group: one rank, reductions are the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

struct Ready(Vec<f32>);

impl ReduceWork for Ready {
    fn wait(self: Box<Self>) -> Result<Vec<f32>> {
        Ok(self.0)
    }
}

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, buffer: Vec<f32>) -> Result<Box<dyn ReduceWork>> {
        Ok(Box::new(Ready(buffer)))
    }
}

// ─── In-process group ─────────────────────────────────────────────────────────

/// Partial result of one reduction, keyed by its sequence number
struct Slot {
    sum:       Vec<f32>,
    arrived:   usize,
    /// Members finished with the slot: collected, rejected or dropped
    collected: usize,
    failed:    Option<String>,
}

struct Shared {
    world_size: usize,
    slots:      Mutex<HashMap<u64, Slot>>,
    done:       Condvar,
}

/// Count one member as finished with `seq`; the last one frees the slot.
fn release(slots: &mut HashMap<u64, Slot>, seq: u64, world_size: usize) {
    if let Some(slot) = slots.get_mut(&seq) {
        slot.collected += 1;
        if slot.collected == world_size {
            slots.remove(&seq);
        }
    }
}

/// Group whose members live in the same process, one per worker
/// thread. Contributions are summed into shared memory.
///
/// A contribution of the wrong length fails the whole reduction: the
/// offending member gets the error at once and every other member gets
/// it from `wait`.
pub struct ThreadGroup {
    rank:     usize,
    shared:   Arc<Shared>,
    next_seq: Mutex<u64>,
}

impl ThreadGroup {
    /// Create all `world_size` members at once; hand one to each worker.
    pub fn new_group(world_size: usize) -> Result<Vec<ThreadGroup>> {
        if world_size == 0 {
            return Err(Error::InvalidArgument("world_size must be at least 1".to_string()));
        }

        let shared = Arc::new(Shared {
            world_size,
            slots: Mutex::new(HashMap::new()),
            done:  Condvar::new(),
        });

        Ok((0..world_size)
            .map(|rank| ThreadGroup {
                rank,
                shared:   Arc::clone(&shared),
                next_seq: Mutex::new(0),
            })
            .collect())
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn all_reduce_sum(&self, buffer: Vec<f32>) -> Result<Box<dyn ReduceWork>> {
        let seq = {
            let mut next = self.next_seq.lock();
            let seq = *next;
            *next += 1;
            seq
        };
        let world_size = self.shared.world_size;

        let mut slots = self.shared.slots.lock();
        let slot = slots.entry(seq).or_insert_with(|| Slot {
            sum:       vec![0.0; buffer.len()],
            arrived:   0,
            collected: 0,
            failed:    None,
        });

        let rejected = if let Some(reason) = slot.failed.clone() {
            Some(reason)
        } else if slot.sum.len() != buffer.len() {
            let reason = format!(
                "rank {} contributed {} values to reduction #{seq}, expected {}",
                self.rank,
                buffer.len(),
                slot.sum.len()
            );
            slot.failed = Some(reason.clone());
            Some(reason)
        } else {
            None
        };

        if let Some(reason) = rejected {
            release(&mut slots, seq, world_size);
            self.shared.done.notify_all();
            return Err(Error::Collective(reason));
        }

        for (acc, v) in slot.sum.iter_mut().zip(&buffer) {
            *acc += v;
        }
        slot.arrived += 1;

        if slot.arrived == world_size {
            self.shared.done.notify_all();
        }

        Ok(Box::new(ThreadWork {
            shared:   Arc::clone(&self.shared),
            seq,
            released: false,
        }))
    }
}

struct ThreadWork {
    shared:   Arc<Shared>,
    seq:      u64,
    released: bool,
}

impl ReduceWork for ThreadWork {
    fn wait(mut self: Box<Self>) -> Result<Vec<f32>> {
        let shared     = Arc::clone(&self.shared);
        let world_size = shared.world_size;
        let mut slots  = shared.slots.lock();

        let outcome = loop {
            let slot = slots
                .get(&self.seq)
                .ok_or_else(|| Error::Collective(format!("reduction #{} vanished", self.seq)))?;
            if let Some(reason) = &slot.failed {
                break Err(Error::Collective(reason.clone()));
            }
            if slot.arrived == world_size {
                break Ok(slot.sum.clone());
            }
            shared.done.wait(&mut slots);
        };

        release(&mut slots, self.seq, world_size);
        self.released = true;
        outcome
    }
}

impl Drop for ThreadWork {
    // a handle dropped without `wait` still counts as collected
    fn drop(&mut self) {
        if !self.released {
            let mut slots = self.shared.slots.lock();
            release(&mut slots, self.seq, self.shared.world_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_single_process_is_identity() {
        let work = SingleProcess.all_reduce_sum(vec![1.5, -2.0]).unwrap();
        assert_eq!(work.wait().unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_thread_group_sums_across_members() {
        let members = ThreadGroup::new_group(4).unwrap();

        let handles: Vec<_> = members
            .into_iter()
            .map(|g| {
                thread::spawn(move || {
                    let r = g.rank() as f32;
                    // two reductions in flight before waiting on either
                    let a = g.all_reduce_sum(vec![r, 1.0]).unwrap();
                    let b = g.all_reduce_sum(vec![10.0 * r]).unwrap();
                    (a.wait().unwrap(), b.wait().unwrap())
                })
            })
            .collect();

        for h in handles {
            let (a, b) = h.join().unwrap();
            assert_eq!(a, vec![6.0, 4.0]);
            assert_eq!(b, vec![60.0]);
        }
    }

    #[test]
    fn test_thread_group_releases_slots() {
        let members = ThreadGroup::new_group(2).unwrap();
        let shared = Arc::clone(&members[0].shared);

        let handles: Vec<_> = members
            .into_iter()
            .map(|g| thread::spawn(move || g.all_reduce_sum(vec![1.0]).unwrap().wait().unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![2.0]);
        }

        assert!(shared.slots.lock().is_empty());
    }

    #[test]
    fn test_length_mismatch_reaches_waiting_peer() {
        let members = ThreadGroup::new_group(2).unwrap();
        let shared = Arc::clone(&members[0].shared);

        let first = members[0].all_reduce_sum(vec![1.0, 2.0]).unwrap();
        let waiter = thread::spawn(move || first.wait());

        let err = members[1].all_reduce_sum(vec![1.0]).err().unwrap();
        assert!(matches!(err, Error::Collective(_)));

        let peer = waiter.join().unwrap();
        assert!(matches!(peer, Err(Error::Collective(_))));
        assert!(shared.slots.lock().is_empty());
    }

    #[test]
    fn test_dropped_handles_release_slots() {
        let members = ThreadGroup::new_group(2).unwrap();
        let shared = Arc::clone(&members[0].shared);

        // neither handle is waited on
        let a = members[0].all_reduce_sum(vec![1.0]).unwrap();
        let b = members[1].all_reduce_sum(vec![2.0]).unwrap();
        drop(a);
        drop(b);
        assert!(shared.slots.lock().is_empty());

        // one member drops, the other still gets the sum
        let a = members[0].all_reduce_sum(vec![1.0]).unwrap();
        let b = members[1].all_reduce_sum(vec![2.0]).unwrap();
        drop(a);
        assert_eq!(b.wait().unwrap(), vec![3.0]);
        assert!(shared.slots.lock().is_empty());
    }
}
