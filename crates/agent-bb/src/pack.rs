//! §6 wire format — `pack_state`/`pack_bufs` byte packers.
//!
//! Field order and width are part of the specified wire contract, so these
//! are hand-written rather than derived: a `serde` struct derive would
//! reproduce the *fields* but not necessarily the *byte layout* the format
//! names. Strings are length-prefixed UTF-8 (`u32` LE length, then bytes);
//! integers are little-endian fixed-width; `state_time` is epoch seconds.
//!
//! `pack_state` serializes the burst-buffer *configuration* entity (§3, §6);
//! `pack_bufs` serializes a requesting user's slice of the *allocation*
//! table — these are two distinct wire messages, not a name/record pairing.

use std::io::{self, Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{BbConfig, GresLimit};
use crate::state::{AllocRecord, AllocState, NO_VAL};

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> io::Result<u16> {
    let mut b = [0u8; 2];
    cur.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> io::Result<u32> {
    let mut b = [0u8; 4];
    cur.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_str(cur: &mut Cursor<&[u8]>) -> io::Result<String> {
    let len = read_u32(cur)? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn epoch_secs(t: SystemTime) -> u32 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

fn state_tag(state: AllocState) -> u16 {
    match state {
        AllocState::Allocating => 0,
        AllocState::Staging => 1,
        AllocState::StagedIn => 2,
        AllocState::Running => 3,
        AllocState::Teardown => 4,
    }
}

fn state_from_tag(tag: u16) -> io::Result<AllocState> {
    Ok(match tag {
        0 => AllocState::Allocating,
        1 => AllocState::Staging,
        2 => AllocState::StagedIn,
        3 => AllocState::Running,
        4 => AllocState::Teardown,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown allocation state tag {other}"),
            ))
        }
    })
}

/// Serialize the burst-buffer configuration entity, field order per §6.
pub fn pack_state(cfg: &BbConfig) -> Vec<u8> {
    let mut buf = Vec::new();
    write_str(&mut buf, &cfg.allow_users_str);
    write_str(&mut buf, &cfg.deny_users_str);
    write_str(&mut buf, &cfg.get_sys_state);
    write_u32(&mut buf, cfg.granularity_gb);
    write_u32(&mut buf, cfg.gres.len() as u32);
    for g in &cfg.gres {
        write_str(&mut buf, &g.name);
        write_u32(&mut buf, g.avail_cnt);
        write_u32(&mut buf, 0); // used_cnt: configured limits carry no usage.
    }
    write_u16(&mut buf, cfg.private_data as u16);
    write_str(&mut buf, &cfg.start_stage_in);
    write_str(&mut buf, &cfg.start_stage_out);
    write_str(&mut buf, &cfg.stop_stage_in);
    write_str(&mut buf, &cfg.stop_stage_out);
    write_u32(&mut buf, cfg.job_size_limit);
    write_u32(&mut buf, cfg.prio_boost_alloc as u32);
    write_u32(&mut buf, cfg.prio_boost_use as u32);
    write_u32(&mut buf, cfg.stage_in_timeout);
    write_u32(&mut buf, cfg.stage_out_timeout);
    write_u32(&mut buf, cfg.total_space_gb);
    write_u32(&mut buf, cfg.used_space_gb);
    write_u32(&mut buf, cfg.user_size_limit);
    buf
}

pub fn unpack_state(bytes: &[u8]) -> io::Result<BbConfig> {
    let mut cur = Cursor::new(bytes);
    let allow_users_str = read_str(&mut cur)?;
    let deny_users_str = read_str(&mut cur)?;
    let get_sys_state = read_str(&mut cur)?;
    let granularity_gb = read_u32(&mut cur)?;
    let gres_cnt = read_u32(&mut cur)? as usize;
    let mut gres = Vec::with_capacity(gres_cnt);
    for _ in 0..gres_cnt {
        let name = read_str(&mut cur)?;
        let avail_cnt = read_u32(&mut cur)?;
        let _used_cnt = read_u32(&mut cur)?;
        gres.push(GresLimit { name, avail_cnt });
    }
    let private_data = read_u16(&mut cur)? != 0;
    let start_stage_in = read_str(&mut cur)?;
    let start_stage_out = read_str(&mut cur)?;
    let stop_stage_in = read_str(&mut cur)?;
    let stop_stage_out = read_str(&mut cur)?;
    let job_size_limit = read_u32(&mut cur)?;
    let prio_boost_alloc = read_u32(&mut cur)? as i32;
    let prio_boost_use = read_u32(&mut cur)? as i32;
    let stage_in_timeout = read_u32(&mut cur)?;
    let stage_out_timeout = read_u32(&mut cur)?;
    let total_space_gb = read_u32(&mut cur)?;
    let used_space_gb = read_u32(&mut cur)?;
    let user_size_limit = read_u32(&mut cur)?;

    Ok(BbConfig {
        allow_users: crate::codec::parse_users(&allow_users_str),
        allow_users_str,
        deny_users: crate::codec::parse_users(&deny_users_str),
        deny_users_str,
        get_sys_state,
        granularity_gb,
        gres,
        private_data,
        start_stage_in,
        start_stage_out,
        stop_stage_in,
        stop_stage_out,
        job_size_limit,
        user_size_limit,
        prio_boost_alloc,
        prio_boost_use,
        stage_in_timeout,
        stage_out_timeout,
        total_space_gb,
        used_space_gb,
    })
}

/// Serialize the subset of `records` visible to `requester_uid` (§6
/// `pack_bufs`): UID 0 (operator) sees every record, anyone else only their
/// own. Field order per record matches §6 exactly.
pub fn pack_bufs(records: &[AllocRecord], requester_uid: u32) -> Vec<u8> {
    let visible: Vec<&AllocRecord> = records
        .iter()
        .filter(|r| requester_uid == 0 || r.user_id == requester_uid)
        .collect();

    let mut buf = Vec::new();
    write_u32(&mut buf, visible.len() as u32);
    for rec in visible {
        write_u32(&mut buf, rec.array_job_id);
        write_u32(&mut buf, rec.array_task_id);
        write_u32(&mut buf, rec.gres.len() as u32);
        for g in &rec.gres {
            write_str(&mut buf, &g.name);
            write_u32(&mut buf, g.avail_cnt);
            write_u32(&mut buf, g.used_cnt);
        }
        write_u32(&mut buf, rec.job_id.unwrap_or(NO_VAL));
        write_str(&mut buf, rec.name.as_deref().unwrap_or(""));
        write_u32(&mut buf, rec.size);
        write_u16(&mut buf, state_tag(rec.state));
        write_u32(&mut buf, epoch_secs(rec.state_time));
        write_u32(&mut buf, rec.user_id);
    }
    buf
}

/// One allocation record as recovered from a `pack_bufs` buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedAlloc {
    pub array_job_id: u32,
    pub array_task_id: u32,
    pub gres: Vec<(String, u32)>,
    pub job_id: Option<u32>,
    pub name: Option<String>,
    pub size: u32,
    pub state: AllocState,
    pub state_time_epoch: u32,
    pub user_id: u32,
}

pub fn unpack_bufs(bytes: &[u8]) -> io::Result<Vec<PackedAlloc>> {
    let mut cur = Cursor::new(bytes);
    let count = read_u32(&mut cur)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let array_job_id = read_u32(&mut cur)?;
        let array_task_id = read_u32(&mut cur)?;
        let gres_cnt = read_u32(&mut cur)? as usize;
        let mut gres = Vec::with_capacity(gres_cnt);
        for _ in 0..gres_cnt {
            let name = read_str(&mut cur)?;
            let _avail_cnt = read_u32(&mut cur)?;
            let used_cnt = read_u32(&mut cur)?;
            gres.push((name, used_cnt));
        }
        let job_id_raw = read_u32(&mut cur)?;
        let name = read_str(&mut cur)?;
        let size = read_u32(&mut cur)?;
        let state = state_from_tag(read_u16(&mut cur)?)?;
        let state_time_epoch = read_u32(&mut cur)?;
        let user_id = read_u32(&mut cur)?;
        out.push(PackedAlloc {
            array_job_id,
            array_task_id,
            gres,
            job_id: if job_id_raw == NO_VAL { None } else { Some(job_id_raw) },
            name: if name.is_empty() { None } else { Some(name) },
            size,
            state,
            state_time_epoch,
            user_id,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn sample_config() -> BbConfig {
        BbConfig {
            allow_users: vec![1000, 1001],
            allow_users_str: "1000:1001".to_string(),
            deny_users: vec![],
            deny_users_str: String::new(),
            get_sys_state: "/usr/sbin/bb_get_sys_state".to_string(),
            granularity_gb: 4,
            gres: vec![GresLimit { name: "nvme".to_string(), avail_cnt: 10 }],
            private_data: true,
            start_stage_in: "/usr/sbin/bb_start_stage_in".to_string(),
            start_stage_out: "/usr/sbin/bb_start_stage_out".to_string(),
            stop_stage_in: "/usr/sbin/bb_stop_stage_in".to_string(),
            stop_stage_out: "/usr/sbin/bb_stop_stage_out".to_string(),
            job_size_limit: 500,
            user_size_limit: 1000,
            prio_boost_alloc: 10,
            prio_boost_use: 20,
            stage_in_timeout: 300,
            stage_out_timeout: 600,
            total_space_gb: 10_000,
            used_space_gb: 256,
        }
    }

    #[test]
    fn pack_state_round_trips_a_canonical_config() {
        let cfg = sample_config();
        let unpacked = unpack_state(&pack_state(&cfg)).unwrap();
        assert_eq!(unpacked, cfg);
    }

    #[test]
    fn pack_bufs_filters_by_requesting_uid_unless_operator() {
        let now = SystemTime::now();
        let mk = |user_id: u32, job_id: u32, size: u32| AllocRecord {
            name: None,
            job_id: Some(job_id),
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
        };
        let records = vec![mk(1000, 1, 100), mk(2000, 2, 50)];

        let alice_view = unpack_bufs(&pack_bufs(&records, 1000)).unwrap();
        assert_eq!(alice_view.len(), 1);
        assert_eq!(alice_view[0].user_id, 1000);

        let operator_view = unpack_bufs(&pack_bufs(&records, 0)).unwrap();
        assert_eq!(operator_view.len(), 2);
    }

    #[test]
    fn unpack_state_rejects_unknown_state_tag() {
        // A hand-crafted `pack_bufs` single-record buffer with a bad tag.
        let mut buf = Vec::new();
        write_u32(&mut buf, 1); // count
        write_u32(&mut buf, NO_VAL);
        write_u32(&mut buf, NO_VAL);
        write_u32(&mut buf, 0); // gres_cnt
        write_u32(&mut buf, NO_VAL); // job_id
        write_str(&mut buf, "");
        write_u32(&mut buf, 1);
        write_u16(&mut buf, 99); // bad state tag
        write_u32(&mut buf, 0);
        write_u32(&mut buf, 1);
        assert!(unpack_bufs(&buf).is_err());
    }
}
