//! C3 — size/user string codec (§4.3).

use std::ffi::CString;

/// Round `v` up to the next multiple of `granularity` (no-op below 2).
fn round_up(v: u32, granularity: u32) -> u32 {
    if granularity <= 1 {
        return v;
    }
    let rem = v % granularity;
    if rem == 0 {
        v
    } else {
        v.saturating_add(granularity - rem)
    }
}

/// Parse a size literal (§6 grammar): `[1-9][0-9]*(M|G|T|P)?`, case
/// insensitive, no suffix = GiB. Rounds up to `granularity` GiB. A
/// non-positive numeric prefix yields 0 (§8 boundary: `parse_size("0")=0`).
pub fn parse_size(tok: &str, granularity: u32) -> u32 {
    let tok = tok.trim();
    if tok.is_empty() {
        return 0;
    }

    let (digits, suffix) = match tok.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&tok[..tok.len() - 1], Some(c.to_ascii_uppercase())),
        _ => (tok, None),
    };

    let value: i64 = match digits.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    if value <= 0 {
        return 0;
    }
    let value = value as u64;

    let gib: u64 = match suffix {
        Some('M') => (value + 1023) / 1024,
        Some('G') | None => value,
        Some('T') => value * 1024,
        Some('P') => value * 1024 * 1024,
        Some(_) => return 0,
    };

    let gib = gib.min(u32::MAX as u64) as u32;
    round_up(gib, granularity.max(1))
}

/// Literal-power-of-1024 integer parser used for GRES counts. Unlike
/// `parse_size`, `K`/`M`/`G` are taken at face value with no unit
/// conversion, and a non-positive prefix yields 0 (§4.3 note, §8 boundary).
pub fn atoi(tok: &str) -> u64 {
    let tok = tok.trim();
    if tok.is_empty() {
        return 0;
    }

    let (digits, scale) = match tok.chars().last() {
        Some('k') | Some('K') => (&tok[..tok.len() - 1], 1024u64),
        Some('m') | Some('M') => (&tok[..tok.len() - 1], 1024 * 1024),
        Some('g') | Some('G') => (&tok[..tok.len() - 1], 1024 * 1024 * 1024),
        _ => (tok, 1u64),
    };

    let value: i64 = match digits.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    if value <= 0 {
        return 0;
    }
    value as u64 * scale
}

/// Resolve one token to a numeric UID: a bare integer is taken as-is;
/// anything else is looked up with `getpwnam`. Returns `None` (logged) on an
/// unknown name or UID 0.
fn resolve_uid(token: &str) -> Option<u32> {
    if let Ok(uid) = token.parse::<u32>() {
        if uid == 0 {
            eprintln!("warning: parse_users: ignoring uid 0 in {token:?}");
            return None;
        }
        return Some(uid);
    }

    let name = match CString::new(token) {
        Ok(name) => name,
        Err(_) => {
            eprintln!("warning: parse_users: invalid username {token:?}");
            return None;
        }
    };

    // SAFETY: `getpwnam` is thread-unsafe on some platforms (returns a
    // pointer to static storage); callers of `parse_users` must not call it
    // concurrently from multiple threads. The CLI's config loader runs this
    // on a single task, which is the only caller today.
    let pwd = unsafe { libc::getpwnam(name.as_ptr()) };
    if pwd.is_null() {
        eprintln!("warning: parse_users: unknown user {token:?}");
        return None;
    }
    let uid = unsafe { (*pwd).pw_uid };
    if uid == 0 {
        eprintln!("warning: parse_users: ignoring uid 0 for user {token:?}");
        return None;
    }
    Some(uid)
}

/// Parse a colon-delimited list of UID strings or usernames (§4.3). A comma
/// truncates the buffer at the first occurrence, matching the historical
/// behavior of accepting a trailing comment/suffix on the config line.
pub fn parse_users(buf: &str) -> Vec<u32> {
    let buf = match buf.split_once(',') {
        Some((head, _)) => head,
        None => buf,
    };

    buf.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(resolve_uid)
        .collect()
}

/// Inverse of [`parse_users`]: colon-join the UIDs in order.
pub fn print_users(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(":")
}
