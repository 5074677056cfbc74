//! Fractional index allocation for sibling ordering.
//!
//! Ranks are strings compared byte-wise. Generated keys use the base-62
//! alphabet `0-9A-Za-z` (ASCII order) and never end in `'0'`, which keeps room
//! below every generated key. Bounds coming from storage may be arbitrary
//! strings (legacy `a0`/`a1` style keys included); the allocator only relies
//! on byte order and still produces a key strictly inside the range.
//!
//! Allocation is pure: the result depends only on the two bounds.

use tracing::warn;

/// Base-62 digit alphabet, in byte order.
pub const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Key returned when there are no bounds at all (the middle digit).
pub const BASELINE_RANK: &str = "V";

/// Key strictly between `lower` and `upper`.
///
/// Absent or empty bounds are open. When the range is empty
/// (`lower >= upper`, or an upper bound like `"0"` with nothing below it) the
/// upper bound is ignored with a warning and a key after `lower` is returned.
pub fn allocate(lower: Option<&str>, upper: Option<&str>) -> String {
    let lower = lower.filter(|s| !s.is_empty());
    let upper = upper.filter(|s| !s.is_empty());
    let lo = lower.map(str::as_bytes).unwrap_or_default();

    if let (Some(l), Some(h)) = (lower, upper) {
        if l >= h {
            warn!(lower = l, upper = h, "invalid rank range, allocating after lower bound");
            return into_key(key_after(lo), lower);
        }
    }

    match midpoint(lo, upper.map(str::as_bytes)) {
        Some(key) => into_key(key, lower),
        None => {
            warn!(
                lower = lower.unwrap_or(""),
                upper = upper.unwrap_or(""),
                "no room below upper bound, allocating after lower bound"
            );
            into_key(key_after(lo), lower)
        }
    }
}

/// `n` strictly increasing keys between `lower` and `upper`.
///
/// Keys are produced by recursive bisection so they stay short and evenly
/// spread. An empty range is handled like [`allocate`] does, warning once.
pub fn allocate_n(lower: Option<&str>, upper: Option<&str>, n: usize) -> Vec<String> {
    let lower = lower.filter(|s| !s.is_empty());
    let mut upper = upper.filter(|s| !s.is_empty());

    if n > 0 && !has_room(lower, upper) {
        warn!(
            lower = lower.unwrap_or(""),
            upper = upper.unwrap_or(""),
            count = n,
            "empty rank range, allocating after lower bound"
        );
        upper = None;
    }

    let mut keys = Vec::with_capacity(n);
    bisect(lower, upper, n, &mut keys);
    keys
}

fn bisect(lower: Option<&str>, upper: Option<&str>, n: usize, out: &mut Vec<String>) {
    if n == 0 {
        return;
    }
    let key = allocate(lower, upper);
    let left = n / 2;
    bisect(lower, Some(&key), left, out);
    let right = n - left - 1;
    out.push(key.clone());
    bisect(Some(&key), upper, right, out);
}

/// Whether `key` lies strictly inside the (open-ended) range.
pub fn is_between(lower: Option<&str>, key: &str, upper: Option<&str>) -> bool {
    lower.is_none_or(|l| l.is_empty() || l < key) && upper.is_none_or(|u| u.is_empty() || key < u)
}

/// Whether some key exists strictly between the bounds.
pub fn has_room(lower: Option<&str>, upper: Option<&str>) -> bool {
    let lo = lower.map(str::as_bytes).unwrap_or_default();
    midpoint(lo, upper.filter(|s| !s.is_empty()).map(str::as_bytes)).is_some()
}

fn into_key(bytes: Vec<u8>, lower: Option<&str>) -> String {
    // Splits only ever happen before ASCII bytes, so this is valid UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|_| format!("{}{BASELINE_RANK}", lower.unwrap_or("")))
}

/// Middle base-62 digit strictly between two optional bytes, never `'0'`.
fn digit_between(lo: Option<u8>, hi: Option<u8>) -> Option<u8> {
    let candidates: Vec<u8> = BASE62[1..]
        .iter()
        .copied()
        .filter(|&d| lo.is_none_or(|l| d > l) && hi.is_none_or(|h| d < h))
        .collect();
    candidates.get(candidates.len() / 2).copied()
}

/// Shortest-growth key strictly after `s`.
///
/// Bumps the first byte that still has headroom, so repeated appends grow the
/// key slowly instead of by one byte each time.
fn key_after(s: &[u8]) -> Vec<u8> {
    for (j, &b) in s.iter().enumerate() {
        if let Some(d) = digit_between(Some(b), None) {
            let mut key = s[..j].to_vec();
            key.push(d);
            return key;
        }
    }
    let mut key = s.to_vec();
    key.extend_from_slice(BASELINE_RANK.as_bytes());
    key
}

/// Key strictly between `lo` and `hi`; an empty `lo` is unbounded below.
///
/// Returns `None` when the range is empty.
pub(crate) fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Option<Vec<u8>> {
    let Some(hi) = hi else {
        return Some(key_after(lo));
    };
    if lo >= hi {
        return None;
    }

    let n = lo.iter().zip(hi).take_while(|(a, b)| a == b).count();
    // lo < hi, so hi is strictly longer than the shared prefix.
    let h = hi[n];
    let l = lo.get(n).copied();
    let mut key = hi[..n].to_vec();

    if let Some(d) = digit_between(l, Some(h)) {
        key.push(d);
        return Some(key);
    }

    match l {
        // Adjacent digits: keep lo's digit and go past the rest of lo.
        Some(x) => {
            key.push(x);
            key.extend(key_after(&lo[n + 1..]));
            Some(key)
        }
        None if h > b'0' => {
            key.push(b'0');
            key.extend_from_slice(BASELINE_RANK.as_bytes());
            Some(key)
        }
        None if h == b'0' => {
            key.push(b'0');
            key.extend(midpoint(&[], Some(&hi[n + 1..]))?);
            Some(key)
        }
        None => None,
    }
}
