//! C2 — burst-buffer pool JSON parser (§4.2, §6).
//!
//! The wire document is a JSON object whose keys are pool names and whose
//! values are arrays of pool descriptors. Only the *last* top-level key's
//! array ends up materialized (see Open Question 1, SPEC_FULL.md §9): this
//! mirrors the historical parser walking the object with a single reused
//! cursor rather than one per key, and is preserved deliberately rather than
//! "fixed", since downstream config reload depends on observing it.

use serde_json::Value;

/// One parsed pool descriptor (§3 Pool entry: raw `{id, units, granularity,
/// quantity, free}` plus derived `{gb_granularity, gb_quantity, gb_free}`).
/// The raw fields are kept verbatim in whatever `units` the document used;
/// the `gb_*` fields are always in gigabytes, converted per §4.2.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub name: String,
    pub units: String,
    pub granularity: u32,
    pub quantity: u32,
    pub free: u32,
    pub gb_granularity: u32,
    pub gb_quantity: u32,
    pub gb_free: u32,
}

/// Parse a pool document, returning only the entries from the last key whose
/// value is a JSON array (see module docs).
pub fn parse_pools(json: &str) -> anyhow::Result<Vec<PoolEntry>> {
    let doc: Value = serde_json::from_str(json)?;
    let obj = doc
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("pool document is not a JSON object"))?;

    let mut last: Option<(&str, &Vec<Value>)> = None;
    for (key, value) in obj.iter() {
        if let Some(arr) = value.as_array() {
            last = Some((key.as_str(), arr));
        }
    }

    let Some((_key, entries)) = last else {
        return Ok(Vec::new());
    };

    Ok(entries.iter().filter_map(parse_entry).collect())
}

fn parse_entry(v: &Value) -> Option<PoolEntry> {
    let obj = v.as_object()?;
    let name = obj.get("id")?.as_str()?.to_string();
    let granularity_bytes = obj.get("granularity")?.as_u64()?;
    let quantity_raw = obj.get("quantity")?.as_u64()?;
    let free_raw = obj.get("free")?.as_u64()?;
    let units = obj.get("units").and_then(Value::as_str).unwrap_or("gb").to_string();

    let to_gb = |raw: u64| -> u32 {
        if units == "bytes" {
            // Scale by granularity/2^30 as specified, clamping to u32.
            let gb = (raw as f64 * granularity_bytes as f64) / (1u64 << 30) as f64;
            gb.round().min(u32::MAX as f64).max(0.0) as u32
        } else {
            raw.min(u32::MAX as u64) as u32
        }
    };
    let granularity = granularity_bytes.min(u32::MAX as u64) as u32;

    Some(PoolEntry {
        name,
        units,
        granularity,
        quantity: quantity_raw.min(u32::MAX as u64) as u32,
        free: free_raw.min(u32::MAX as u64) as u32,
        gb_granularity: granularity,
        gb_quantity: to_gb(quantity_raw),
        gb_free: to_gb(free_raw),
    })
}
