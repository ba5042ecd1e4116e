use anyhow::{bail, Context, Result};

/// Parse a port range argument into `(low, high)`, both in 1..=65535.
///
/// Supported forms:
/// - inclusive range: `3000-5000`
/// - single port: `4370` (same as `4370-4370`)
/// - surrounding whitespace is ignored
pub fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    let s = s.trim();
    if let Some((a, b)) = s.split_once('-') {
        let low = parse_port_str(a.trim()).with_context(|| format!("invalid start in range: {a}"))?;
        let high = parse_port_str(b.trim()).with_context(|| format!("invalid end in range: {b}"))?;
        if low > high {
            bail!("invalid range {low}-{high} (start > end)");
        }
        return Ok((low, high));
    }

    let p = parse_port_str(s).with_context(|| format!("invalid port value: {s}"))?;
    Ok((p, p))
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
