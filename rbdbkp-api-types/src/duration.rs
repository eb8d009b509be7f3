use anyhow::{bail, Error};

/// Seconds-per-unit table for `restore-point remove --age`.
///
/// `M` (month) and `y` (year) are fixed-length approximations, matching
/// the original tool's constants rather than calendar-aware arithmetic:
/// `M` = 2629746s (365.2425d / 12), `y` = 31556952s (365.2425d).
const SECONDS_PER_UNIT: &[(char, i64)] = &[
    ('s', 1),
    ('m', 60),
    ('h', 3600),
    ('d', 86400),
    ('M', 2_629_746),
    ('y', 31_556_952),
];

/// Parse a duration string like `7d`, `30m`, `2y` into a number of seconds.
pub fn parse_duration(input: &str) -> Result<i64, Error> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration string");
    }
    let unit = input
        .chars()
        .last()
        .ok_or_else(|| anyhow::anyhow!("empty duration string"))?;
    let (digits, multiplier) = match SECONDS_PER_UNIT.iter().find(|(u, _)| *u == unit) {
        Some((_, mult)) => (&input[..input.len() - unit.len_utf8()], *mult),
        None => bail!("unrecognized duration suffix in {input:?}; expected one of s,m,h,d,M,y"),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration value in {input:?}"))?;
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("7d").unwrap(), 7 * 86400);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert_eq!(parse_duration("30m").unwrap(), 30 * 60);
        assert_eq!(parse_duration("2y").unwrap(), 2 * 31_556_952);
        assert_eq!(parse_duration("1M").unwrap(), 2_629_746);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("7x").is_err());
        assert!(parse_duration("d").is_err());
    }
}
