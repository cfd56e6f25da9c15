//! Compact/expand prefix-indexed node name sets, e.g. `abc[0482-0484,0507-0509]`.

/// A single parsed name: a textual prefix plus a numeric suffix with its
/// original zero-padded width, or a name with no trailing digits at all.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Parsed {
    prefix: String,
    suffix: Option<(u64, usize)>, // (value, width including leading zeros)
}

fn parse_name(name: &str) -> Parsed {
    let digit_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);

    match digit_start {
        Some(i) if i < name.len() => {
            let prefix = name[..i].to_string();
            let digits = &name[i..];
            let value: u64 = digits.parse().unwrap_or(0);
            Parsed {
                prefix,
                suffix: Some((value, digits.len())),
            }
        }
        _ => Parsed {
            prefix: name.to_string(),
            suffix: None,
        },
    }
}

fn format_suffix(value: u64, width: usize) -> String {
    format!("{:0width$}", value, width = width)
}

/// Groups names by common prefix, sorts numeric suffixes, and emits
/// contiguous runs as `prefix[lo-hi]`, with discontiguous/singleton
/// members as comma-separated items inside the brackets. Names with no
/// numeric suffix pass through unchanged. Leading zeros are preserved.
pub fn compact(names: &[String]) -> Vec<String> {
    use std::collections::BTreeMap;

    // prefix -> width -> sorted distinct values
    let mut groups: BTreeMap<String, BTreeMap<usize, Vec<u64>>> = BTreeMap::new();
    let mut bare: Vec<String> = Vec::new();

    for name in names {
        let parsed = parse_name(name);
        match parsed.suffix {
            Some((value, width)) => {
                groups
                    .entry(parsed.prefix)
                    .or_default()
                    .entry(width)
                    .or_default()
                    .push(value);
            }
            None => bare.push(parsed.prefix),
        }
    }

    let mut out = Vec::new();
    for (prefix, by_width) in groups {
        for (width, mut values) in by_width {
            values.sort_unstable();
            values.dedup();
            let runs = contiguous_runs(&values);
            if runs.len() == 1 && runs[0].0 == runs[0].1 {
                out.push(format!("{prefix}{}", format_suffix(runs[0].0, width)));
                continue;
            }
            let body = runs
                .iter()
                .map(|(lo, hi)| {
                    if lo == hi {
                        format_suffix(*lo, width)
                    } else {
                        format!("{}-{}", format_suffix(*lo, width), format_suffix(*hi, width))
                    }
                })
                .collect::<Vec<_>>()
                .join(",");
            out.push(format!("{prefix}[{body}]"));
        }
    }
    out.extend(bare);
    out
}

fn contiguous_runs(sorted: &[u64]) -> Vec<(u64, u64)> {
    let mut runs = Vec::new();
    let mut iter = sorted.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut lo = first;
    let mut hi = first;
    for v in iter {
        if v == hi + 1 {
            hi = v;
        } else {
            runs.push((lo, hi));
            lo = v;
            hi = v;
        }
    }
    runs.push((lo, hi));
    runs
}

/// Inverse of [`compact`]: expands `prefix[lo-hi,...]` entries back into
/// individual names, preserving the zero-padded width of each bound.
pub fn expand(names: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for name in names {
        out.extend(expand_one(name));
    }
    out
}

fn expand_one(name: &str) -> Vec<String> {
    let Some(open) = name.find('[') else {
        return vec![name.to_string()];
    };
    let Some(close) = name.rfind(']') else {
        return vec![name.to_string()];
    };
    if close < open {
        return vec![name.to_string()];
    }
    let prefix = &name[..open];
    let body = &name[open + 1..close];
    let mut result = Vec::new();
    for part in body.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let width = lo.len();
            let lo_v: u64 = match lo.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let hi_v: u64 = match hi.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            for v in lo_v..=hi_v {
                result.push(format!("{prefix}{}", format_suffix(v, width)));
            }
        } else if !part.is_empty() {
            result.push(format!("{prefix}{part}"));
        }
    }
    result
}

/// Parses a comma-separated text form (possibly containing `prefix[...]`
/// groups) into the internal flat list of individual names.
pub fn expand_list(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    expand(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compact_contiguous_run() {
        let names = v(&["Node0201", "Node0202", "Node0203"]);
        assert_eq!(compact(&names), v(&["Node[0201-0203]"]));
    }

    #[test]
    fn compact_discontiguous() {
        let names = v(&["Node0201", "Node0202", "Node0205"]);
        assert_eq!(compact(&names), v(&["Node[0201-0202,0205]"]));
    }

    #[test]
    fn compact_singleton_no_brackets() {
        let names = v(&["Node0201"]);
        assert_eq!(compact(&names), v(&["Node0201"]));
    }

    #[test]
    fn expand_is_inverse_of_compact_set() {
        let names = v(&["n7", "n1", "n3", "n2", "other"]);
        let compacted = compact(&names);
        let round_tripped = expand(&compacted);
        let mut a: Vec<_> = names.clone();
        let mut b = round_tripped;
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn compact_is_fixed_point_on_canonical_input() {
        let canonical = v(&["sw[1-3]"]);
        let expanded = expand(&canonical);
        let recompacted = compact(&expanded);
        assert_eq!(recompacted, canonical);
    }

    #[test]
    fn expand_preserves_leading_zeros() {
        let expanded = expand(&v(&["fake[0008-0010]"]));
        assert_eq!(expanded, v(&["fake0008", "fake0009", "fake0010"]));
    }

    #[test]
    fn expand_list_parses_csv_with_groups() {
        let result = expand_list("a[1-2],b3,c[5-6,9]");
        assert_eq!(
            result,
            v(&["a1", "a2", "b3", "c5", "c6", "c9"])
        );
    }

    #[test]
    fn expand_list_empty_text() {
        assert!(expand_list("").is_empty());
        assert!(expand_list("   ").is_empty());
    }

    #[test]
    fn bare_names_without_digits_pass_through() {
        let names = v(&["switch-a", "switch-b"]);
        let mut compacted = compact(&names);
        compacted.sort();
        assert_eq!(compacted, v(&["switch-a", "switch-b"]));
    }
}
