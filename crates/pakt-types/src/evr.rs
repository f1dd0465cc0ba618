//! RPM-style epoch:version-release parsing and comparison.

use std::cmp::Ordering;
use std::fmt;

/// A package version split into epoch, version and release.
///
/// The text form is `[epoch:]version[-release]`; a missing epoch is 0 and
/// a missing release compares equal to any release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    pub fn parse(text: &str) -> Self {
        let (epoch, rest) = match text.split_once(':') {
            Some((e, rest)) => (e.parse().unwrap_or(0), rest),
            None => (0, text),
        };
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };
        Self {
            epoch,
            version,
            release,
        }
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.version)?;
        if let Some(release) = &self.release {
            write!(f, "-{release}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ordering => return ordering,
        }
        match vercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ordering => return ordering,
        }
        match (&self.release, &other.release) {
            (Some(a), Some(b)) => vercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

/// Compares two full EVR strings.
pub fn compare_evr(a: &str, b: &str) -> Ordering {
    Evr::parse(a).cmp(&Evr::parse(b))
}

/// Segment-wise version comparison in the rpm manner: alternating
/// numeric and alphabetic segments, numeric beats alphabetic, `~` sorts
/// before anything including the end of the string.
fn vercmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // tilde is a pre-release marker
        match (a.first() == Some(&b'~'), b.first() == Some(&b'~')) {
            (true, true) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        // skip separator characters
        let skip = |s: &[u8]| -> usize {
            s.iter()
                .take_while(|c| !c.is_ascii_alphanumeric() && **c != b'~')
                .count()
        };
        a = &a[skip(a)..];
        b = &b[skip(b)..];

        if a.is_empty() || b.is_empty() {
            break;
        }

        let numeric = a[0].is_ascii_digit();
        let take = |s: &[u8]| -> usize {
            s.iter()
                .take_while(|c| {
                    if numeric {
                        c.is_ascii_digit()
                    } else {
                        c.is_ascii_alphabetic()
                    }
                })
                .count()
        };
        let seg_a_len = take(a);
        let seg_b_len = take(b);

        // a numeric segment always beats an alphabetic one
        if seg_b_len == 0 {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        if seg_a_len == 0 {
            return Ordering::Less;
        }

        let seg_a = &a[..seg_a_len];
        let seg_b = &b[..seg_b_len];
        let ordering = if numeric {
            let trim = |s: &[u8]| -> usize { s.iter().take_while(|c| **c == b'0').count() };
            let na = &seg_a[trim(seg_a)..];
            let nb = &seg_b[trim(seg_b)..];
            na.len().cmp(&nb.len()).then_with(|| na.cmp(nb))
        } else {
            seg_a.cmp(seg_b)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }

        a = &a[seg_a_len..];
        b = &b[seg_b_len..];
    }

    a.len().cmp(&b.len())
}
