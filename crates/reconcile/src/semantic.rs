//! Semantic equality predicates.
//!
//! The API canonicalizes some values (lowercased tags, expanded DNS targets,
//! rounded TTLs, normalized CIDRs). A predicate decides whether a planned
//! value means the same thing as the prior one so the plan can keep the prior
//! value instead of proposing a change that would never converge.
//!
//! Predicates are pure functions of `(prior, planned)`.

use crate::value::Value;
use ipnet::IpNet;
use std::net::IpAddr;

/// TTL values the DNS API accepts, ascending.
pub const ALLOWED_TTLS: [i64; 15] = [
    0, 30, 120, 300, 3600, 7200, 14400, 28800, 57600, 86400, 172_800, 345_600, 604_800, 1_209_600,
    2_419_200,
];

/// Outcome of a semantic comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    /// Byte-for-byte equal.
    Equal,
    /// Different.
    Different,
    /// Equal after canonicalization; the prior value should be kept.
    CanonicalizedEqual,
}

impl Equality {
    /// Whether the values mean the same thing.
    pub fn is_equal(self) -> bool {
        !matches!(self, Self::Different)
    }

    /// Combine element-wise results: any difference wins, then any
    /// canonicalization.
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Different, _) | (_, Self::Different) => Self::Different,
            (Self::CanonicalizedEqual, _) | (_, Self::CanonicalizedEqual) => {
                Self::CanonicalizedEqual
            }
            _ => Self::Equal,
        }
    }
}

/// A semantic equality predicate attached to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticEq {
    /// String sets compared ignoring case.
    CaseInsensitiveSet,
    /// IP prefixes compared in canonical form.
    Cidr,
    /// A bare label equals the prior fully-qualified target.
    DnsRecordTarget,
    /// Integers rounded up to an allowed TTL.
    RoundedTtl,
    /// Lists compared as multisets.
    OrderInsensitiveList,
}

impl SemanticEq {
    /// Rewrite a planned value before comparison, returning a warning when
    /// the value was changed.
    pub fn normalize(&self, name: &str, planned: Value) -> (Value, Option<String>) {
        match (self, &planned) {
            (Self::RoundedTtl, Value::Int(ttl)) => {
                let rounded = round_ttl(*ttl);
                if rounded == *ttl {
                    (planned, None)
                } else {
                    let warning = format!(
                        "{name} {ttl} is not an allowed TTL and will be rounded up to {rounded}"
                    );
                    (Value::Int(rounded), Some(warning))
                }
            }
            _ => (planned, None),
        }
    }

    /// Compare a prior value with a planned one.
    pub fn compare(&self, prior: &Value, planned: &Value) -> Equality {
        if prior == planned {
            return Equality::Equal;
        }
        if !prior.is_concrete() || !planned.is_concrete() {
            return Equality::Different;
        }

        let equal = match self {
            Self::CaseInsensitiveSet => case_insensitive_set_eq(prior, planned),
            Self::Cidr => cidr_eq(prior, planned),
            Self::DnsRecordTarget => dns_target_eq(prior, planned),
            Self::RoundedTtl => match (prior.as_i64(), planned.as_i64()) {
                (Some(p), Some(n)) => p == round_ttl(n),
                _ => false,
            },
            Self::OrderInsensitiveList => multiset_eq(prior, planned),
        };

        if equal {
            Equality::CanonicalizedEqual
        } else {
            Equality::Different
        }
    }
}

/// Round a TTL up to the next allowed value; values above the maximum clamp
/// to the maximum.
pub fn round_ttl(ttl: i64) -> i64 {
    ALLOWED_TTLS
        .iter()
        .copied()
        .find(|allowed| *allowed >= ttl)
        .unwrap_or(ALLOWED_TTLS[ALLOWED_TTLS.len() - 1])
}

fn strings_of(value: &Value) -> Option<Vec<&str>> {
    value.elements()?.iter().map(Value::as_str).collect()
}

fn case_insensitive_set_eq(prior: &Value, planned: &Value) -> bool {
    let (Some(prior), Some(planned)) = (strings_of(prior), strings_of(planned)) else {
        return false;
    };
    let fold = |items: Vec<&str>| {
        let mut folded: Vec<String> = items.iter().map(|s| s.to_lowercase()).collect();
        folded.sort();
        folded.dedup();
        folded
    };
    fold(prior) == fold(planned)
}

/// Parse an address or prefix into canonical prefix form.
///
/// A bare address reads as a full-length prefix.
pub fn canonical_cidr(raw: &str) -> Option<IpNet> {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Some(net);
    }
    raw.parse::<IpAddr>().ok().map(IpNet::from)
}

fn cidr_str_eq(prior: &str, planned: &str) -> bool {
    match (canonical_cidr(prior), canonical_cidr(planned)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn cidr_eq(prior: &Value, planned: &Value) -> bool {
    match (prior, planned) {
        (Value::String(a), Value::String(b)) => cidr_str_eq(a, b),
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| match (x.as_str(), y.as_str()) {
                    (Some(x), Some(y)) => cidr_str_eq(x, y),
                    _ => false,
                })
        }
        (Value::Set(a), Value::Set(b)) => {
            let canon = |items: &[Value]| -> Option<Vec<IpNet>> {
                let mut nets: Vec<IpNet> = items
                    .iter()
                    .map(|v| v.as_str().and_then(canonical_cidr))
                    .collect::<Option<_>>()?;
                nets.sort();
                nets.dedup();
                Some(nets)
            };
            matches!((canon(a), canon(b)), (Some(x), Some(y)) if x == y)
        }
        _ => false,
    }
}

fn dns_target_eq(prior: &Value, planned: &Value) -> bool {
    match (prior.as_str(), planned.as_str()) {
        (Some(prior), Some(planned)) => {
            !planned.is_empty()
                && !planned.contains('.')
                && prior
                    .strip_prefix(planned)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
        _ => false,
    }
}

fn multiset_eq(prior: &Value, planned: &Value) -> bool {
    let (Some(a), Some(b)) = (prior.elements(), planned.elements()) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(Value::total_cmp);
    b.sort_by(Value::total_cmp);
    a == b
}
