//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` to avoid heap allocation for the
//! common case. Ordering is numeric arc by arc, never textual, so
//! `1.3.6.1.2` sorts before `1.3.6.1.10`.

use crate::error::{Error, OidErrorKind, Result};
use smallvec::SmallVec;
use std::fmt;

/// Maximum number of arcs accepted when decoding (RFC 2578 Section 3.5).
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create an OID from arc values.
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse dotted-decimal notation such as `"1.3.6.1.2.1.1.1.0"`.
    ///
    /// A single leading dot is tolerated. Empty components, non-numeric
    /// components and arcs above `u32::MAX` are rejected.
    ///
    /// ```
    /// use snmp_session::oid::Oid;
    ///
    /// let oid = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
    /// assert_eq!(oid.len(), 9);
    /// assert!(Oid::parse("1..3").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let body = s.strip_prefix('.').unwrap_or(s);
        if body.is_empty() {
            return Err(Error::invalid_oid_with_input(OidErrorKind::Empty, s));
        }

        body.split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s));
                }
                part.parse::<u32>()
                    .map_err(|_| Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s))
            })
            .collect::<Result<SmallVec<_>>>()
            .map(|arcs| Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Check if this OID starts with another OID.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// `true` if `self` lies inside the subtree rooted at `root`.
    ///
    /// The root itself is part of its subtree.
    pub fn in_subtree(&self, root: &Oid) -> bool {
        self.starts_with(root)
    }

    /// `true` if `self` comes strictly after `prev` in numeric arc order.
    ///
    /// A proper extension of `prev` always follows it.
    pub fn follows(&self, prev: &Oid) -> bool {
        self > prev
    }

    /// Arcs left after removing `prefix`, or `None` if `self` is not under it.
    pub fn suffix_after(&self, prefix: &Oid) -> Option<&[u32]> {
        self.arcs.strip_prefix(prefix.arcs.as_slice())
    }

    /// Parent OID (all arcs except the last).
    pub fn parent(&self) -> Option<Oid> {
        let (_, head) = self.arcs.split_last()?;
        Some(Oid::from_slice(head))
    }

    /// Last arc, if any.
    pub fn last(&self) -> Option<u32> {
        self.arcs.last().copied()
    }

    /// Create a child OID by appending an arc.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }

    /// Create a new OID by appending several arcs.
    pub fn extend(&self, more: &[u32]) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.extend_from_slice(more);
        Oid { arcs }
    }

    /// Validate the first two arcs per X.690 Section 8.19.4.
    pub fn validate(&self) -> Result<()> {
        match self.arcs.as_slice() {
            [first, ..] if *first > 2 => {
                Err(Error::invalid_oid(OidErrorKind::InvalidFirstArc(*first)))
            }
            [first, second, ..] if *first < 2 && *second >= 40 => {
                Err(Error::invalid_oid(OidErrorKind::InvalidSecondArc {
                    first: *first,
                    second: *second,
                }))
            }
            _ => Ok(()),
        }
    }

    /// Encode the OID content octets (X.690 Section 8.19).
    ///
    /// The first two arcs share one subidentifier `arc1 * 40 + arc2`.
    pub fn to_ber(&self) -> SmallVec<[u8; 64]> {
        let mut out = SmallVec::new();
        let (first, rest) = match self.arcs.as_slice() {
            [] => return out,
            [a] => (a.saturating_mul(40), &[][..]),
            [a, b, rest @ ..] => (a.saturating_mul(40).saturating_add(*b), rest),
        };
        push_subidentifier(&mut out, first);
        for &arc in rest {
            push_subidentifier(&mut out, arc);
        }
        out
    }

    /// Decode OID content octets.
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        let mut arcs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut pos = 0;

        while pos < data.len() {
            let (value, used) = read_subidentifier(&data[pos..])?;
            if pos == 0 {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            pos += used;

            if arcs.len() > MAX_OID_LEN {
                return Err(Error::invalid_oid(OidErrorKind::InvalidArc));
            }
        }

        Ok(Self { arcs })
    }
}

/// `true` iff `next` comes strictly after `oid` in numeric arc order.
///
/// Comparison is component by component as unsigned integers; an OID that
/// runs out first precedes any continuation of itself.
pub fn oid_follows_oid(oid: &Oid, next: &Oid) -> bool {
    next.follows(oid)
}

/// `true` iff `candidate`'s leading arcs equal all of `root`'s arcs.
pub fn oid_in_subtree(root: &Oid, candidate: &Oid) -> bool {
    candidate.in_subtree(root)
}

fn push_subidentifier(out: &mut SmallVec<[u8; 64]>, value: u32) {
    let groups = (32 - value.leading_zeros()).div_ceil(7).max(1);
    for i in (0..groups).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7F) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

fn read_subidentifier(data: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > (u32::MAX >> 7) {
            return Err(Error::invalid_oid(OidErrorKind::SubidentifierOverflow));
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::invalid_oid(OidErrorKind::InvalidArc))
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut arcs = self.arcs.iter();
        if let Some(first) = arcs.next() {
            write!(f, "{}", first)?;
            for arc in arcs {
                write!(f, ".{}", arc)?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.arcs.as_slice().cmp(other.arcs.as_slice())
    }
}

/// Build an [`Oid`] from literal arcs.
///
/// ```
/// use snmp_session::oid;
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr.to_string(), "1.3.6.1.2.1.1.1.0");
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),* $(,)?) => {
        $crate::oid::Oid::from_slice(&[$($arc),*])
    };
}
