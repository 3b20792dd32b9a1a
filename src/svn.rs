use crate::types::NUM_SVNS;
use core::fmt;
use core::num::NonZeroU8;

/// Galileo SVN.
///
/// The satellite number, between 1 and 36. The value is stored as a
/// `NonZeroU8` and range-checked at construction, so an `Svn` always holds
/// a valid satellite number.
///
/// # Examples
///
/// An `Svn` is constructed from an integer with `TryFrom`:
///
/// ```
/// use osnma_rx::Svn;
///
/// let svn = Svn::try_from(24).unwrap();
/// assert_eq!(format!("{}", svn), "E24");
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Svn(NonZeroU8);

impl Svn {
    /// Returns an iterator over all the SVNs, from E01 to E36.
    pub fn iter() -> impl Iterator<Item = Svn> {
        (1..=NUM_SVNS).map(|x| Svn::try_from(x).unwrap())
    }
}

macro_rules! impl_conv {
    ($t: ty) => {
        impl From<Svn> for $t {
            fn from(svn: Svn) -> $t {
                svn.0.get().into()
            }
        }

        impl TryFrom<$t> for Svn {
            type Error = SvnError;
            fn try_from(value: $t) -> Result<Svn, SvnError> {
                let max = <$t>::try_from(NUM_SVNS).unwrap();
                if (1..=max).contains(&value) {
                    // cannot panic; bounds checked above
                    Ok(Svn(NonZeroU8::new(u8::try_from(value).unwrap()).unwrap()))
                } else {
                    Err(SvnError::OutOfRange)
                }
            }
        }
    };
}

impl_conv!(u8);
impl_conv!(u16);
impl_conv!(u32);
impl_conv!(u64);
impl_conv!(i16);
impl_conv!(i32);
impl_conv!(i64);

impl From<Svn> for usize {
    fn from(svn: Svn) -> usize {
        svn.0.get().into()
    }
}

impl TryFrom<usize> for Svn {
    type Error = SvnError;
    fn try_from(value: usize) -> Result<Svn, SvnError> {
        if (1..=NUM_SVNS).contains(&value) {
            Ok(Svn(NonZeroU8::new(u8::try_from(value).unwrap()).unwrap()))
        } else {
            Err(SvnError::OutOfRange)
        }
    }
}

/// Formats an SVN in the usual way, as `"Exx"` (for instance `"E24"`).
impl fmt::Display for Svn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02}", self.0)
    }
}

/// SVN construction error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SvnError {
    /// The value is outside the range 1-36.
    OutOfRange,
}

impl fmt::Display for SvnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvnError::OutOfRange => "SVN outside the range 1-36".fmt(f),
        }
    }
}

impl std::error::Error for SvnError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_int() {
        for j in 1..=NUM_SVNS {
            assert!(Svn::try_from(j).is_ok());
        }
        assert_eq!(Svn::try_from(0usize), Err(SvnError::OutOfRange));
        assert_eq!(Svn::try_from(37u8), Err(SvnError::OutOfRange));
    }

    #[test]
    fn format() {
        assert_eq!(format!("{}", Svn::try_from(3).unwrap()), "E03");
        assert_eq!(format!("{}", Svn::try_from(24).unwrap()), "E24");
    }

    #[test]
    fn iterator() {
        let mut n = 0;
        for svn in Svn::iter() {
            n += 1;
            assert_eq!(usize::from(svn), n);
        }
        assert_eq!(n, NUM_SVNS);
    }
}
