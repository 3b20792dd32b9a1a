/// Galileo week number.
pub type Wn = u16;
/// Time of week in seconds.
pub type Tow = u32;

const SECS_IN_WEEK: Tow = 24 * 3600 * 7;
const SECS_PER_SUBFRAME: Tow = 30;

/// Converts a week number and time of week to seconds since the Galileo epoch.
///
/// The Galileo epoch is 1999-08-22 00:00:00 UTC. No leap second correction
/// is applied; consumers that need UTC apply the offset themselves.
///
/// # Examples
///
/// ```
/// use osnma_rx::gst2timestamp;
///
/// assert_eq!(gst2timestamp(0, 0), 0);
/// assert_eq!(gst2timestamp(1, 30), 604830);
/// ```
pub fn gst2timestamp(wn: Wn, tow: Tow) -> i64 {
    i64::from(wn) * i64::from(SECS_IN_WEEK) + i64::from(tow)
}

/// GST (Galileo System Time).
///
/// Stored as a week number and a time of week in seconds.
///
/// # Examples
/// ```
/// use osnma_rx::Gst;
///
/// let gst = Gst::new(1176, 121050);
/// assert_eq!(gst.wn(), 1176);
/// assert_eq!(gst.tow(), 121050);
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Gst {
    wn: Wn,
    tow: Tow,
}

impl Gst {
    /// Constructs a new GST from a week number and TOW.
    ///
    /// # Panics
    ///
    /// Panics if `tow` is 604800 or greater (the number of seconds in a
    /// week).
    pub fn new(wn: Wn, tow: Tow) -> Self {
        assert!(tow < SECS_IN_WEEK);
        Gst { wn, tow }
    }

    /// Returns the week number.
    pub fn wn(&self) -> Wn {
        self.wn
    }

    /// Returns the time of week.
    pub fn tow(&self) -> Tow {
        self.tow
    }

    /// Returns the seconds elapsed since the Galileo epoch.
    ///
    /// Equivalent to [`gst2timestamp`] applied to the week number and time
    /// of week of `self`.
    pub fn timestamp(&self) -> i64 {
        gst2timestamp(self.wn, self.tow)
    }

    /// Adds `seconds` seconds to the GST and returns the sum.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_rx::Gst;
    ///
    /// let gst = Gst::new(1176, 121050);
    /// let next_page = gst.add_seconds(2);
    /// assert_eq!(next_page.tow(), 121052);
    /// assert_eq!(next_page.add_seconds(-2), gst);
    /// ```
    pub fn add_seconds(&self, seconds: i32) -> Self {
        let secs_in_week = i32::try_from(SECS_IN_WEEK).unwrap();
        let weeks = seconds / secs_in_week;
        let seconds = seconds - weeks * secs_in_week;
        let mut tow = i32::try_from(self.tow).unwrap() + seconds;
        let mut wn = i32::from(self.wn) + weeks;
        if tow < 0 {
            wn -= 1;
            tow += secs_in_week;
        } else if tow >= secs_in_week {
            wn += 1;
            tow -= secs_in_week;
        }
        assert!((0..secs_in_week).contains(&tow));
        Gst {
            wn: wn.try_into().unwrap(),
            tow: tow.try_into().unwrap(),
        }
    }

    /// Adds `subframes` 30-second sub-frames to the GST and returns the sum.
    pub fn add_subframes(&self, subframes: i32) -> Self {
        self.add_seconds(subframes * i32::try_from(SECS_PER_SUBFRAME).unwrap())
    }

    /// Returns the number of sub-frames from `other` to `self`.
    ///
    /// The result is negative when `self` is earlier than `other`. Both
    /// GSTs should correspond to sub-frame boundaries.
    pub fn subframes_difference(&self, other: Gst) -> i64 {
        (self.timestamp() - other.timestamp()) / i64::from(SECS_PER_SUBFRAME)
    }

    /// Returns the GST at the start of the sub-frame that contains `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_rx::Gst;
    ///
    /// let gst = Gst::new(1176, 121057);
    /// assert_eq!(gst.gst_subframe().tow(), 121050);
    /// ```
    pub fn gst_subframe(&self) -> Self {
        Gst {
            wn: self.wn,
            tow: self.tow / SECS_PER_SUBFRAME * SECS_PER_SUBFRAME,
        }
    }

    /// Returns `true` if `self` lies on a sub-frame boundary.
    pub fn is_subframe(&self) -> bool {
        self.tow % SECS_PER_SUBFRAME == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let gst = Gst::new(1176, 604770);
        assert_eq!(gst.add_seconds(30), Gst::new(1177, 0));
        assert_eq!(Gst::new(1177, 0).add_seconds(-30), gst);
        assert_eq!(gst.add_subframes(2), Gst::new(1177, 30));
    }

    #[test]
    fn subframe_rounding() {
        let gst = Gst::new(1176, 121079);
        assert_eq!(gst.gst_subframe(), Gst::new(1176, 121050));
        assert!(!gst.is_subframe());
        assert!(gst.gst_subframe().is_subframe());
    }

    #[test]
    fn subframes_difference() {
        let a = Gst::new(1177, 30);
        let b = Gst::new(1176, 604770);
        assert_eq!(a.subframes_difference(b), 2);
        assert_eq!(b.subframes_difference(a), -2);
    }

    #[test]
    fn timestamp() {
        assert_eq!(Gst::new(0, 0).timestamp(), 0);
        assert_eq!(Gst::new(1176, 121050).timestamp(), 1176 * 604800 + 121050);
    }
}
