mod emit;
mod state;

pub(crate) use state::{install, simulate, uninstall};

/// The fatal signals that can be intercepted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum Signal {
    Abort = libc::SIGABRT,
    Bus = libc::SIGBUS,
    Fpe = libc::SIGFPE,
    Illegal = libc::SIGILL,
    Pipe = libc::SIGPIPE,
    Segv = libc::SIGSEGV,
}

impl Signal {
    /// Every supported signal, in table order. [`crate::SignalSet`] bit
    /// positions and the saved-handler table are both indexed by position in
    /// this array, never by raw signal number.
    pub const ALL: [Self; 6] = [
        Self::Abort,
        Self::Bus,
        Self::Fpe,
        Self::Illegal,
        Self::Pipe,
        Self::Segv,
    ];

    /// The symbolic name, e.g. `SIGSEGV`.
    ///
    /// Returns a static string so the signal handler can use it without
    /// allocating.
    pub fn name(self) -> &'static str {
        match self {
            Self::Abort => "SIGABRT",
            Self::Bus => "SIGBUS",
            Self::Fpe => "SIGFPE",
            Self::Illegal => "SIGILL",
            Self::Pipe => "SIGPIPE",
            Self::Segv => "SIGSEGV",
        }
    }

    pub(crate) fn from_raw(signum: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| *s as i32 == signum)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Abort => 0,
            Self::Bus => 1,
            Self::Fpe => 2,
            Self::Illegal => 3,
            Self::Pipe => 4,
            Self::Segv => 5,
        }
    }

    #[inline]
    pub(crate) fn bit(self) -> u8 {
        1 << self.index()
    }
}

#[cfg(test)]
mod test {
    use super::Signal;

    #[test]
    fn table_order_matches_indices() {
        for (i, sig) in Signal::ALL.into_iter().enumerate() {
            assert_eq!(sig.index(), i);
            assert_eq!(Signal::from_raw(sig as i32), Some(sig));
        }
        assert_eq!(Signal::from_raw(libc::SIGTERM), None);
    }

    #[test]
    fn names_are_symbolic() {
        assert_eq!(Signal::Segv.name(), "SIGSEGV");
        assert_eq!(Signal::Pipe.name(), "SIGPIPE");
    }
}
