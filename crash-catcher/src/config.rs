use crate::signal::Signal;

/// The interceptor categories [`crate::CrashReporter::begin_catching`] can
/// activate, each independently togglable.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CatchOption {
    /// Fatal POSIX signals, per the configured [`SignalSet`]
    Signals,
    /// Unwinding panics that reach the process-wide panic hook
    Panics,
    /// System low-memory pressure notifications
    LowMemory,
}

impl CatchOption {
    const ALL: [Self; 3] = [Self::Signals, Self::Panics, Self::LowMemory];

    #[inline]
    fn bit(self) -> u8 {
        match self {
            Self::Signals => 1 << 0,
            Self::Panics => 1 << 1,
            Self::LowMemory => 1 << 2,
        }
    }
}

/// A set of [`CatchOption`] flags.
///
/// The default set enables every interceptor category.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CatchOptions(u8);

impl CatchOptions {
    pub const EMPTY: Self = Self(0);

    /// The set containing only the given option.
    #[inline]
    pub fn only(option: CatchOption) -> Self {
        Self(option.bit())
    }

    #[inline]
    pub fn all() -> Self {
        CatchOption::ALL.into_iter().collect()
    }

    #[inline]
    pub fn insert(&mut self, option: CatchOption) {
        self.0 |= option.bit();
    }

    #[inline]
    pub fn remove(&mut self, option: CatchOption) {
        self.0 &= !option.bit();
    }

    #[inline]
    pub fn contains(self, option: CatchOption) -> bool {
        self.0 & option.bit() != 0
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for CatchOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<CatchOption> for CatchOptions {
    fn from_iter<I: IntoIterator<Item = CatchOption>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for option in iter {
            set.insert(option);
        }
        set
    }
}

/// A set of [`Signal`] flags, the signals the interceptor will hook.
///
/// The default set contains all six supported fault signals.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SignalSet(u8);

impl SignalSet {
    pub const EMPTY: Self = Self(0);

    /// The set containing only the given signal.
    #[inline]
    pub fn only(signal: Signal) -> Self {
        Self(signal.bit())
    }

    #[inline]
    pub fn all() -> Self {
        Signal::ALL.into_iter().collect()
    }

    #[inline]
    pub fn insert(&mut self, signal: Signal) {
        self.0 |= signal.bit();
    }

    #[inline]
    pub fn remove(&mut self, signal: Signal) {
        self.0 &= !signal.bit();
    }

    #[inline]
    pub fn contains(self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterates the member signals in [`Signal::ALL`] order.
    pub fn iter(self) -> impl Iterator<Item = Signal> {
        Signal::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Signal> for SignalSet {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for signal in iter {
            set.insert(signal);
        }
        set
    }
}

/// The process-wide catching configuration.
///
/// Mutable only while not actively catching; the reporter enforces this with
/// an explicit state check rather than convention.
#[derive(Copy, Clone, Debug, Default)]
pub struct CatchConfiguration {
    pub options: CatchOptions,
    pub signals: SignalSet,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_operations() {
        let mut signals = SignalSet::EMPTY;
        assert!(!signals.contains(Signal::Segv));

        signals.insert(Signal::Segv);
        signals.insert(Signal::Abort);
        assert!(signals.contains(Signal::Segv));
        assert!(signals.contains(Signal::Abort));
        assert!(!signals.contains(Signal::Pipe));

        signals.remove(Signal::Segv);
        assert!(!signals.contains(Signal::Segv));

        let merged = signals.union(SignalSet::only(Signal::Fpe));
        assert_eq!(merged.iter().count(), 2);

        assert_eq!(SignalSet::all().iter().count(), Signal::ALL.len());
    }

    #[test]
    fn default_options_enable_everything() {
        let options = CatchOptions::default();
        assert!(options.contains(CatchOption::Signals));
        assert!(options.contains(CatchOption::Panics));
        assert!(options.contains(CatchOption::LowMemory));

        let mut narrowed = options;
        narrowed.remove(CatchOption::LowMemory);
        assert!(!narrowed.contains(CatchOption::LowMemory));
        assert!(narrowed.contains(CatchOption::Signals));
    }
}
