//! Tokens and wire state.
//!
//! A token carries an iteration index plus a temporal guard (begin,
//! span): the value becomes visible only once `span` has elapsed since
//! `begin`. Every directed edge owns two tokens, the visible real token
//! and the shadow token nodes write into; time advances copy shadow to
//! real, so no token crosses more than one hop per time step.

/// Slack on guarded reads, absorbing accumulated floating-point rounding.
pub const GUARD_SLACK: f64 = 0.001;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Token {
    value: Option<u64>,
    begin: f64,
    span: f64,
    armed: bool,
}

impl Token {
    pub fn clear(&mut self) {
        *self = Token::default();
    }

    /// Set the value without touching the guard.
    pub fn set(&mut self, value: u64) {
        self.value = Some(value);
    }

    /// Set the value and arm the guard.
    pub fn guarded_set(&mut self, value: u64, begin: f64, span: f64) {
        self.value = Some(value);
        self.begin = begin;
        self.span = span;
        self.armed = true;
    }

    pub fn deassert_guard(&mut self) {
        self.armed = false;
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Guarded read: the value is visible only once the guard has
    /// elapsed, with the documented slack.
    pub fn read(&self, now: f64) -> Option<u64> {
        match self.value {
            Some(v) if !self.armed || now - self.begin >= self.span - GUARD_SLACK => Some(v),
            _ => None,
        }
    }

    pub fn readable_at(&self, now: f64) -> bool {
        self.read(now).is_some()
    }
}

/// The real and shadow tokens a directed edge owns.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeState {
    pub real: Token,
    pub shadow: Token,
}

impl EdgeState {
    /// Make the shadow generation visible.
    pub fn commit(&mut self) {
        self.real = self.shadow;
    }

    pub fn clear(&mut self) {
        self.real.clear();
        self.shadow.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_unreadable() {
        let t = Token::default();
        assert!(!t.is_set());
        assert_eq!(t.read(100.0), None);
    }

    #[test]
    fn test_guard_elapses() {
        let mut t = Token::default();
        t.guarded_set(7, 2.0, 1.0);
        assert_eq!(t.read(2.0), None);
        assert_eq!(t.read(2.5), None);
        assert_eq!(t.read(3.0), Some(7));
        assert_eq!(t.read(10.0), Some(7));
    }

    #[test]
    fn test_guard_slack() {
        let mut t = Token::default();
        t.guarded_set(3, 0.0, 1.0);
        // within the 0.001 slack
        assert_eq!(t.read(0.9995), Some(3));
        assert_eq!(t.read(0.99), None);
    }

    #[test]
    fn test_deassert_guard_makes_readable() {
        let mut t = Token::default();
        t.guarded_set(1, 0.0, 5.0);
        assert_eq!(t.read(1.0), None);
        t.deassert_guard();
        assert_eq!(t.read(1.0), Some(1));
    }

    #[test]
    fn test_zero_span_readable_at_begin() {
        let mut t = Token::default();
        t.guarded_set(1, 0.0, 0.0);
        assert_eq!(t.read(0.0), Some(1));
    }

    #[test]
    fn test_commit_copies_whole_token() {
        let mut e = EdgeState::default();
        e.shadow.guarded_set(4, 1.0, 2.0);
        assert!(!e.real.is_set());
        e.commit();
        assert_eq!(e.real, e.shadow);
        assert_eq!(e.real.read(3.0), Some(4));
    }
}
