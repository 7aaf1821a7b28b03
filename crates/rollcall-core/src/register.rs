//! Who is expected, who has shown up.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// First sighting today; the caller should log and announce it.
    NewlyPresent,
    AlreadyPresent,
    NotOnRoster,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    pub name: String,
    /// Wall-clock time of the first confirmed sighting, `HH:MM:SS`.
    pub arrived_at: Option<String>,
}

/// Attendance state for one session, in roster order.
#[derive(Debug, Clone)]
pub struct Register {
    attendees: Vec<Attendee>,
}

impl Register {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attendees: names
                .into_iter()
                .map(|name| Attendee {
                    name: name.into(),
                    arrived_at: None,
                })
                .collect(),
        }
    }

    /// What `mark_present` would report for `name`, without changing anything.
    pub fn check(&self, name: &str) -> MarkOutcome {
        match self.attendees.iter().find(|a| a.name == name) {
            None => MarkOutcome::NotOnRoster,
            Some(a) if a.arrived_at.is_some() => MarkOutcome::AlreadyPresent,
            Some(_) => MarkOutcome::NewlyPresent,
        }
    }

    pub fn mark_present(&mut self, name: &str, time: &str) -> MarkOutcome {
        match self.attendees.iter_mut().find(|a| a.name == name) {
            None => MarkOutcome::NotOnRoster,
            Some(a) if a.arrived_at.is_some() => MarkOutcome::AlreadyPresent,
            Some(a) => {
                a.arrived_at = Some(time.to_string());
                MarkOutcome::NewlyPresent
            }
        }
    }

    /// Mark a name present from an earlier record. Returns false if the
    /// name is not on the roster.
    pub fn restore(&mut self, name: &str, time: &str) -> bool {
        match self.attendees.iter_mut().find(|a| a.name == name) {
            Some(a) => {
                if a.arrived_at.is_none() {
                    a.arrived_at = Some(time.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn is_present(&self, name: &str) -> bool {
        self.attendees
            .iter()
            .any(|a| a.name == name && a.arrived_at.is_some())
    }

    pub fn present(&self) -> Vec<&Attendee> {
        self.attendees.iter().filter(|a| a.arrived_at.is_some()).collect()
    }

    pub fn absent(&self) -> Vec<&str> {
        self.attendees
            .iter()
            .filter(|a| a.arrived_at.is_none())
            .map(|a| a.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_present_once() {
        let mut r = Register::new(["Ada", "Grace"]);
        assert_eq!(r.mark_present("Grace", "09:00:01"), MarkOutcome::NewlyPresent);
        assert_eq!(r.mark_present("Grace", "09:05:00"), MarkOutcome::AlreadyPresent);
        assert_eq!(r.present()[0].arrived_at.as_deref(), Some("09:00:01"));
        assert_eq!(r.absent(), vec!["Ada"]);
    }

    #[test]
    fn test_check_does_not_mark() {
        let mut r = Register::new(["Ada"]);
        assert_eq!(r.check("Ada"), MarkOutcome::NewlyPresent);
        assert_eq!(r.check("Ada"), MarkOutcome::NewlyPresent);
        assert_eq!(r.check("Linus"), MarkOutcome::NotOnRoster);
        r.mark_present("Ada", "09:00:00");
        assert_eq!(r.check("Ada"), MarkOutcome::AlreadyPresent);
    }

    #[test]
    fn test_unknown_name() {
        let mut r = Register::new(["Ada"]);
        assert_eq!(r.mark_present("Linus", "10:00:00"), MarkOutcome::NotOnRoster);
        assert!(!r.restore("Linus", "10:00:00"));
    }

    #[test]
    fn test_restore_blocks_new_mark() {
        let mut r = Register::new(["Ada", "Grace"]);
        assert!(r.restore("Ada", "08:59:59"));
        assert!(r.is_present("Ada"));
        assert_eq!(r.mark_present("Ada", "09:10:00"), MarkOutcome::AlreadyPresent);
        assert_eq!(r.absent(), vec!["Grace"]);
    }

    #[test]
    fn test_absent_keeps_roster_order() {
        let r = Register::new(["C", "A", "B"]);
        assert_eq!(r.absent(), vec!["C", "A", "B"]);
    }
}
