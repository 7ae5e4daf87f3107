use super::TaskError;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A set of signals carried by an [Action].
///
/// Flags combine with `|`, so a single action can report more than one thing at once.
///
#[derive(Default, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ActionFlag(u8);

impl ActionFlag {
    pub const NONE: ActionFlag = ActionFlag(0);
    pub const DONE: ActionFlag = ActionFlag(1);
    pub const EXCEPTION: ActionFlag = ActionFlag(1 << 1);
    pub const CLOSE: ActionFlag = ActionFlag(1 << 2);
    pub const RESTART: ActionFlag = ActionFlag(1 << 3);
    pub const RESET: ActionFlag = ActionFlag(1 << 4);

    const NAMES: [(ActionFlag, &'static str); 5] = [
        (Self::DONE, "DONE"),
        (Self::EXCEPTION, "EXCEPTION"),
        (Self::CLOSE, "CLOSE"),
        (Self::RESTART, "RESTART"),
        (Self::RESET, "RESET"),
    ];

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// True when every bit in `other` is also set here.
    pub fn contains(&self, other: ActionFlag) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when at least one bit in `other` is also set here.
    pub fn intersects(&self, other: ActionFlag) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: ActionFlag) {
        self.0 |= other.0
    }

    pub fn remove(&mut self, other: ActionFlag) {
        self.0 &= !other.0
    }
}

impl BitOr for ActionFlag {
    type Output = ActionFlag;

    fn bitor(self, rhs: Self) -> Self::Output {
        ActionFlag(self.0 | rhs.0)
    }
}

impl BitAnd for ActionFlag {
    type Output = ActionFlag;

    fn bitand(self, rhs: Self) -> Self::Output {
        ActionFlag(self.0 & rhs.0)
    }
}

impl BitOrAssign for ActionFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs)
    }
}

impl std::fmt::Debug for ActionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return f.write_str("NONE");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// A message on one of the pool's buses.
///
/// Workers post actions on the shared response bus to report task outcomes (`DONE`,
/// `EXCEPTION`) and their own lifecycle (`CLOSE`, `RESTART`). The manager posts actions on a
/// worker's private request bus to ask it to `CLOSE`, `RESTART` or `RESET` its counters.
///
#[derive(Default, Debug, Clone)]
pub struct Action {
    flag: ActionFlag,
    task_name: Option<String>,
    worker_name: Option<String>,
    exception: Option<TaskError>,
}

impl Action {
    pub fn new(flag: ActionFlag) -> Self {
        Self {
            flag,
            ..Self::default()
        }
    }

    pub fn done(task_name: &str, worker_name: &str) -> Self {
        Self::new(ActionFlag::DONE)
            .with_task(task_name)
            .with_worker(worker_name)
    }

    pub fn exception(task_name: &str, worker_name: &str, err: TaskError) -> Self {
        Self::new(ActionFlag::EXCEPTION)
            .with_task(task_name)
            .with_worker(worker_name)
            .with_exception(err)
    }

    pub fn close() -> Self {
        Self::new(ActionFlag::CLOSE)
    }

    pub fn restart() -> Self {
        Self::new(ActionFlag::RESTART)
    }

    pub fn reset() -> Self {
        Self::new(ActionFlag::RESET)
    }

    pub fn with_task(mut self, task_name: &str) -> Self {
        self.task_name = Some(task_name.to_string());
        self
    }

    pub fn with_worker(mut self, worker_name: &str) -> Self {
        self.worker_name = Some(worker_name.to_string());
        self
    }

    pub fn with_exception(mut self, err: TaskError) -> Self {
        self.exception = Some(err);
        self
    }

    pub fn flag(&self) -> ActionFlag {
        self.flag
    }

    /// True when any of the bits in `flags` is set on this action.
    pub fn matches(&self, flags: ActionFlag) -> bool {
        self.flag.intersects(flags)
    }

    pub fn add_flag(&mut self, flag: ActionFlag) {
        self.flag.insert(flag)
    }

    pub fn remove_flag(&mut self, flag: ActionFlag) {
        self.flag.remove(flag)
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    pub fn worker_name(&self) -> Option<&str> {
        self.worker_name.as_deref()
    }

    pub fn exception_ref(&self) -> Option<&TaskError> {
        self.exception.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;

    impl Arbitrary for ActionFlag {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            ActionFlag(u8::arbitrary(g) & 0b11111)
        }
    }

    #[quickcheck]
    fn union_contains_both_sides(a: ActionFlag, b: ActionFlag) -> bool {
        let both = a | b;
        both.contains(a) && both.contains(b)
    }

    #[quickcheck]
    fn intersection_is_contained_in_both_sides(a: ActionFlag, b: ActionFlag) -> bool {
        let both = a & b;
        a.contains(both) && b.contains(both)
    }

    #[quickcheck]
    fn removing_a_flag_clears_it(a: ActionFlag, b: ActionFlag) -> bool {
        let mut flag = a | b;
        flag.remove(b);
        !flag.intersects(b)
    }

    #[test]
    fn none_matches_nothing() {
        let action = Action::new(ActionFlag::NONE);
        assert!(!action.matches(ActionFlag::DONE | ActionFlag::EXCEPTION));
        assert_eq!(format!("{:?}", action.flag()), "NONE");
    }

    #[test]
    fn matching_any_of_many_flags() {
        let mut action = Action::done("task", "worker");
        assert!(action.matches(ActionFlag::DONE | ActionFlag::EXCEPTION));
        assert!(!action.matches(ActionFlag::CLOSE | ActionFlag::RESTART));

        action.add_flag(ActionFlag::RESTART);
        assert!(action.matches(ActionFlag::CLOSE | ActionFlag::RESTART));
        assert_eq!(format!("{:?}", action.flag()), "DONE|RESTART");

        action.remove_flag(ActionFlag::RESTART);
        assert!(!action.matches(ActionFlag::RESTART));
    }

    #[test]
    fn outcome_actions_carry_task_and_worker() {
        let action = Action::exception("t-1", "w-1", TaskError::Cancelled("t-1".into()));
        assert_eq!(action.task_name(), Some("t-1"));
        assert_eq!(action.worker_name(), Some("w-1"));
        assert_matches!(action.exception_ref(), Some(TaskError::Cancelled(_)));
    }
}
