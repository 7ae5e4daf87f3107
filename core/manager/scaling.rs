use crate::util::Limit;

/// How a pool decides to grow. Pools never shrink through the policy: workers only go away
/// when they close themselves or are closed by the manager.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalingPolicy {
    /// Spawn up to a fixed number of workers right away.
    Static(usize),

    /// Grow towards a fixed number of workers as tasks queue up.
    Incremental(usize),

    /// Grow without bound as tasks queue up.
    Elastic,
}

impl ScalingPolicy {
    pub fn new(num_workers: Limit, incremental: bool) -> Self {
        match num_workers {
            Limit::Unlimited => ScalingPolicy::Elastic,
            Limit::AtMost(max) => {
                let max = usize::try_from(max).unwrap_or(usize::MAX);
                if incremental {
                    ScalingPolicy::Incremental(max)
                } else {
                    ScalingPolicy::Static(max)
                }
            }
        }
    }

    /// How many workers to add, given how many there are, how many of them are idle, and how
    /// many tasks are waiting to be picked up.
    pub fn workers_to_spawn(&self, current: usize, idle: usize, queued: usize) -> usize {
        match *self {
            ScalingPolicy::Static(max) => max.saturating_sub(current),
            ScalingPolicy::Elastic => queued.saturating_sub(idle),
            ScalingPolicy::Incremental(max) => {
                if current >= max {
                    return 0;
                }
                let wanted = current.saturating_add(queued).saturating_sub(idle);
                wanted.min(max).saturating_sub(current)
            }
        }
    }
}
