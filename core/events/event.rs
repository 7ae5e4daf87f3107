#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManagerEvent {
    ManagerStarted { manager: String },
    ManagerStopped { manager: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerEvent {
    WorkerStarted { manager: String, worker: String },
    WorkerClosed { manager: String, worker: String },
    WorkerRestarted { manager: String, worker: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskEvent {
    TaskSubmitted {
        task: String,
    },
    TaskCompleted {
        task: String,
        worker: String,
    },
    TaskFailed {
        task: String,
        worker: String,
        error: String,
    },
    TaskCancelled {
        task: String,
    },
}

#[derive(Default, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    /// The "nothing happened" event.
    #[default]
    Noop,
    ManagerEvent(ManagerEvent),
    TaskEvent(TaskEvent),
    WorkerEvent(WorkerEvent),
}

impl From<ManagerEvent> for Event {
    fn from(value: ManagerEvent) -> Self {
        Event::ManagerEvent(value)
    }
}

impl From<TaskEvent> for Event {
    fn from(value: TaskEvent) -> Self {
        Event::TaskEvent(value)
    }
}

impl From<WorkerEvent> for Event {
    fn from(value: WorkerEvent) -> Self {
        Event::WorkerEvent(value)
    }
}
