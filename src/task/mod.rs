//! Task and process data model.
//!
//! [`Task`] is the unit of scheduling, [`Process`] the address-space and
//! signal-disposition owner grouping tasks, [`TaskTable`] the slot storage
//! the scheduler addresses tasks through.

mod process;
mod table;
#[allow(clippy::module_inception)]
mod task;

pub use process::{Process, ProcessInner};
pub use table::TaskTable;
pub use task::{Pgid, Pid, Task, TaskId, TaskState};
