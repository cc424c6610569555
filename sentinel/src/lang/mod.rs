//! Small data structures the services are built on.

pub mod linked_list;
pub mod operation_queue;
pub mod queue;

pub use linked_list::{LinkedList, NodeId};
pub use operation_queue::{OperationQueue, QueueError, QueueOptions, Submission};
pub use queue::Queue;
