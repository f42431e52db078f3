mod exit_loop;
mod prompt_task;
mod task_unit;
mod workflow;

pub use exit_loop::{EXIT_LOOP_TOOL_NAME, exit_loop};
pub use flowkit_core::Node;
pub use prompt_task::PromptExecutor;
pub use task_unit::{TaskExecutor, TaskUnit, TaskUnitBuilder};
pub use workflow::{
    DEFAULT_LOOP_MAX_ITERATIONS, ExitCheck, LoopFlow, LoopFlowBuilder, ParallelFlow,
    SequentialFlow,
};
