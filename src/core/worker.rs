//! The serial worker thread.
//!
//! All scheduler state lives on one dedicated OS thread. Callers talk to it
//! through a bounded command queue; the thread sleeps on that queue until a
//! command arrives or the next timer falls due. Closing the queue lets the
//! worker drain what is already buffered and then drop every remaining task.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, trace};

use crate::config::SchedulerConfig;
use crate::core::watchdog::Heartbeat;
use crate::core::{Action, CallerInfo, PauseKind, SchedulerError, SchedulerStats, Task, TaskManager};

/// Work sent to the serial worker.
pub(crate) enum Command {
    Post {
        task: Task,
        due: Instant,
    },
    Complete {
        resume_id: u64,
    },
    TryResume {
        kind: PauseKind,
        caller: CallerInfo,
    },
    Pend {
        action: Action,
        reply: Sender<Result<(), SchedulerError>>,
    },
    Stats {
        reply: Sender<SchedulerStats>,
    },
}

/// Spawn the worker thread that owns `manager`.
pub(crate) fn spawn(
    config: &SchedulerConfig,
    manager: TaskManager,
    commands: Receiver<Command>,
    heartbeat: Arc<Heartbeat>,
) -> Result<JoinHandle<()>, SchedulerError> {
    thread::Builder::new()
        .name(config.worker_thread_name.clone())
        .stack_size(config.worker_stack_size)
        .spawn(move || run(manager, &commands, &heartbeat))
        .map_err(|e| SchedulerError::Worker(format!("failed to spawn worker thread: {e}")))
}

fn run(mut manager: TaskManager, commands: &Receiver<Command>, heartbeat: &Heartbeat) {
    debug!("worker thread started");
    loop {
        let received = match manager.next_deadline() {
            Some(deadline) => match commands.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        heartbeat.begin();
        manager.advance_to(Instant::now());
        if let Some(command) = received {
            handle(&mut manager, command);
        }
        heartbeat.end();
    }

    let dropped = manager.shutdown();
    info!(dropped, "worker thread exiting");
}

fn handle(manager: &mut TaskManager, command: Command) {
    match command {
        Command::Post { task, due } => {
            trace!(task_id = task.seq_id(), "post received");
            manager.accept(task, due);
        }
        Command::Complete { resume_id } => manager.complete(resume_id),
        Command::TryResume { kind, caller } => {
            manager.try_resume(kind, &caller);
        }
        Command::Pend { action, reply } => {
            let _ = reply.send(manager.pend(action));
        }
        Command::Stats { reply } => {
            let _ = reply.send(manager.stats());
        }
    }
}
