//! Arena storage for an installed action tree.
//!
//! Nodes live in a `Vec` and link to each other by index. A composite keeps
//! the id of the child that is mid-execution, so resuming a paused tree walks
//! `current` links from the root down to the suspended wait.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, trace};

use crate::core::action::{ActionContext, ActionKind, ResultHook, WorkFn};
use crate::core::outbox::Outbox;
use crate::core::{Action, CallerInfo, PauseInfo, PauseKind, ResultCode, TaskCode, WaitAction};
use crate::util::millis_u64;

pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

/// Lifecycle of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionState {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

/// Outcome of driving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Done(ResultCode),
    Paused,
}

/// What running work can reach on the worker.
pub(crate) struct Env<'a> {
    pub(crate) caller: &'a CallerInfo,
    pub(crate) payload: &'a mut Vec<u8>,
    pub(crate) outbox: &'a mut Outbox,
}

struct Composite {
    work: Option<WorkFn>,
    pending: VecDeque<NodeId>,
    current: Option<NodeId>,
    // Insert position for actions pended while `current` is a wait.
    front: usize,
}

struct WaitNode {
    timeout: Duration,
    target: Option<(PauseKind, String)>,
    on_complete: Option<WorkFn>,
    on_timeout: Option<WorkFn>,
    complete_id: Option<u64>,
    timeout_id: Option<u64>,
}

impl From<WaitAction> for WaitNode {
    fn from(wait: WaitAction) -> Self {
        Self {
            timeout: wait.timeout,
            target: wait.target,
            on_complete: wait.on_complete,
            on_timeout: wait.on_timeout,
            complete_id: None,
            timeout_id: None,
        }
    }
}

enum Body {
    Composite(Composite),
    Wait(WaitNode),
}

struct Node {
    parent: Option<NodeId>,
    affects_parent: bool,
    hook: Option<ResultHook>,
    state: ActionState,
    result: ResultCode,
    body: Body,
}

impl Node {
    const fn is_wait(&self) -> bool {
        matches!(self.body, Body::Wait(_))
    }
}

pub(crate) struct ActionTree {
    nodes: Vec<Node>,
}

impl ActionTree {
    /// Install `action`. A bare wait is wrapped so the root is always a composite.
    pub(crate) fn new(action: Action) -> Self {
        let root = if action.is_wait() {
            Action::empty().then(action)
        } else {
            action
        };
        let mut tree = Self { nodes: Vec::new() };
        tree.insert(root, None);
        tree
    }

    pub(crate) fn execute(&mut self, env: &mut Env<'_>) -> Step {
        self.run(ROOT, env)
    }

    pub(crate) fn resume(&mut self, resume_id: u64, env: &mut Env<'_>) -> Step {
        self.resume_node(ROOT, resume_id, env)
    }

    /// Add `action` under whichever node is active.
    ///
    /// While a wait is current the action lands ahead of the wait's
    /// not-yet-started siblings, after anything pended earlier in the same wait.
    pub(crate) fn pend(&mut self, action: Action) {
        let mut id = ROOT;
        while let Some(next) = self.current_child(id) {
            id = next;
        }
        match self.nodes[id].parent {
            Some(parent) if self.nodes[id].is_wait() => {
                let child = self.insert(action, Some(parent));
                self.push_front(parent, child);
            }
            _ => {
                let child = self.insert(action, Some(id));
                self.push_back(id, child);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ActionState {
        self.nodes[ROOT].state
    }

    fn insert(&mut self, action: Action, parent: Option<NodeId>) -> NodeId {
        let Action {
            kind,
            affects_parent,
            hook,
        } = action;
        let (body, children) = match kind {
            ActionKind::Composite { work, children } => (
                Body::Composite(Composite {
                    work,
                    pending: VecDeque::new(),
                    current: None,
                    front: 0,
                }),
                children,
            ),
            ActionKind::Wait(wait) => (Body::Wait(WaitNode::from(wait)), Vec::new()),
        };
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent,
            affects_parent,
            hook,
            state: ActionState::Idle,
            result: ResultCode::OK,
            body,
        });
        for child in children {
            let child_id = self.insert(child, Some(id));
            self.push_back(id, child_id);
        }
        id
    }

    fn composite_mut(&mut self, id: NodeId) -> Option<&mut Composite> {
        match &mut self.nodes[id].body {
            Body::Composite(composite) => Some(composite),
            Body::Wait(_) => None,
        }
    }

    fn current_child(&self, id: NodeId) -> Option<NodeId> {
        match &self.nodes[id].body {
            Body::Composite(composite) => composite.current,
            Body::Wait(_) => None,
        }
    }

    fn push_back(&mut self, id: NodeId, child: NodeId) {
        if let Some(composite) = self.composite_mut(id) {
            composite.pending.push_back(child);
        }
    }

    fn push_front(&mut self, id: NodeId, child: NodeId) {
        if let Some(composite) = self.composite_mut(id) {
            let at = composite.front.min(composite.pending.len());
            composite.pending.insert(at, child);
            composite.front = at + 1;
        }
    }

    fn run(&mut self, id: NodeId, env: &mut Env<'_>) -> Step {
        match self.nodes[id].state {
            ActionState::Completed | ActionState::Error => {
                return Step::Done(self.nodes[id].result);
            }
            ActionState::Paused => return Step::Paused,
            ActionState::Idle | ActionState::Running => {}
        }
        self.nodes[id].state = ActionState::Running;
        if self.nodes[id].is_wait() {
            return self.start_wait(id, env);
        }

        let work = self.composite_mut(id).and_then(|composite| composite.work.take());
        if let Some(work) = work {
            let (code, pended) = invoke(work, env);
            for action in pended {
                let child = self.insert(action, Some(id));
                self.push_back(id, child);
            }
            if !code.is_ok() {
                return self.finish(id, code);
            }
        }
        self.drain(id, env)
    }

    fn drain(&mut self, id: NodeId, env: &mut Env<'_>) -> Step {
        loop {
            let Some(composite) = self.composite_mut(id) else {
                break;
            };
            let Some(child) = composite.pending.pop_front() else {
                break;
            };
            composite.current = Some(child);
            composite.front = 0;

            match self.run(child, env) {
                Step::Paused => {
                    self.nodes[id].state = ActionState::Paused;
                    return Step::Paused;
                }
                Step::Done(code) => {
                    if let Some(step) = self.child_done(id, child, code) {
                        return step;
                    }
                }
            }
        }
        self.finish(id, ResultCode::OK)
    }

    /// Clear `child` as current. Returns the parent's outcome if the child failed it.
    fn child_done(&mut self, id: NodeId, child: NodeId, code: ResultCode) -> Option<Step> {
        if let Some(composite) = self.composite_mut(id) {
            composite.current = None;
        }
        self.nodes[id].state = ActionState::Running;
        if code.is_ok() || !self.nodes[child].affects_parent {
            return None;
        }
        Some(self.finish(id, code))
    }

    fn finish(&mut self, id: NodeId, code: ResultCode) -> Step {
        let node = &mut self.nodes[id];
        if let Body::Composite(composite) = &mut node.body {
            if !code.is_ok() && !composite.pending.is_empty() {
                trace!(node = id, discarded = composite.pending.len(), "short-circuit");
                composite.pending.clear();
            }
            composite.current = None;
            composite.front = 0;
        }
        node.result = code;
        node.state = if code.is_ok() {
            ActionState::Completed
        } else {
            ActionState::Error
        };
        if let Some(hook) = node.hook.take() {
            hook(code);
        }
        Step::Done(code)
    }

    fn start_wait(&mut self, id: NodeId, env: &mut Env<'_>) -> Step {
        let complete_id = env.outbox.next_seq();
        let timeout_id = env.outbox.next_seq();
        let Body::Wait(wait) = &mut self.nodes[id].body else {
            return Step::Paused;
        };
        wait.complete_id = Some(complete_id);
        wait.timeout_id = Some(timeout_id);
        let pause = wait.target.as_ref().map(|(kind, bundle)| PauseInfo {
            kind: *kind,
            target_bundle_name: bundle.clone(),
            resume_id: complete_id,
        });
        debug!(
            complete_id,
            timeout_id,
            timeout_ms = millis_u64(wait.timeout),
            "wait started"
        );
        env.outbox
            .signal(TaskCode::ResumeTimeout, timeout_id, wait.timeout);
        env.outbox.request_pause(pause, complete_id);
        self.nodes[id].state = ActionState::Paused;
        Step::Paused
    }

    fn resume_node(&mut self, id: NodeId, resume_id: u64, env: &mut Env<'_>) -> Step {
        match self.nodes[id].state {
            ActionState::Paused => {}
            ActionState::Completed | ActionState::Error => {
                return Step::Done(self.nodes[id].result);
            }
            ActionState::Idle | ActionState::Running => {
                debug!(node = id, resume_id, "resume on node that is not paused");
                return Step::Paused;
            }
        }
        if self.nodes[id].is_wait() {
            return self.resume_wait(id, resume_id, env);
        }
        let Some(child) = self.current_child(id) else {
            return Step::Paused;
        };
        match self.resume_node(child, resume_id, env) {
            Step::Paused => Step::Paused,
            Step::Done(code) => {
                if let Some(step) = self.child_done(id, child, code) {
                    return step;
                }
                self.drain(id, env)
            }
        }
    }

    fn resume_wait(&mut self, id: NodeId, resume_id: u64, env: &mut Env<'_>) -> Step {
        let Body::Wait(wait) = &mut self.nodes[id].body else {
            return Step::Paused;
        };
        let (callback, default) = if wait.complete_id == Some(resume_id) {
            (wait.on_complete.take(), ResultCode::OK)
        } else if wait.timeout_id == Some(resume_id) {
            (wait.on_timeout.take(), ResultCode::WAIT_TIMEOUT)
        } else {
            debug!(resume_id, "stray resume ignored");
            return Step::Paused;
        };
        wait.complete_id = None;
        wait.timeout_id = None;
        self.nodes[id].state = ActionState::Running;

        let code = match callback {
            Some(callback) => {
                let (code, pended) = invoke(callback, env);
                if let Some(parent) = self.nodes[id].parent {
                    for action in pended {
                        let child = self.insert(action, Some(parent));
                        self.push_front(parent, child);
                    }
                }
                code
            }
            None => default,
        };
        self.finish(id, code)
    }
}

fn invoke(work: WorkFn, env: &mut Env<'_>) -> (ResultCode, Vec<Action>) {
    let mut ctx = ActionContext::new(env.caller, &mut *env.payload, &mut *env.outbox);
    let code = work(&mut ctx);
    (code, ctx.into_pended())
}
