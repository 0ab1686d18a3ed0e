//! Thread-safe instruction queue
//!
//! The REPL thread enqueues; the worker drains at iteration boundaries.
//! Drain order is `(priority asc, timestamp asc)` with a sequence number
//! breaking exact-timestamp ties.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::clock::Clock;
use crate::domain::{Instruction, InstructionKind, InstructionPriority};

struct QueueInner {
    items: Vec<(u64, Instruction)>,
    next_seq: u64,
}

/// Priority queue of REPL-submitted instructions.
pub struct InstructionQueue {
    inner: Mutex<QueueInner>,
    clock: Arc<dyn Clock>,
}

impl InstructionQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: Vec::new(),
                next_seq: 0,
            }),
            clock,
        }
    }

    /// Add one instruction.
    pub fn enqueue(&self, content: impl Into<String>, kind: InstructionKind, priority: InstructionPriority) {
        let instruction = Instruction {
            content: content.into(),
            kind,
            priority,
            timestamp: self.clock.now(),
        };
        debug!(kind = %instruction.kind, priority = %instruction.priority, "InstructionQueue::enqueue");

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.items.push((seq, instruction));
    }

    /// Remove and return all items in drain order; the queue is left empty.
    pub fn dequeue_all(&self) -> Vec<Instruction> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut items = std::mem::take(&mut inner.items);
        sort_instructions(&mut items);
        items.into_iter().map(|(_, i)| i).collect()
    }

    /// All items in drain order without removing them.
    pub fn peek_all(&self) -> Vec<Instruction> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut items = inner.items.clone();
        sort_instructions(&mut items);
        items.into_iter().map(|(_, i)| i).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_instructions(items: &mut [(u64, Instruction)]) {
    items.sort_by(|(seq_a, a), (seq_b, b)| {
        a.priority
            .cmp(&b.priority)
            .then(a.timestamp.cmp(&b.timestamp))
            .then(seq_a.cmp(seq_b))
    });
}

/// Render instructions as a prompt block, grouped by type with critical
/// entries flagged.
pub fn format_for_prompt(instructions: &[Instruction]) -> String {
    if instructions.is_empty() {
        return String::new();
    }

    let mut block = String::from("## User Instructions\n\n");
    for kind in [
        InstructionKind::UserInput,
        InstructionKind::PlanUpdate,
        InstructionKind::Constraint,
        InstructionKind::Clarification,
        InstructionKind::Acceptance,
    ] {
        let group: Vec<&Instruction> = instructions.iter().filter(|i| i.kind == kind).collect();
        if group.is_empty() {
            continue;
        }

        block.push_str(&format!("### {}\n", heading_for(kind)));
        for instruction in group {
            if instruction.priority == InstructionPriority::Critical {
                block.push_str(&format!("- **[CRITICAL]** {}\n", instruction.content));
            } else {
                block.push_str(&format!("- {}\n", instruction.content));
            }
        }
        block.push('\n');
    }
    block
}

fn heading_for(kind: InstructionKind) -> &'static str {
    match kind {
        InstructionKind::UserInput => "User input",
        InstructionKind::PlanUpdate => "Plan updates",
        InstructionKind::Constraint => "Constraints",
        InstructionKind::Clarification => "Clarifications",
        InstructionKind::Acceptance => "Acceptance criteria",
    }
}
