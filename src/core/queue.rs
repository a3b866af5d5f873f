//! # Command Queue and Response Slot Module / 命令队列与响应槽模块
//!
//! The only two cross-thread primitives of an auxiliary instance:
//!
//! - the **command queue**, an ordered, unbounded, single-consumer queue from
//!   the façade to the worker thread;
//! - the **response slot**, a single-item overwritable cell the worker writes
//!   the outcome of its latest command into.
//!
//! 辅助实例仅有的两个跨线程原语：
//! - **命令队列**：从外观对象到工作线程的有序、无界、单消费者队列；
//! - **响应槽**：单元素、可覆盖的单元，工作线程将最新命令的结果写入其中。

use crate::core::message::{Command, CorrelationId, Response};
use std::collections::BTreeSet;
use tokio::sync::{mpsc, watch};

/// Creates a connected command queue.
pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Creates a connected response slot, initially empty.
pub fn response_slot() -> (SlotWriter, SlotReader) {
    let (tx, rx) = watch::channel(None);
    (SlotWriter { tx }, SlotReader { rx })
}

/// Producer side of the command queue, held by the façade.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Enqueues a command. Hands it back when the worker has closed the queue.
    pub fn enqueue(&self, command: Command) -> Result<(), Command> {
        self.tx.send(command).map_err(|err| err.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the command queue, owned by the worker thread.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandReceiver {
    /// Blocks the calling (non-async) thread until a command arrives.
    ///
    /// Returns `None` once every sender is gone and the queue is empty.
    pub fn next_blocking(&mut self) -> Option<Command> {
        self.rx.blocking_recv()
    }

    /// Closes the queue and returns every command still waiting in it.
    ///
    /// After this call no command can be enqueued any more, so none can be
    /// stranded without a response.
    ///
    /// 关闭队列并返回其中仍在等待的所有命令。
    /// 调用之后无法再入队任何命令，因此不会有命令在没有响应的情况下被遗留。
    pub fn close_and_drain(&mut self) -> Vec<Command> {
        close_and_drain(&mut self.rx)
    }
}

/// A queue that can stop accepting work and hand back what it still holds.
pub trait Backlog {
    type Item;

    /// Refuses every later enqueue.
    fn close(&mut self);

    /// Takes the next waiting item without blocking.
    fn take_next(&mut self) -> Option<Self::Item>;
}

impl Backlog for mpsc::UnboundedReceiver<Command> {
    type Item = Command;

    fn close(&mut self) {
        mpsc::UnboundedReceiver::close(self);
    }

    fn take_next(&mut self) -> Option<Command> {
        self.try_recv().ok()
    }
}

/// Closes `backlog` first, then takes everything that got in before the close.
pub fn close_and_drain<B: Backlog>(backlog: &mut B) -> Vec<B::Item> {
    backlog.close();
    std::iter::from_fn(|| backlog.take_next()).collect()
}

/// Writer side of the response slot, owned by the worker thread.
#[derive(Debug)]
pub struct SlotWriter {
    tx: watch::Sender<Option<Response>>,
}

impl SlotWriter {
    /// Overwrites the slot with `response` and wakes the waiting reader.
    pub fn publish(&self, response: Response) {
        self.tx.send_replace(Some(response));
    }
}

/// Reader side of the response slot, held by the façade.
#[derive(Debug)]
pub struct SlotReader {
    rx: watch::Receiver<Option<Response>>,
}

impl SlotReader {
    /// Marks whatever the slot currently holds as already seen, so the next
    /// [`SlotReader::next`] only reports responses published afterwards.
    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }

    /// Waits for the next published response.
    ///
    /// Returns `None` when the worker is gone and nothing unseen is left.
    /// Intermediate values may be skipped if several responses are published
    /// before the reader wakes up; only the latest one is returned.
    ///
    /// 等待下一条发布的响应。
    /// 当工作线程已退出且没有未读值时返回 `None`。
    /// 如果在读取方唤醒前发布了多条响应，中间值可能被跳过，只返回最新的一条。
    pub async fn next(&mut self) -> Option<Response> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(response) = self.rx.borrow_and_update().clone() {
                return Some(response);
            }
        }
    }
}

/// What a waiting caller does with a response it read from the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The response to the awaited command.
    Accept,
    /// The late answer to a command whose caller gave up.
    Late,
    /// A response nobody registered interest in.
    Stray,
}

/// Correlation bookkeeping of one façade: the commands whose callers gave up,
/// and how many responses were dropped so far.
///
/// 单个外观的关联记录：调用者已放弃的命令，以及迄今丢弃的响应数量。
#[derive(Debug, Default)]
pub struct ResponseFilter {
    abandoned: BTreeSet<CorrelationId>,
    discarded: u64,
}

impl ResponseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers that nobody waits for `id` any more.
    pub fn abandon(&mut self, id: CorrelationId) {
        self.abandoned.insert(id);
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Decides whether `received` answers the awaited command. Anything else
    /// is counted as discarded.
    pub fn admit(&mut self, awaited: CorrelationId, received: CorrelationId) -> Admission {
        let admission = if received == awaited {
            Admission::Accept
        } else {
            self.discarded += 1;
            if self.abandoned.contains(&received) {
                Admission::Late
            } else {
                Admission::Stray
            }
        };
        // Commands complete in order: nothing at or before `received` can answer again.
        self.abandoned = self
            .abandoned
            .split_off(&CorrelationId(received.0.saturating_add(1)));
        admission
    }
}
