// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数线命令通道 (控制面 → 工作线程)

use crate::counting::{Command, LineConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// 无界 FIFO 命令队列
#[derive(Clone)]
pub struct CommandChannel {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// 入队 (不阻塞)
    pub fn send(&self, command: Command) {
        let _ = self.tx.send(command);
    }

    /// 按入队顺序取出并应用全部命令, 返回应用的条数
    pub fn drain_into(&self, line: &mut LineConfig) -> usize {
        let mut applied = 0;
        for command in self.rx.try_iter() {
            command.apply(line);
            applied += 1;
        }
        applied
    }

    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_applies_in_send_order() {
        let channel = CommandChannel::new();
        channel.send(Command::SetPosition(10));
        channel.send(Command::SetAngle(20));
        channel.send(Command::SetPosition(30));

        let mut line = LineConfig::default();
        assert_eq!(channel.drain_into(&mut line), 3);
        assert_eq!(line.position(), 30);
        assert_eq!(line.angle(), 20);
        assert!(channel.is_empty());
    }

    #[test]
    fn drain_on_empty_channel_is_noop() {
        let channel = CommandChannel::new();
        let mut line = LineConfig::new(70, 90);
        assert_eq!(channel.drain_into(&mut line), 0);
        assert_eq!(line, LineConfig::new(70, 90));
    }
}
