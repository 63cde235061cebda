//! 事件总线：一个枚举承载所有事件，订阅者各持一个 mpsc 接收端

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

pub struct EventBus<E> {
    subscribers: Vec<Sender<E>>,
}

pub struct EventReceiver<E> {
    rx: Receiver<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> EventReceiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        EventReceiver { rx }
    }

    /// 广播事件；接收端已被丢弃的订阅者顺带移除
    pub fn emit(&mut self, event: E) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventReceiver<E> {
    pub fn try_recv(&mut self) -> Result<E, TryRecvError> {
        self.rx.try_recv()
    }

    /// 取走当前积压的全部事件
    pub fn drain(&mut self) -> Vec<E> {
        self.rx.try_iter().collect()
    }
}
