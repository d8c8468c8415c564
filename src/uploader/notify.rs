// 上传完成通知

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 文件上传完成事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUploaded {
    /// 磁盘名称
    pub disk: String,
    /// 磁盘内路径
    pub path: String,
    /// 文件大小
    pub size: u64,
}

/// 完成通知接收者
///
/// 每个新完成的上传只会通知一次（分片合并与整文件保存均适用）
pub trait CompletionNotifier: Send + Sync {
    fn notify(&self, event: &FileUploaded);
}

/// 广播通知，供外部订阅者消费
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<FileUploaded>,
}

impl BroadcastNotifier {
    pub fn new(sender: broadcast::Sender<FileUploaded>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileUploaded> {
        self.sender.subscribe()
    }
}

impl CompletionNotifier for BroadcastNotifier {
    fn notify(&self, event: &FileUploaded) {
        // 没有订阅者时发送失败，忽略即可
        if self.sender.send(event.clone()).is_err() {
            debug!("无订阅者，丢弃完成事件: {}", event.path);
        }
    }
}

/// 日志通知
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl CompletionNotifier for LoggingNotifier {
    fn notify(&self, event: &FileUploaded) {
        info!(
            "文件上传完成: disk={}, path={}, size={} bytes",
            event.disk, event.path, event.size
        );
    }
}

/// 闭包通知
pub struct FnNotifier<F>(F);

impl<F> FnNotifier<F>
where
    F: Fn(&FileUploaded) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> CompletionNotifier for FnNotifier<F>
where
    F: Fn(&FileUploaded) + Send + Sync,
{
    fn notify(&self, event: &FileUploaded) {
        (self.0)(event)
    }
}

/// 依次通知多个接收者
#[derive(Default, Clone)]
pub struct NotifierChain {
    notifiers: Vec<Arc<dyn CompletionNotifier>>,
}

impl NotifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl CompletionNotifier for NotifierChain {
    fn notify(&self, event: &FileUploaded) {
        for notifier in &self.notifiers {
            notifier.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> FileUploaded {
        FileUploaded {
            disk: "local".to_string(),
            path: "merged/a.txt".to_string(),
            size: 3,
        }
    }

    #[test]
    fn test_chain_fans_out() {
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();

        let chain = NotifierChain::new()
            .with(Arc::new(FnNotifier::new(move |_: &FileUploaded| {
                c1.fetch_add(1, Ordering::SeqCst);
            })))
            .with(Arc::new(LoggingNotifier))
            .with(Arc::new(FnNotifier::new(move |e: &FileUploaded| {
                assert_eq!(e.size, 3);
                c2.fetch_add(1, Ordering::SeqCst);
            })));

        assert_eq!(chain.len(), 3);
        chain.notify(&event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let (sender, _) = broadcast::channel(8);
        let notifier = BroadcastNotifier::new(sender);

        // 无订阅者时不会 panic
        notifier.notify(&event());

        let mut rx = notifier.subscribe();
        notifier.notify(&event());
        assert_eq!(rx.recv().await.unwrap(), event());
    }
}
