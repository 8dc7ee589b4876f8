//! 阻塞调用到异步流的桥接
//!
//! 模型调用在调用线程上阻塞地产生文本段。[`bridge`] 为每次调用启动一个专用
//! 工作线程，由它推进阻塞迭代器，并通过容量为 1 的通道把每一项交给异步消费者：
//!
//! - 输出顺序与迭代器产生顺序一致，每次 yield 一项
//! - 推进时返回的错误或 panic 转换为一个 `Error` 项，随后流结束
//! - 迭代器正常耗尽时流直接结束，不额外产生任何项
//! - 消费者丢弃流之后，工作线程在当前阻塞调用返回后退出，其输出被丢弃
//!
//! 工作线程创建迭代器本身，因此迭代器不需要 `Send`。

use crate::providers::{self, Model, ModelError, Prompt, PromptEvent};
use futures::Stream;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// 桥接输出项
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeItem<T> {
    /// 迭代器产生的一项
    Item(T),
    /// 推进迭代器时的错误，之后不再有任何项
    Error(String),
}

/// 桥接错误
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Could not start model worker: {0}")]
    Spawn(#[from] std::io::Error),
}

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// 桥接输出流
pub struct BridgeStream<T> {
    rx: mpsc::Receiver<BridgeItem<T>>,
}

impl<T> Stream for BridgeStream<T> {
    type Item = BridgeItem<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// 在专用工作线程上运行阻塞迭代器，返回异步流
///
/// `produce` 负责发起调用并返回迭代器，本身也在工作线程上执行。
pub fn bridge<F, I, T, E>(produce: F) -> Result<BridgeStream<T>, BridgeError>
where
    F: FnOnce() -> Result<I, E> + Send + 'static,
    I: Iterator<Item = Result<T, E>>,
    T: Send + 'static,
    E: Display,
{
    let (tx, rx) = mpsc::channel(1);
    let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);

    std::thread::Builder::new()
        .name(format!("llm-bridge-{}", seq))
        .spawn(move || run_worker(seq, produce, tx))?;

    Ok(BridgeStream { rx })
}

fn run_worker<F, I, T, E>(seq: u64, produce: F, tx: mpsc::Sender<BridgeItem<T>>)
where
    F: FnOnce() -> Result<I, E>,
    I: Iterator<Item = Result<T, E>>,
    E: Display,
{
    let mut iter = match catch_unwind(AssertUnwindSafe(produce)) {
        Ok(Ok(iter)) => iter,
        Ok(Err(e)) => {
            let _ = tx.blocking_send(BridgeItem::Error(e.to_string()));
            return;
        }
        Err(panic) => {
            let _ = tx.blocking_send(BridgeItem::Error(panic_message(panic)));
            return;
        }
    };

    let mut forwarded = 0u64;
    loop {
        let item = match catch_unwind(AssertUnwindSafe(|| iter.next())) {
            Ok(Some(Ok(item))) => BridgeItem::Item(item),
            Ok(Some(Err(e))) => {
                tracing::warn!("[BRIDGE] worker {} 调用失败: {}", seq, e);
                let _ = tx.blocking_send(BridgeItem::Error(e.to_string()));
                return;
            }
            Ok(None) => {
                tracing::debug!("[BRIDGE] worker {} finished after {} items", seq, forwarded);
                return;
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!("[BRIDGE] worker {} panicked: {}", seq, message);
                let _ = tx.blocking_send(BridgeItem::Error(message));
                return;
            }
        };

        if tx.blocking_send(item).is_err() {
            tracing::debug!("[BRIDGE] worker {} 消费者已断开，丢弃剩余输出", seq);
            return;
        }
        forwarded += 1;
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "model call panicked".to_string()
    }
}

/// 通过桥接运行一次模型调用
pub fn stream_prompt(
    model: Arc<dyn Model>,
    prompt: Prompt,
) -> Result<BridgeStream<PromptEvent>, BridgeError> {
    bridge(move || -> Result<_, ModelError> { providers::prompt(model, prompt) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use proptest::prelude::*;
    use std::time::Duration;

    fn items<T: Clone>(v: &[T]) -> Vec<Result<T, String>> {
        v.iter().cloned().map(Ok).collect()
    }

    #[tokio::test]
    async fn test_items_forwarded_in_order() {
        let source = items(&["a", "b", "c", "terminal(R)"]);
        let out: Vec<_> = bridge(move || Ok::<_, String>(source.into_iter()))
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            out,
            vec![
                BridgeItem::Item("a"),
                BridgeItem::Item("b"),
                BridgeItem::Item("c"),
                BridgeItem::Item("terminal(R)"),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_is_yielded_once_then_stream_ends() {
        let source: Vec<Result<&str, String>> = vec![
            Ok("a"),
            Err("upstream failed".to_string()),
            Ok("never"),
        ];
        let out: Vec<_> = bridge(move || Ok::<_, String>(source.into_iter()))
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            out,
            vec![
                BridgeItem::Item("a"),
                BridgeItem::Error("upstream failed".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_to_start_is_an_error_item() {
        let out: Vec<BridgeItem<String>> =
            bridge(|| Err::<std::vec::IntoIter<Result<String, String>>, _>("no key".to_string()))
                .unwrap()
                .collect()
                .await;
        assert_eq!(out, vec![BridgeItem::Error("no key".to_string())]);
    }

    #[tokio::test]
    async fn test_panic_is_an_error_item() {
        let mut n = 0;
        let iter = std::iter::from_fn(move || {
            n += 1;
            if n == 2 {
                panic!("exploded");
            }
            Some(Ok::<_, String>(n))
        });
        let out: Vec<_> = bridge(move || Ok::<_, String>(iter)).unwrap().collect().await;
        assert_eq!(
            out,
            vec![BridgeItem::Item(1), BridgeItem::Error("exploded".to_string())]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_event_loop_not_blocked() {
        let iter = (0..3).map(|i| {
            std::thread::sleep(Duration::from_millis(50));
            Ok::<_, String>(i)
        });
        let ticker = tokio::spawn(async {
            let mut ticks = 0;
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                ticks += 1;
            }
            ticks
        });

        let out: Vec<_> = bridge(move || Ok::<_, String>(iter)).unwrap().collect().await;
        assert_eq!(out.len(), 3);
        // 事件循环在等待工作线程期间仍在推进其他任务
        assert!(ticker.is_finished());
        assert_eq!(ticker.await.unwrap(), 10);
    }

    struct DropFlag(std::sync::mpsc::Sender<()>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            let _ = self.0.send(());
        }
    }

    #[tokio::test]
    async fn test_worker_exits_after_consumer_drops() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let flag = DropFlag(done_tx);
        let iter = std::iter::repeat_with(move || {
            let _keep = &flag;
            Ok::<_, String>(1u8)
        });

        let mut stream = bridge(move || Ok::<_, String>(iter)).unwrap();
        assert_eq!(stream.next().await, Some(BridgeItem::Item(1)));
        drop(stream);

        let exited = tokio::task::spawn_blocking(move || {
            done_rx.recv_timeout(Duration::from_secs(5)).is_ok()
        })
        .await
        .unwrap();
        assert!(exited);
    }

    #[tokio::test]
    async fn test_stream_prompt_with_echo() {
        let model: Arc<dyn Model> = Arc::new(crate::providers::EchoModel);
        let out: Vec<_> = stream_prompt(model, Prompt::new("one two"))
            .unwrap()
            .collect()
            .await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], BridgeItem::Item(PromptEvent::Chunk("one ".into())));
        assert_eq!(out[1], BridgeItem::Item(PromptEvent::Chunk("two".into())));
        assert!(matches!(out[2], BridgeItem::Item(PromptEvent::Done(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_output_matches_input(chunks in proptest::collection::vec(".{0,8}", 0..20)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let source = items(&chunks);
            let out: Vec<_> = rt.block_on(async move {
                bridge(move || Ok::<_, String>(source.into_iter()))
                    .unwrap()
                    .collect()
                    .await
            });
            let expected: Vec<_> = chunks.into_iter().map(BridgeItem::Item).collect();
            prop_assert_eq!(out, expected);
        }
    }
}
