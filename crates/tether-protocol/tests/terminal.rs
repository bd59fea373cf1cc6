//! Terminal output, typed lines and line intercepts through the proxy.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Harness, MapFrame};
use tether_api::{
    CancelHandle, EventHandler, Level, Module, Subscription, SubscriptionSender, TerminalModule,
    names,
};
use tether_core::{CallContext, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct PendingIntercept {
    handler: EventHandler<String>,
    cancel: CancelHandle,
}

#[derive(Default)]
struct FakeTerminal {
    printed: Mutex<Vec<(Level, String, String)>>,
    raw: Mutex<Vec<String>>,
    lines: Mutex<Vec<SubscriptionSender<String>>>,
    waits: Mutex<Vec<Option<Duration>>>,
    intercept: Mutex<Option<PendingIntercept>>,
}

impl FakeTerminal {
    /// A line typed on the host console.
    fn type_line(&self, line: &str) {
        if let Some(pending) = self.intercept.lock().unwrap().take() {
            if !pending.cancel.is_cancelled() {
                (pending.handler)(line.to_string());
                return;
            }
        }
        for sender in self.lines.lock().unwrap().iter() {
            sender.send(line.to_string());
        }
    }

    fn intercept_cancel(&self) -> Option<CancelHandle> {
        self.intercept
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.cancel.clone())
    }
}

#[async_trait]
impl TerminalModule for FakeTerminal {
    fn name(&self) -> &str {
        names::TERMINAL
    }

    async fn print(&self, level: Level, scope: &str, msg: &str) {
        self.printed
            .lock()
            .unwrap()
            .push((level, scope.to_string(), msg.to_string()));
    }

    async fn raw(&self, msg: &str) {
        self.raw.lock().unwrap().push(msg.to_string());
    }

    async fn color_trans_ansi(&self, msg: &str) -> String {
        msg.replace("§c", "\x1b[31m")
    }

    async fn subscribe_lines(&self, _ctx: &CallContext) -> Result<Subscription<String>> {
        let (sender, subscription) = Subscription::channel(8);
        self.lines.lock().unwrap().push(sender);
        Ok(subscription)
    }

    async fn intercept_next_line(
        &self,
        _ctx: &CallContext,
        wait: Option<Duration>,
        handler: EventHandler<String>,
    ) -> Result<CancelHandle> {
        self.waits.lock().unwrap().push(wait);
        let cancel = CancelHandle::new();
        *self.intercept.lock().unwrap() = Some(PendingIntercept {
            handler,
            cancel: cancel.clone(),
        });
        Ok(cancel)
    }
}

async fn start() -> anyhow::Result<(Arc<FakeTerminal>, Harness, Arc<dyn TerminalModule>)> {
    let fake = Arc::new(FakeTerminal::default());
    let frame = MapFrame::new(vec![Module::from(fake.clone() as Arc<dyn TerminalModule>)]);
    let harness = Harness::start(Arc::new(frame)).await?;
    let terminal = harness
        .module::<Arc<dyn TerminalModule>>(names::TERMINAL)
        .await?;
    Ok((fake, harness, terminal))
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_terminal_output_reaches_the_host() -> anyhow::Result<()> {
    let (fake, harness, terminal) = start().await?;
    assert_eq!(terminal.name(), names::TERMINAL);

    terminal.warn("tester", "low on disk").await;
    terminal.success("tester", "done").await;
    terminal.raw("plain text").await;
    assert_eq!(
        terminal.color_trans_ansi("§cred").await,
        "\x1b[31mred".to_string()
    );

    assert_eq!(
        *fake.printed.lock().unwrap(),
        vec![
            (Level::Warn, "tester".to_string(), "low on disk".to_string()),
            (Level::Success, "tester".to_string(), "done".to_string()),
        ]
    );
    assert_eq!(*fake.raw.lock().unwrap(), vec!["plain text".to_string()]);

    harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_typed_lines_stream_until_cancelled() -> anyhow::Result<()> {
    let (fake, harness, terminal) = start().await?;
    let ctx = CallContext::with_timeout(WAIT);

    let mut lines = terminal.subscribe_lines(&ctx).await?;
    fake.type_line("list");
    fake.type_line("stop");
    assert_eq!(timeout(WAIT, lines.recv()).await?.as_deref(), Some("list"));
    assert_eq!(timeout(WAIT, lines.recv()).await?.as_deref(), Some("stop"));

    lines.cancel();
    let host_side_closed = eventually(|| {
        fake.lines
            .lock()
            .unwrap()
            .iter()
            .all(SubscriptionSender::is_closed)
    })
    .await;
    assert!(host_side_closed);

    harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_intercept_takes_one_line_and_waits_indefinitely() -> anyhow::Result<()> {
    let (fake, harness, terminal) = start().await?;
    let ctx = CallContext::with_timeout(WAIT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = terminal
        .intercept_next_line(
            &ctx,
            None,
            Arc::new(move |line: String| {
                let _ = tx.send(line);
            }),
        )
        .await?;
    assert_eq!(*fake.waits.lock().unwrap(), vec![None]);

    fake.type_line("yes");
    assert_eq!(timeout(WAIT, rx.recv()).await?.as_deref(), Some("yes"));

    fake.type_line("again");
    assert!(
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
            .is_none()
    );

    harness.session.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_cancelled_intercept_reaches_the_host() -> anyhow::Result<()> {
    let (fake, harness, terminal) = start().await?;
    let ctx = CallContext::with_timeout(WAIT);

    let handle = terminal
        .intercept_next_line(&ctx, Some(Duration::from_secs(30)), Arc::new(|_line: String| {}))
        .await?;
    assert_eq!(
        *fake.waits.lock().unwrap(),
        vec![Some(Duration::from_secs(30))]
    );

    let host_cancel = fake.intercept_cancel().expect("intercept registered");
    handle.cancel();
    assert!(eventually(|| host_cancel.is_cancelled()).await);

    harness.session.shutdown().await;
    Ok(())
}
