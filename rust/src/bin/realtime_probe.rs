use std::time::Duration;

use sierra_core::{ChannelEvent, RealtimeChannel, ReconnectPolicy};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let usage = "usage: realtime_probe <socket_url> <user_id> [--secs N]";
    let url = args.next().ok_or_else(|| anyhow::anyhow!(usage))?;
    let user_id = args.next().ok_or_else(|| anyhow::anyhow!(usage))?;

    let mut secs: u64 = 30;
    while let Some(a) = args.next() {
        if a == "--secs" {
            let n = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--secs requires a number"))?;
            secs = n.parse()?;
            continue;
        }
        return Err(anyhow::anyhow!("unknown arg: {a}"));
    }

    let rt = tokio::runtime::Runtime::new()?;
    let channel = RealtimeChannel::new(ReconnectPolicy::default());
    let _feed = channel.subscribe(|event| match event {
        ChannelEvent::NewMessage(m) | ChannelEvent::MessageSent(m) => tracing::info!(
            event = event.name(),
            id = %m.id,
            from = m.sender(),
            to = m.receiver(),
            "message"
        ),
        other => tracing::info!(event = other.name(), ?other, "event"),
    });

    if !channel.connect(rt.handle(), &url, &user_id) {
        anyhow::bail!("channel already active");
    }
    tracing::info!(%url, %user_id, secs, "listening");

    rt.block_on(tokio::time::sleep(Duration::from_secs(secs)));
    channel.disconnect();
    // Give the worker a moment to send leave-room before the runtime drops.
    rt.block_on(tokio::time::sleep(Duration::from_millis(300)));
    Ok(())
}
