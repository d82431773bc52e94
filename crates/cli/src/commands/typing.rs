// `sherpa-live typing`: send one typing signal and leave.

use std::time::Duration;

use anyhow::bail;
use clap::Args;
use serde::{Deserialize, Serialize};
use sherpa_live::LiveSession;
use tokio::time::timeout;
use tracing::{info, warn};

use super::ConnectionArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct TypingArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Channel to signal.
    #[arg(long)]
    pub channel: u64,

    /// Display name shown to the other members.
    #[arg(long)]
    pub user_name: String,

    /// Send "stopped typing" instead.
    #[arg(long)]
    pub stop: bool,

    /// Seconds to wait for the connection to open.
    #[arg(long, default_value_t = 10)]
    pub wait_secs: u64,

    /// Force JSON output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingResult {
    pub channel_id: u64,
    pub typing: bool,
    pub sent: bool,
}

pub async fn run(args: TypingArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let handle = LiveSession::spawn(args.connection.config());
    handle.connect(Some(&args.connection.token)).await?;

    let opened = timeout(Duration::from_secs(args.wait_secs), handle.wait_connected()).await;
    if !matches!(opened, Ok(true)) {
        let reason = handle.health().last_error.unwrap_or_else(|| "no response".to_string());
        warn!(wait_secs = args.wait_secs, %reason, "live channel did not open");
        handle.shutdown().await;
        output::print_error(format, "NOT_CONNECTED", &reason);
        bail!("live channel did not open within {}s: {reason}", args.wait_secs);
    }

    let typing = !args.stop;
    let sent = handle.send_typing(args.channel, &args.user_name, typing).await;
    info!(channel_id = args.channel, typing, sent, "typing signal");
    handle.shutdown().await;

    let result = TypingResult { channel_id: args.channel, typing, sent };
    output::print_output(format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &TypingResult) -> String {
    let what = if result.typing { "typing" } else { "stopped typing" };
    if result.sent {
        format!("sent \"{what}\" to channel {}", result.channel_id)
    } else {
        format!("could not send \"{what}\" to channel {}: connection closed", result.channel_id)
    }
}
