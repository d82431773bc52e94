// CLI subcommand dispatch.

use anyhow::Context;
use clap::{Args, Subcommand};
use sherpa_live::LiveConfig;

pub mod listen;
pub mod typing;

#[derive(Subcommand)]
pub enum Command {
    /// Print live events for channels and calendars until interrupted
    Listen(listen::ListenArgs),
    /// Send a single typing signal to a channel
    Typing(typing::TypingArgs),
}

/// Options shared by every command that opens the live channel.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Session token for the live channel.
    #[arg(long, env = "SHERPA_TOKEN", hide_env_values = true)]
    pub token: String,

    /// REST base URL. Overrides the config file and SHERPA_API_URL.
    #[arg(long)]
    pub api_url: Option<String>,
}

impl ConnectionArgs {
    pub fn config(&self) -> LiveConfig {
        let mut config = LiveConfig::load();
        self.apply(&mut config);
        config
    }

    fn apply(&self, config: &mut LiveConfig) {
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
    }
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    match cmd {
        Command::Listen(args) => runtime.block_on(listen::run(args)),
        Command::Typing(args) => runtime.block_on(typing::run(args)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_flag_overrides_config() {
        let args = ConnectionArgs {
            token: "tok1".into(),
            api_url: Some("https://api.sherpa.example".into()),
        };
        let mut config = LiveConfig::default();
        args.apply(&mut config);
        assert_eq!(config.api_url, "https://api.sherpa.example");
    }

    #[test]
    fn missing_flag_keeps_config_value() {
        let args = ConnectionArgs { token: "tok1".into(), api_url: None };
        let mut config = LiveConfig { api_url: "http://10.0.0.2:3001".into(), ..LiveConfig::default() };
        args.apply(&mut config);
        assert_eq!(config.api_url, "http://10.0.0.2:3001");
    }
}
