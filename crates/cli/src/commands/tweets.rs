//! `decentra tweets`: Summarize recent posts by a set of accounts.

use clap::Args;
use decentra_engine::Orchestrator;
use decentra_server::TwitterSummaryBody;

use super::{GlobalOptions, forward, print_report};

#[derive(Args, Debug)]
pub struct TweetsArgs {
    /// Account handle, with or without a leading @ (repeatable)
    #[arg(short = 'a', long = "account", required = true)]
    pub accounts: Vec<String>,

    /// Hours to look back
    #[arg(short = 'w', long, default_value_t = 24)]
    pub lookback_window: u32,

    /// Cap on posts across all accounts
    #[arg(long, default_value_t = 1000)]
    pub max_results: u32,

    /// Backend identifier (e.g. openai, anthropic, ollama)
    #[arg(long)]
    pub llm_connection: Option<String>,

    /// Window start as RFC 3339; overrides --lookback-window
    #[arg(long)]
    pub since: Option<String>,

    /// Reuse a memoized model response for an identical prompt
    #[arg(long)]
    pub cache: bool,
}

impl TweetsArgs {
    pub fn to_body(&self) -> TwitterSummaryBody {
        TwitterSummaryBody {
            accounts: self.accounts.clone(),
            lookback_window: self.lookback_window,
            max_results: self.max_results,
            llm_connection: self.llm_connection.clone(),
            since: self.since.clone(),
            cache: Some(self.cache),
        }
    }
}

pub async fn run(args: TweetsArgs, globals: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = globals.load_config()?;
    let body = args.to_body();

    let report = match globals.remote_url(&config) {
        Some(url) => forward(&url, "/v1/summary/twitter", &body).await?,
        None => {
            let orchestrator = Orchestrator::from_config(&config);
            orchestrator
                .summarize_social(body.into_request(config.server.cache_responses)?)
                .await?
        }
    };

    print_report(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: TweetsArgs,
    }

    #[test]
    fn accounts_are_repeatable() {
        let body = Harness::parse_from(["tweets", "-a", "rustlang", "--account", "@tokio_rs"])
            .args
            .to_body();
        assert_eq!(body.accounts, ["rustlang", "@tokio_rs"]);
        assert_eq!(body.max_results, 1000);
        assert_eq!(body.lookback_window, 24);
    }

    #[test]
    fn account_is_required() {
        assert!(Harness::try_parse_from(["tweets"]).is_err());
    }

    #[test]
    fn caps_and_window() {
        let body = Harness::parse_from(["tweets", "-a", "x", "-w", "48", "--max-results", "50"])
            .args
            .to_body();
        assert_eq!(body.lookback_window, 48);
        assert_eq!(body.max_results, 50);
    }
}
