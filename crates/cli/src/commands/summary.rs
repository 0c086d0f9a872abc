//! `decentra summary`: Summarize recent mail.

use clap::Args;
use decentra_engine::Orchestrator;
use decentra_server::EmailSummaryBody;

use super::{GlobalOptions, forward, print_report};

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Hours to look back
    #[arg(short = 'w', long, default_value_t = 24)]
    pub lookback_window: u32,

    /// Include messages that were already read
    #[arg(long, overrides_with = "unread_only")]
    pub include_read: bool,

    /// Only unread messages (default)
    #[arg(long, overrides_with = "include_read")]
    pub unread_only: bool,

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

impl SummaryArgs {
    pub fn to_body(&self) -> EmailSummaryBody {
        EmailSummaryBody {
            lookback_window: self.lookback_window,
            unread_only: !self.include_read,
            llm_connection: self.llm_connection.clone(),
            since: self.since.clone(),
            cache: Some(self.cache),
        }
    }
}

pub async fn run(args: SummaryArgs, globals: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = globals.load_config()?;
    let body = args.to_body();

    let report = match globals.remote_url(&config) {
        Some(url) => forward(&url, "/v1/summary/email", &body).await?,
        None => {
            let orchestrator = Orchestrator::from_config(&config);
            orchestrator
                .summarize_email(body.into_request(config.server.cache_responses)?)
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
        args: SummaryArgs,
    }

    fn parse(argv: &[&str]) -> EmailSummaryBody {
        let mut full = vec!["summary"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).args.to_body()
    }

    #[test]
    fn defaults() {
        let body = parse(&[]);
        assert_eq!(body.lookback_window, 24);
        assert!(body.unread_only);
        assert_eq!(body.llm_connection, None);
        assert_eq!(body.cache, Some(false));
    }

    #[test]
    fn include_read_and_last_flag_wins() {
        assert!(!parse(&["--include-read"]).unread_only);
        assert!(parse(&["--include-read", "--unread-only"]).unread_only);
        assert!(!parse(&["--unread-only", "--include-read"]).unread_only);
    }

    #[test]
    fn window_and_connection() {
        let body = parse(&["-w", "6", "--llm-connection", "ollama"]);
        assert_eq!(body.lookback_window, 6);
        assert_eq!(body.llm_connection.as_deref(), Some("ollama"));
    }
}
