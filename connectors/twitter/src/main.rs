//! chirp - Twitter streaming and REST command-line client
//!
//! - `chirp sample` - random sample of public statuses
//! - `chirp filter` - public statuses matching tracks, follows or locations
//! - `chirp user` - messages for the authenticated user
//! - `chirp search` - search recent statuses
//! - `chirp tweet` - post a status, optionally with media
//!
//! Stream events are printed to stdout as JSON lines; logs go to stderr.

#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context as _, Result, bail};
use chirp_twitter::{
    BaseFilterParameters, BoundingBox, Coordinate, Delimited, FilterLevel, FilterParameters,
    FilterStreamRequest, RestClient, SampleStreamRequest, StreamEvent, StreamingClient,
    StreamingParameters, StreamingRequest, TwitterConfig, TwitterError, UserParameters,
    UserStreamRequest, With,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Twitter streaming and REST client.
#[derive(Parser)]
#[command(name = "chirp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "CHIRP_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    credentials: CredentialArgs,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long, global = true, env = "TWITTER_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: Option<String>,

    #[arg(long, global = true, env = "TWITTER_CONSUMER_SECRET", hide_env_values = true)]
    consumer_secret: Option<String>,

    #[arg(long, global = true, env = "TWITTER_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, global = true, env = "TWITTER_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    access_token_secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a random sample of public statuses.
    Sample(StreamArgs),

    /// Stream public statuses matching tracks, follows or locations.
    Filter {
        #[command(flatten)]
        stream: StreamArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// User ids to follow, comma separated.
        #[arg(long, value_delimiter = ',')]
        follow: Vec<String>,
    },

    /// Stream messages for the authenticated user.
    User {
        #[command(flatten)]
        stream: StreamArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// Include all replies.
        #[arg(long)]
        replies: bool,

        /// Whose messages to include.
        #[arg(long, value_enum)]
        with: Option<WithArg>,
    },

    /// Search recent statuses.
    Search {
        /// Search query.
        query: String,
    },

    /// Post a status.
    Tweet {
        /// Status text.
        text: String,

        /// Media file to attach.
        #[arg(long)]
        media: Option<PathBuf>,
    },
}

#[derive(Args)]
struct StreamArgs {
    /// Language codes, comma separated.
    #[arg(long, value_delimiter = ',')]
    language: Vec<String>,

    /// Minimum filter level.
    #[arg(long, value_enum)]
    filter_level: Option<LevelArg>,

    /// Ask the server for stall warnings.
    #[arg(long)]
    stall_warnings: bool,

    /// Request length-delimited messages.
    #[arg(long)]
    length_delimited: bool,

    /// Seconds of silence before reconnecting.
    #[arg(long)]
    stall_timeout: Option<u64>,

    /// Stop after this many events.
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct FilterArgs {
    /// Phrases to track, comma separated.
    #[arg(long, value_delimiter = ',')]
    track: Vec<String>,

    /// Bounding box `sw_lon,sw_lat,ne_lon,ne_lat`; repeat for more.
    #[arg(long, value_parser = parse_bounding_box)]
    locations: Vec<BoundingBox>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    None,
    Low,
    Medium,
}

impl From<LevelArg> for FilterLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::None => Self::None,
            LevelArg::Low => Self::Low,
            LevelArg::Medium => Self::Medium,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WithArg {
    Users,
    Followings,
}

impl From<WithArg> for With {
    fn from(with: WithArg) -> Self {
        match with {
            WithArg::Users => Self::Users,
            WithArg::Followings => Self::Followings,
        }
    }
}

fn parse_bounding_box(raw: &str) -> Result<BoundingBox, String> {
    let corners = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("{part:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    match corners.as_slice() {
        [sw_lon, sw_lat, ne_lon, ne_lat] => Ok(BoundingBox::new(
            Coordinate::new(*sw_lon, *sw_lat),
            Coordinate::new(*ne_lon, *ne_lat),
        )),
        _ => Err(format!("expected 4 numbers, got {}", corners.len())),
    }
}

impl StreamArgs {
    fn parameters(&self) -> StreamingParameters {
        let mut parameters =
            StreamingParameters::new().with_languages(self.language.iter().cloned());

        if self.stall_warnings {
            parameters = parameters.with_stall_warnings(true);
        }
        if let Some(level) = self.filter_level {
            parameters = parameters.with_filter_level(level.into());
        }
        if self.length_delimited {
            parameters = parameters.with_delimited(Delimited::Length);
        }
        parameters
    }
}

impl FilterArgs {
    fn parameters(&self, stream: StreamingParameters) -> BaseFilterParameters {
        BaseFilterParameters::from_streaming(stream)
            .with_tracks(self.track.iter().cloned())
            .with_locations(self.locations.iter().copied())
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<TwitterConfig> {
    let mut config = match &cli.config {
        Some(path) => TwitterConfig::load(path)?,
        None => TwitterConfig::default(),
    };

    // clap already resolved the environment, flags win over the file
    let credentials = &cli.credentials;
    for (value, field) in [
        (&credentials.consumer_key, &mut config.consumer_key),
        (&credentials.consumer_secret, &mut config.consumer_secret),
        (&credentials.access_token, &mut config.access_token),
        (&credentials.access_token_secret, &mut config.access_token_secret),
    ] {
        if let Some(value) = value {
            field.clone_from(value);
        }
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = load_config(&cli)?;
    if !config.has_credentials() {
        warn!("OAuth credentials incomplete, requests will likely be rejected");
    }

    match cli.command {
        Commands::Sample(stream) => {
            let request = SampleStreamRequest::from_config(&config, stream.parameters());
            run_stream(&mut config, &stream, request).await
        }
        Commands::Filter {
            stream,
            filter,
            follow,
        } => {
            let parameters = FilterParameters::from_filter(filter.parameters(stream.parameters()))
                .with_follows(follow);
            if !parameters.has_predicate() {
                bail!("filter needs at least one of --track, --follow or --locations");
            }
            let request = FilterStreamRequest::from_config(&config, parameters);
            run_stream(&mut config, &stream, request).await
        }
        Commands::User {
            stream,
            filter,
            replies,
            with,
        } => {
            let mut parameters = UserParameters::from_filter(filter.parameters(stream.parameters()))
                .with_replies(replies);
            if let Some(with) = with {
                parameters = parameters.with_scope(with.into());
            }
            let request = UserStreamRequest::from_config(&config, parameters);
            run_stream(&mut config, &stream, request).await
        }
        Commands::Search { query } => {
            let response = RestClient::new(&config)?
                .search(&query)
                .await
                .map_err(explain)?;
            for status in &response.statuses {
                print_json(status)?;
            }
            Ok(())
        }
        Commands::Tweet { text, media } => {
            let client = RestClient::new(&config)?;
            let status = match media {
                Some(path) => client.update_status_with_media(&text, &path).await,
                None => client.update_status(&text).await,
            }
            .map_err(explain)?;
            print_json(&status)
        }
    }
}

async fn run_stream(
    config: &mut TwitterConfig,
    args: &StreamArgs,
    request: impl StreamingRequest + 'static,
) -> Result<()> {
    if let Some(secs) = args.stall_timeout {
        config.stream.stall_timeout_secs = secs;
        config.validate()?;
    }

    let client = StreamingClient::from_config(config)?;
    let limit = args.limit.unwrap_or(u64::MAX);
    let seen = Arc::new(AtomicU64::new(0));
    let done = Arc::new(Notify::new());

    let sink = {
        let seen = Arc::clone(&seen);
        let done = Arc::clone(&done);
        move |event: StreamEvent| {
            let n = seen.fetch_add(1, Ordering::Relaxed) + 1;
            if n > limit {
                return;
            }
            if let Err(e) = print_json(&event) {
                warn!(error = %e, "Failed to write event");
            }
            if n == limit {
                done.notify_one();
            }
        }
    };

    let handle = client.start(request, sink);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("Interrupted");
        }
        () = done.notified() => info!(events = limit, "Event limit reached"),
    }

    handle.stop();
    handle.closed().await;
    Ok(())
}

/// Bad or expired credentials (32, 89) get a pointer to where they come from.
fn explain(error: TwitterError) -> anyhow::Error {
    match error.error_code() {
        Some(32 | 89) => anyhow::Error::new(error)
            .context("credentials rejected, check TWITTER_* variables or --config"),
        _ => error.into(),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}
