use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mediagen_contracts::{
    CredentialProvider, EnvCredentials, EventWriter, GenerationRequest, GenerationStatus,
    JobHandle, MediaKind, PollResult, ProviderId, SourceImage, StaticCredentials, Status,
};
use mediagen_engine::{CompletionPoller, Dispatcher, EngineConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mediagen", version, about = "Image and video generation with provider fallback")]
struct Cli {
    /// Append workflow events to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// JSON map of provider id to credential; defaults to environment variables.
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Image(ImageArgs),
    Video(VideoArgs),
    Poll(PollArgs),
    Providers,
}

#[derive(Debug, Args)]
struct CommonArgs {
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    provider: Option<ProviderId>,
    /// Provider pass-through option, `key=value`; values are parsed as JSON when possible.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

#[derive(Debug, Args)]
struct ImageArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<String>,
}

#[derive(Debug, Args)]
struct VideoArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Source image file for image-to-video.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    aspect_ratio: Option<String>,
    /// Print the pending job handle instead of polling to completion.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Debug, Args)]
struct PollArgs {
    #[arg(long)]
    job_id: String,
    #[arg(long)]
    provider: ProviderId,
    /// 1-based number of this poll for the job. Placeholder jobs also finish once old enough.
    #[arg(long, default_value_t = 1)]
    attempt: u32,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mediagen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    let credentials = load_credentials(cli.credentials.as_deref())?;
    let mut dispatcher = Dispatcher::new(&EngineConfig::from_env());
    if let Some(path) = cli.events.as_ref() {
        let session_id = uuid::Uuid::new_v4().to_string();
        dispatcher = dispatcher.with_events(EventWriter::new(path, session_id));
    }

    let status = match cli.command {
        Command::Image(args) => {
            let request = build_image_request(args)?;
            match dispatcher.dispatch(&request, credentials.as_ref()) {
                Ok(dispatch) => dispatch.status(),
                Err(err) => GenerationStatus::from_error(&err),
            }
        }
        Command::Video(args) => run_video(&dispatcher, credentials.as_ref(), args)?,
        Command::Poll(args) => {
            let handle = JobHandle::new(args.job_id, args.provider);
            let mut poller = dispatcher
                .poller(handle.clone(), credentials.as_ref())
                .resume_from(args.attempt.saturating_sub(1));
            GenerationStatus::from_poll_result(&handle, &poller.poll())
        }
        Command::Providers => {
            print_json(&provider_listing(&dispatcher, credentials.as_ref()))?;
            return Ok(0);
        }
    };

    print_json(&serde_json::to_value(&status)?)?;
    Ok(if status.status == Status::Failed { 1 } else { 0 })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_credentials(path: Option<&Path>) -> Result<Box<dyn CredentialProvider>> {
    match path {
        Some(path) => Ok(Box::new(StaticCredentials::from_json_file(path)?)),
        None => Ok(Box::new(EnvCredentials)),
    }
}

fn build_image_request(args: ImageArgs) -> Result<GenerationRequest> {
    let mut request = base_request(MediaKind::Image, args.common)?;
    for (key, value) in [
        ("size", args.size),
        ("style", args.style),
        ("aspect_ratio", args.aspect_ratio),
    ] {
        if let Some(value) = value {
            request = request.with_option(key, value);
        }
    }
    Ok(request)
}

fn build_video_request(args: VideoArgs) -> Result<GenerationRequest> {
    let mut request = base_request(MediaKind::Video, args.common)?;
    if let Some(path) = args.image.as_deref() {
        let image = SourceImage::load(path)
            .with_context(|| format!("failed to load source image {}", path.display()))?;
        request = request.with_source_image(image);
    }
    if let Some(ratio) = args.aspect_ratio {
        request = request.with_option("aspect_ratio", ratio);
    }
    Ok(request)
}

fn base_request(kind: MediaKind, common: CommonArgs) -> Result<GenerationRequest> {
    let mut request = GenerationRequest::new(kind, common.prompt);
    if let Some(provider) = common.provider {
        request = request.with_provider(provider);
    }
    for raw in &common.options {
        let (key, value) = parse_option(raw)?;
        request = request.with_option(&key, value);
    }
    Ok(request)
}

fn parse_option(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("option '{raw}' must look like key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("option '{raw}' has an empty key");
    }
    let value = serde_json::from_str::<Value>(value.trim())
        .unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

fn run_video(
    dispatcher: &Dispatcher,
    credentials: &dyn CredentialProvider,
    args: VideoArgs,
) -> Result<GenerationStatus> {
    let no_wait = args.no_wait;
    let request = build_video_request(args)?;
    let dispatch = match dispatcher.dispatch(&request, credentials) {
        Ok(dispatch) => dispatch,
        Err(err) => return Ok(GenerationStatus::from_error(&err)),
    };
    let Some(handle) = dispatch.job().cloned() else {
        return Ok(dispatch.status());
    };
    if no_wait {
        return Ok(dispatch.status());
    }
    let mut poller = dispatcher.poller(handle.clone(), credentials);
    let result = wait_for_completion(&mut poller);
    let mut status = GenerationStatus::from_poll_result(&handle, &result);
    if status.message.is_none() {
        status.message = dispatch.fallback_reason;
    }
    Ok(status)
}

fn wait_for_completion(poller: &mut CompletionPoller<'_>) -> PollResult {
    let interval = poller.policy().interval;
    loop {
        let result = poller.poll();
        if result.is_terminal() {
            return result;
        }
        if let PollResult::Processing { progress } = &result {
            tracing::info!(
                provider = %poller.handle().provider,
                attempt = poller.attempts(),
                progress = *progress,
                "job still processing"
            );
        }
        thread::sleep(interval);
    }
}

fn provider_listing(dispatcher: &Dispatcher, credentials: &dyn CredentialProvider) -> Value {
    let mut rows = Vec::new();
    for kind in [MediaKind::Image, MediaKind::Video] {
        for id in ProviderId::priority(kind) {
            let registered = dispatcher.providers().contains(*id, kind);
            let available = !id.requires_credential() || credentials.has_credential(*id);
            let mut row = json!({
                "provider": id,
                "media_kind": kind,
                "registered": registered,
                "credential_available": available,
                "requires_source_image": id.requires_source_image(),
            });
            if kind == MediaKind::Video {
                if let Some(policy) = dispatcher
                    .providers()
                    .get(*id, kind)
                    .map(|provider| provider.poll_policy())
                {
                    row["poll_interval_secs"] = json!(policy.interval.as_secs());
                    row["max_attempts"] = json!(policy.max_attempts);
                }
            }
            rows.push(row);
        }
    }
    Value::Array(rows)
}

fn print_json(value: &Value) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_values_parse_as_json_when_possible() -> Result<()> {
        assert_eq!(parse_option("duration=10")?, ("duration".to_string(), json!(10)));
        assert_eq!(parse_option("loop=true")?, ("loop".to_string(), json!(true)));
        assert_eq!(
            parse_option("model=gen3a_turbo")?,
            ("model".to_string(), json!("gen3a_turbo"))
        );
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=x").is_err());
        Ok(())
    }

    #[test]
    fn image_flags_become_request_options() -> Result<()> {
        let cli = Cli::try_parse_from([
            "mediagen",
            "image",
            "--prompt",
            "a paper boat",
            "--provider",
            "imagen",
            "--size",
            "1792x1024",
            "--option",
            "quality=standard",
        ])?;
        let Command::Image(args) = cli.command else {
            bail!("expected the image subcommand");
        };
        let request = build_image_request(args)?;
        assert_eq!(request.provider_preference, Some(ProviderId::Imagen));
        assert_eq!(request.option_str("size"), Some("1792x1024"));
        assert_eq!(request.option_str("quality"), Some("standard"));
        assert_eq!(request.aspect_ratio("1:1"), "16:9");
        Ok(())
    }

    #[test]
    fn poll_arguments_accept_provider_aliases() -> Result<()> {
        let cli = Cli::try_parse_from([
            "mediagen",
            "--events",
            "/tmp/mediagen-events.jsonl",
            "poll",
            "--job-id",
            "operations/abc",
            "--provider",
            "google-veo",
            "--attempt",
            "3",
        ])?;
        let Command::Poll(args) = cli.command else {
            bail!("expected the poll subcommand");
        };
        assert_eq!(args.provider, ProviderId::Veo);
        assert_eq!(args.attempt, 3);
        assert!(cli.events.is_some());
        Ok(())
    }

    #[test]
    fn listing_covers_both_chains() {
        let dispatcher = Dispatcher::new(&EngineConfig::default());
        let listing = provider_listing(&dispatcher, &StaticCredentials::default());
        let rows = listing.as_array().cloned().unwrap_or_default();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0]["provider"], json!("openai"));
        assert_eq!(rows[0]["credential_available"], json!(false));
        let placeholder_video = rows
            .iter()
            .find(|row| row["provider"] == json!("placeholder") && row["media_kind"] == json!("video"));
        assert_eq!(
            placeholder_video.map(|row| row["credential_available"].clone()),
            Some(json!(true))
        );
    }
}
