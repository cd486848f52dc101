use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use tg_logger::bot::{handlers, ObservedNames, TelegramLogSink, TelegramMediaFetcher};
use tg_logger::config::Settings;
use tg_logger::pipeline::{
    Archiver, DeletionRateLimiter, EventRouter, Formatter, MediaDelivery, Relay, RetryingLookup,
};
use tg_logger::retention::spawn_cleanup;
use tg_logger::storage::{InMemoryStore, MessageStore, R2MessageStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Secret-masking rules applied to every log line
struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Compile the masking rules
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        let specs: [(&str, &'static str); 7] = [
            // Bot API URLs carry the token in the path
            (
                r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)",
                "$1[TELEGRAM_TOKEN]$3",
            ),
            (r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+", "$1[TELEGRAM_TOKEN]"),
            (r"[0-9]{8,10}:[A-Za-z0-9_-]{35}", "[TELEGRAM_TOKEN]"),
            (r"R2_ACCESS_KEY_ID=[^\s&]+", "R2_ACCESS_KEY_ID=[MASKED]"),
            (r"R2_SECRET_ACCESS_KEY=[^\s&]+", "R2_SECRET_ACCESS_KEY=[MASKED]"),
            (r"access_key_id: \S+", "access_key_id: [MASKED]"),
            (r"secret_access_key: \S+", "secret_access_key: [MASKED]"),
        ];

        let rules = specs
            .into_iter()
            .map(|(pattern, replacement)| Regex::new(pattern).map(|re| (re, replacement)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |text, (re, replacement)| {
                re.replace_all(&text, *replacement).into_owned()
            })
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.inner
            .write_all(self.patterns.redact(&line).as_bytes())?;
        // Report the caller's length; the masked text may be shorter or longer
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("Starting Telegram message logger...");

    let settings = init_settings();
    let store = init_store(&settings).await;

    let bot = Bot::new(settings.telegram_token.clone());
    let names = Arc::new(ObservedNames::default());
    let relay = Arc::new(build_relay(&bot, &settings, store.clone(), names.clone()));

    let shutdown = CancellationToken::new();
    let cleanup = spawn_cleanup(store, settings.retention_policy(), shutdown.clone());

    info!(log_chat_id = settings.log_chat_id, "Logger is running...");

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![relay, names, settings])
        // One queue for every update keeps deletions in arrival order
        .distribution_function(|_| Some(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    if let Err(e) = cleanup.await {
        warn!("Cleanup task ended abnormally: {}", e);
    }
    info!("Logger stopped.");

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_store(settings: &Settings) -> Arc<dyn MessageStore> {
    if !settings.r2_configured() {
        warn!("R2 is not configured, archive is kept in memory only.");
        return Arc::new(InMemoryStore::new());
    }

    match R2MessageStore::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if s.check_connection().await.is_err() {
                error!("R2 Storage connection check returned error.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_relay(
    bot: &Bot,
    settings: &Settings,
    store: Arc<dyn MessageStore>,
    names: Arc<ObservedNames>,
) -> Relay {
    let rules = Arc::new(settings.filter_rules());
    info!(
        ignored = rules.ignored_ids.len(),
        forward_users = rules.forward_user_ids.len(),
        forward_groups = rules.forward_group_ids.len(),
        "Filter rules loaded"
    );

    let fetcher = Arc::new(TelegramMediaFetcher::new(
        bot.clone(),
        settings.max_media_size_bytes,
    ));
    let sink = Arc::new(TelegramLogSink::new(
        bot.clone(),
        ChatId(settings.log_chat_id),
    ));

    let archiver = Archiver::new(
        store.clone(),
        fetcher.clone(),
        rules.clone(),
        settings.max_media_size_bytes,
    );
    let router = EventRouter::new(
        rules,
        DeletionRateLimiter::new(settings.rate_limit_config()),
        RetryingLookup::new(store.clone(), settings.lookup_retry_delay()),
        Formatter::new(names),
        MediaDelivery::new(sink, store, fetcher.clone(), fetcher),
    );

    Relay::new(archiver, router)
}
