//! CLI entry point for `mailattach`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use mailattach::backend::{Manifest, ManifestBackend, ManifestEntry};
use mailattach::bridge::{self, JsonLinesBridge, NativeBridge};
use mailattach::config::Config;
use mailattach::crypto::{AesGcmCipher, SessionCipher, SessionKey};
use mailattach::download::{SaveTarget, SavedFile};
use mailattach::fetch::{FetchOptions, FetchProgress};
use mailattach::i18n;
use mailattach::mime::FileCategory;
use mailattach::model::attachment::{AttachmentId, AttachmentMeta, ClientAttachment};
use mailattach::model::payload::PayloadEncoding;
use mailattach::notify::TracingToaster;
use mailattach::preview::{select_renderer, PreviewObject};
use mailattach::reader::{read_file, FileSource};
use mailattach::session::Session;

#[derive(Parser)]
#[command(name = "mailattach", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Language (en, es). Defaults to system locale.
    #[arg(long, global = true, value_name = "LANG")]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check files against the upload policy
    Inspect {
        files: Vec<PathBuf>,
        /// Treat the files as inline (embedded) attachments
        #[arg(long)]
        inline: bool,
        /// Payload encoding: base64 or a text encoding label
        #[arg(long, default_value = "base64")]
        encoding: String,
        #[arg(long)]
        json: bool,
    },
    /// Encrypt files and register them in a manifest
    Encrypt {
        files: Vec<PathBuf>,
        #[arg(short, long)]
        manifest: PathBuf,
        /// Directory for ciphertext blobs (default: next to the manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        inline: bool,
    },
    /// Fetch and decrypt attachments from a manifest
    Fetch {
        manifest: PathBuf,
        /// Attachment IDs (default: all)
        ids: Vec<String>,
        /// Retry attachments that failed before
        #[arg(long)]
        retry_failed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Save attachments from a manifest
    Download {
        manifest: PathBuf,
        /// Attachment IDs (default: all)
        ids: Vec<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Archive name for two or more attachments (without `.zip`)
        #[arg(short, long)]
        name: Option<String>,
        /// Send the file to a native host on stdout instead of writing it
        #[arg(long)]
        bridge: bool,
        #[arg(long)]
        json: bool,
    },
    /// List the attachments of an .eml message
    List {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Preview a local file through the native bridge
    Preview {
        path: PathBuf,
        /// Emit a preview message on stdout
        #[arg(long)]
        bridge: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Detect language early from --lang arg or system env, before clap processes --help.
fn detect_lang_early() -> i18n::Lang {
    let args: Vec<String> = std::env::args().collect();
    for (i, arg) in args.iter().enumerate() {
        if arg == "--lang" {
            if let Some(lang) = args.get(i + 1).and_then(|c| i18n::Lang::from_code(c)) {
                return lang;
            }
        }
        if let Some(lang) = arg.strip_prefix("--lang=").and_then(i18n::Lang::from_code) {
            return lang;
        }
    }
    i18n::detect_system_lang()
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command();
    cmd = cmd
        .about(i18n::app_about())
        .long_about(i18n::app_long_about())
        .after_help(i18n::app_after_help());

    let subcommands: Vec<clap::Command> = cmd
        .get_subcommands()
        .map(|sub| {
            let about = match sub.get_name() {
                "inspect" => Some(i18n::help_cmd_inspect()),
                "encrypt" => Some(i18n::help_cmd_encrypt()),
                "fetch" => Some(i18n::help_cmd_fetch()),
                "download" => Some(i18n::help_cmd_download()),
                "list" => Some(i18n::help_cmd_list()),
                "preview" => Some(i18n::help_cmd_preview()),
                "completions" => Some(i18n::help_cmd_completions()),
                "manpage" => Some(i18n::help_cmd_manpage()),
                _ => None,
            };
            match about {
                Some(about) => sub.clone().about(about),
                None => sub.clone(),
            }
        })
        .collect();

    for sub in subcommands {
        cmd = cmd.mut_subcommand(sub.get_name(), |_| sub.clone());
    }

    cmd
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Detect language BEFORE clap parsing so --help is localized
    i18n::set_lang(detect_lang_early());

    let matches = build_localized_command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let config = mailattach::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Inspect {
            files,
            inline,
            encoding,
            json,
        } => cmd_inspect(&config, &files, inline, &encoding, json).await,
        Commands::Encrypt {
            files,
            manifest,
            output,
            inline,
        } => cmd_encrypt(&config, &files, &manifest, output.as_deref(), inline).await,
        Commands::Fetch {
            manifest,
            ids,
            retry_failed,
            json,
        } => cmd_fetch(&config, &manifest, &ids, retry_failed, json).await,
        Commands::Download {
            manifest,
            ids,
            output,
            name,
            bridge,
            json,
        } => {
            cmd_download(
                &config,
                &manifest,
                &ids,
                output,
                name.as_deref(),
                bridge,
                json,
            )
            .await
        }
        Commands::List { path, json } => cmd_list(&path, json),
        Commands::Preview { path, bridge } => cmd_preview(&path, bridge).await,
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = mailattach::config::log_file_path(config);
    let log_dir = mailattach::config::cache_dir(config);
    let log_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mailattach.log".to_string());
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, log_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

fn open_session(config: &Config, manifest: &Path) -> anyhow::Result<(Session, Manifest)> {
    if !manifest.exists() {
        anyhow::bail!("{}: {}", i18n::err_file_not_found(), manifest.display());
    }
    let backend = ManifestBackend::open(
        manifest,
        Duration::from_secs(config.fetch.http_timeout_secs),
    )?;
    let listing = backend.manifest().clone();
    let session = Session::new(
        config.clone(),
        Arc::new(backend),
        Arc::new(AesGcmCipher),
        Arc::new(TracingToaster),
    );
    session.store().register_remote(&listing.metas());
    Ok((session, listing))
}

fn select_ids(manifest: &Manifest, ids: &[String]) -> Vec<AttachmentId> {
    if ids.is_empty() {
        manifest.attachments.iter().map(|e| e.meta.id.clone()).collect()
    } else {
        ids.iter().map(|s| AttachmentId::from(s.as_str())).collect()
    }
}

/// Run files through the upload policy and print the result.
async fn cmd_inspect(
    config: &Config,
    files: &[PathBuf],
    inline: bool,
    encoding: &str,
    json: bool,
) -> anyhow::Result<()> {
    let encoding = PayloadEncoding::from_label(encoding)
        .ok_or_else(|| anyhow::anyhow!("Unknown encoding '{encoding}'"))?;
    let uploader = mailattach::upload::Uploader::new(
        mailattach::store::AttachmentStore::new(),
        config.limits,
        Arc::new(TracingToaster),
    );

    let pb = progress_bar(files.len() as u64, i18n::cli_reading());
    let mut rows = Vec::with_capacity(files.len());
    for path in files {
        let source = FileSource::from_path(path).await?;
        let name = source.name.clone();
        let result = uploader.upload_attachment(source, inline, Some(encoding)).await;
        rows.push((name, result));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let records = uploader.store().snapshot();
    if json {
        let items: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, result)| match result {
                Ok(up) => serde_json::json!({
                    "name": up.name,
                    "id": up.id,
                    "content_type": up.content_type,
                    "size": up.size,
                    "checksum": up.checksum,
                    "content_disposition": up.content_disposition,
                    "content_id": up.content_id,
                    "renderer": select_renderer(None, Some(up.content_type.as_str())),
                    "ok": true,
                }),
                Err(e) => serde_json::json!({
                    "name": name,
                    "ok": false,
                    "error": e.user_message(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    print_attachment_table(&records);
    for (name, result) in &rows {
        match result {
            Ok(up) => println!("  {name}: {} sha256={}", i18n::cli_ok(), up.checksum),
            Err(e) => println!("  {name}: {}", e.user_message()),
        }
    }
    println!();
    Ok(())
}

/// Validate, encrypt and register files in a manifest.
async fn cmd_encrypt(
    config: &Config,
    files: &[PathBuf],
    manifest_path: &Path,
    output: Option<&Path>,
    inline: bool,
) -> anyhow::Result<()> {
    let base_dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let blob_dir = output.map(Path::to_path_buf).unwrap_or_else(|| base_dir.clone());
    std::fs::create_dir_all(&blob_dir)?;

    let mut manifest = Manifest::load_or_default(manifest_path)?;
    let uploader = mailattach::upload::Uploader::new(
        mailattach::store::AttachmentStore::new(),
        config.limits,
        Arc::new(TracingToaster),
    );

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        sources.push(FileSource::from_path(path).await?);
    }

    let pb = progress_bar(files.len() as u64, i18n::cli_reading());
    let mut rx = uploader.store().subscribe();
    let bar = pb.clone();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let settled = rx
                .borrow_and_update()
                .iter()
                .filter(|a| !a.state.in_progress())
                .count();
            bar.set_position(settled as u64);
        }
    });
    let results = uploader.upload_attachments(sources, inline).await;
    watcher.abort();
    pb.finish_and_clear();

    let cipher = AesGcmCipher;
    let mut count = 0usize;
    for result in results {
        let up = match result {
            Ok(up) => up,
            Err(e) => {
                eprintln!("  {}", e.user_message());
                continue;
            }
        };
        let key = SessionKey::generate();
        let ciphertext = cipher.encrypt(&key, &up.content.to_bytes()?)?;
        let blob_path = blob_dir.join(format!("{}.bin", up.id));
        std::fs::write(&blob_path, &ciphertext)?;

        let link = blob_path
            .strip_prefix(&base_dir)
            .unwrap_or(&blob_path)
            .to_string_lossy()
            .into_owned();
        manifest.upsert(ManifestEntry {
            meta: AttachmentMeta {
                id: up.id,
                name: up.name,
                content_type: up.content_type,
                size: up.size,
                content_id: up.content_id,
                inline: up.inline,
            },
            link,
            session_key: key.to_base64(),
        });
        count += 1;
    }
    manifest.save(manifest_path)?;

    println!(
        "  {} {count} {} {}",
        i18n::cli_encrypted(),
        i18n::cli_file_s_into(),
        manifest_path.display()
    );
    Ok(())
}

/// Fetch and decrypt attachments, showing aggregate progress.
async fn cmd_fetch(
    config: &Config,
    manifest: &Path,
    ids: &[String],
    retry_failed: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (session, listing) = open_session(config, manifest)?;
    let ids = select_ids(&listing, ids);

    let pb = progress_bar(100, i18n::cli_fetching());
    let mut rx = session.store().subscribe();
    let store = session.store().clone();
    let watched = ids.clone();
    let bar = pb.clone();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if let Some(pct) = store.aggregate_progress(&watched) {
                bar.set_position(u64::from(pct));
            }
        }
    });

    let token = CancellationToken::new();
    let report = session
        .fetcher()
        .fetch(
            &ids,
            FetchOptions {
                fetch_failed: retry_failed,
            },
            &token,
        )
        .await;
    watcher.abort();
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_attachment_table(&session.store().snapshot());
    println!(
        "  {} {} ({} {}), {} {}",
        i18n::cli_fetched(),
        report.fetched.len() + report.from_cache.len(),
        report.from_cache.len(),
        i18n::cli_from_cache(),
        report.failed.len(),
        i18n::cli_failed()
    );
    println!();
    Ok(())
}

/// Save one attachment directly or several as a zip.
async fn cmd_download(
    config: &Config,
    manifest: &Path,
    ids: &[String],
    output: Option<PathBuf>,
    name: Option<&str>,
    use_bridge: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (session, listing) = open_session(config, manifest)?;
    let ids = select_ids(&listing, ids);
    let selected: Vec<AttachmentMeta> = ids
        .iter()
        .filter_map(|id| listing.attachments.iter().find(|e| &e.meta.id == id))
        .map(|e| e.meta.clone())
        .collect();

    let target = if use_bridge {
        SaveTarget::NativeBridge(Arc::new(JsonLinesBridge::new(std::io::stdout())))
    } else {
        let dir = output
            .or_else(|| config.download.default_output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        SaveTarget::Directory(dir)
    };
    let name = name.unwrap_or(&config.download.archive_name);

    let pb = progress_bar(selected.len() as u64, i18n::cli_downloading());
    let bar = pb.clone();
    let progress: FetchProgress = Arc::new(move |_: &AttachmentId, pct: u8| {
        if pct == 100 {
            bar.inc(1);
        }
    });
    let downloader = session.downloader().with_progress(progress);
    let report = downloader
        .download(&selected, name, &target, &CancellationToken::new())
        .await;
    pb.finish_and_clear();
    let report = report.map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if use_bridge {
        // stdout carries the bridge protocol
        eprintln!("  {}", i18n::cli_sent_to_bridge());
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match &report.saved {
        Some(SavedFile::Path { path }) => {
            println!("  {} {}", i18n::cli_saved(), path.display());
        }
        Some(SavedFile::Bridge { filename }) => {
            println!("  {}: {filename}", i18n::cli_sent_to_bridge());
        }
        None => {}
    }
    for entry in &report.entries {
        println!("    {entry}");
    }
    if !report.failed.is_empty() {
        println!("  {} {}", report.failed.len(), i18n::cli_failed());
    }
    Ok(())
}

/// List the attachments of an .eml file.
fn cmd_list(path: &Path, json: bool) -> anyhow::Result<()> {
    let attachments = mailattach::parser::eml::read_eml(path)?;

    if json {
        let items: Vec<serde_json::Value> = attachments
            .iter()
            .map(|a| {
                serde_json::json!({
                    "name": a.name,
                    "content_type": a.content_type,
                    "size": a.size,
                    "inline": a.inline,
                    "content_id": a.content_id,
                    "category": FileCategory::for_file(&a.name, Some(a.content_type.as_str())).as_str(),
                    "renderer": select_renderer(None, Some(a.content_type.as_str())),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if attachments.is_empty() {
        println!("  {}", i18n::cli_no_attachments());
        return Ok(());
    }
    print_attachment_table(&attachments);
    Ok(())
}

/// Read a local file and hand it to the preview bridge.
async fn cmd_preview(path: &Path, use_bridge: bool) -> anyhow::Result<()> {
    let source = FileSource::from_path(path).await?;
    let (content, _) = read_file(&source, PayloadEncoding::Base64, &|_: u8| {}).await?;
    let attachment = ClientAttachment {
        id: AttachmentId::generate(),
        name: source.name.clone(),
        content_type: source.content_type.clone(),
        size: source.size,
        content_id: None,
        inline: false,
        state: mailattach::model::attachment::AttachmentState::Local { content },
    };
    let preview = PreviewObject::from_attachment(&attachment)
        .ok_or_else(|| anyhow::anyhow!("{}", i18n::err_read_failed()))?;

    if use_bridge {
        let bridge = JsonLinesBridge::new(std::io::stdout());
        bridge::preview_file(&bridge as &dyn NativeBridge, &preview);
    } else {
        println!(
            "  {:<12} {}\n  {:<12} {}",
            i18n::cli_col_name(),
            preview.filename,
            i18n::cli_col_renderer(),
            preview.renderer()
        );
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailattach", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print attachment records as a human-readable table.
fn print_attachment_table(records: &[ClientAttachment]) {
    println!();
    println!(
        "  {:<32} {:<28} {:>10} {:<16} {:<10}",
        i18n::cli_col_name(),
        i18n::cli_col_type(),
        i18n::cli_col_size(),
        i18n::cli_col_state(),
        i18n::cli_col_renderer()
    );
    println!("  {}", "-".repeat(100));

    for att in records {
        let name: String = att.name.chars().take(31).collect();
        let ctype: String = att.content_type.chars().take(27).collect();
        let state = match att.state.error() {
            Some(message) => format!("{} ({message})", att.state.name()),
            None => att.state.name().to_string(),
        };
        println!(
            "  {:<32} {:<28} {:>10} {:<16} {:<10}",
            name,
            ctype,
            format_size(att.size, BINARY),
            state,
            select_renderer(None, Some(att.content_type.as_str()))
        );
    }
    println!();
}
