use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use clog_server::api::EventView;
use clog_server::{ClogServer, ServerConfig};
use clog_store::{EVENTS_FILE, PROGRESS_FILE, SyncMode, WalConfig};
use clog_stream::{DurableChangeStream, StreamConfig};
use clog_types::{ChangeEvent, ConsumerId, NewEvent};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ctx = Session {
        data_dir: &cli.data_dir,
        format: cli.format,
    };
    match cli.command {
        Command::Append(args) => cmd_append(&ctx, args),
        Command::Get(args) => cmd_get(&ctx, args),
        Command::Replay(args) => cmd_replay(&ctx, args),
        Command::Consume(args) => cmd_consume(&ctx, args),
        Command::Ack(args) => cmd_ack(&ctx, args),
        Command::Progress(args) => cmd_progress(&ctx, args),
        Command::Inspect => cmd_inspect(&ctx),
        Command::Serve(args) => cmd_serve(&ctx, args),
    }
}

struct Session<'a> {
    data_dir: &'a Path,
    format: OutputFormat,
}

impl Session<'_> {
    fn open(&self, sync: SyncMode) -> anyhow::Result<DurableChangeStream> {
        DurableChangeStream::open_dir(self.data_dir, WalConfig { sync_mode: sync }, StreamConfig::default())
            .with_context(|| format!("opening change log in {}", self.data_dir.display()))
    }

    fn print_events(&self, events: &[ChangeEvent]) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => {
                let views: Vec<EventView> = events.iter().map(EventView::from).collect();
                println!("{}", serde_json::to_string_pretty(&views)?);
            }
            OutputFormat::Text => {
                for event in events {
                    print_event(event);
                }
            }
        }
        Ok(())
    }
}

fn print_event(event: &ChangeEvent) {
    let kind = if event.is_create() {
        event.event_type.green()
    } else if event.is_delete() {
        event.event_type.red()
    } else {
        event.event_type.cyan()
    };
    println!(
        "{}  {}  {}  {}  {}",
        format!("#{}", event.offset).yellow().bold(),
        event.event_id.short_hex().dimmed(),
        kind,
        event.source,
        event.timestamp.to_rfc3339().dimmed(),
    );
    if !event.before.is_empty() {
        println!("  before: {}", payload_text(&event.before));
    }
    if !event.after.is_empty() {
        println!("  after:  {}", payload_text(&event.after));
    }
}

fn payload_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(bytes)),
    }
}

fn payload(text: &str, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    if is_hex {
        hex::decode(text).with_context(|| format!("invalid hex payload {text:?}"))
    } else {
        Ok(text.as_bytes().to_vec())
    }
}

fn cmd_append(ctx: &Session, args: AppendArgs) -> anyhow::Result<()> {
    let stream = ctx.open(args.sync.map(SyncMode::from).unwrap_or_default())?;
    let event = NewEvent::new(args.event_type, args.source)
        .with_before(payload(&args.before, args.hex)?)
        .with_after(payload(&args.after, args.hex)?);
    let stored = stream.append(event)?;
    stream.close()?;

    match ctx.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "offset": stored.offset, "event_id": stored.event_id.to_hex() })
        ),
        OutputFormat::Text => println!(
            "{} Appended {} at offset {}",
            "✓".green().bold(),
            stored.event_type.cyan(),
            stored.offset.to_string().yellow().bold(),
        ),
    }
    Ok(())
}

fn cmd_get(ctx: &Session, args: GetArgs) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let event = stream.get(args.offset)?;
    ctx.print_events(std::slice::from_ref(&event))
}

fn cmd_replay(ctx: &Session, args: ReplayArgs) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let events = match args.to {
        Some(to) => stream.replay(args.from, to)?,
        None => stream.replay_from(args.from)?,
    };
    ctx.print_events(&events)
}

fn cmd_consume(ctx: &Session, args: ConsumeArgs) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let consumer = ConsumerId::new(args.consumer)?;

    let from = stream.resume_offset(&consumer)?;
    let cursor = stream.subscribe_as(from, Some(consumer.to_string()))?;
    let events = stream.read(&cursor, args.max)?;
    stream.unsubscribe(&cursor)?;

    ctx.print_events(&events)?;
    if let (true, Some(last)) = (args.ack, events.last()) {
        let progress = stream.acknowledge(&consumer, last.offset)?;
        if ctx.format == OutputFormat::Text {
            println!(
                "{} {} acknowledged through {}",
                "✓".green().bold(),
                consumer.to_string().bold(),
                progress.to_string().yellow()
            );
        }
    } else if events.is_empty() && ctx.format == OutputFormat::Text {
        println!("{} is caught up.", consumer.to_string().bold());
    }
    stream.close()?;
    Ok(())
}

fn cmd_ack(ctx: &Session, args: AckArgs) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let consumer = ConsumerId::new(args.consumer)?;
    let progress = stream.acknowledge(&consumer, args.offset)?;
    stream.close()?;
    println!(
        "{} {} acknowledged through {}",
        "✓".green().bold(),
        consumer.to_string().bold(),
        progress.to_string().yellow()
    );
    Ok(())
}

fn cmd_progress(ctx: &Session, args: ProgressArgs) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let rows: Vec<(String, Option<u64>)> = match args.consumer {
        Some(name) => {
            let consumer = ConsumerId::new(name)?;
            let progress = stream.progress(&consumer)?;
            vec![(consumer.to_string(), progress)]
        }
        None => stream
            .consumers()?
            .into_iter()
            .map(|(c, o)| (c.to_string(), Some(o)))
            .collect(),
    };

    match ctx.format {
        OutputFormat::Json => {
            let json: Vec<_> = rows
                .iter()
                .map(|(c, o)| serde_json::json!({ "consumer": c, "acknowledged_offset": o }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text if rows.is_empty() => println!("No consumers have acknowledged anything."),
        OutputFormat::Text => {
            for (consumer, offset) in rows {
                match offset {
                    Some(o) => println!("{}  {}", consumer.bold(), o.to_string().yellow()),
                    None => println!("{}  {}", consumer.bold(), "(no progress)".dimmed()),
                }
            }
        }
    }
    Ok(())
}

fn cmd_inspect(ctx: &Session) -> anyhow::Result<()> {
    let stream = ctx.open(SyncMode::default())?;
    let stats = stream.stats();
    let size = |name: &str| {
        std::fs::metadata(ctx.data_dir.join(name))
            .map(|m| m.len())
            .unwrap_or(0)
    };

    match ctx.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "data_dir": ctx.data_dir.display().to_string(),
                "next_offset": stats.next_offset,
                "tracked_consumers": stats.tracked_consumers,
                "events_bytes": size(EVENTS_FILE),
                "progress_bytes": size(PROGRESS_FILE),
            }))?
        ),
        OutputFormat::Text => {
            println!("Change log in {}", ctx.data_dir.display().to_string().bold());
            println!("  Events:    {}", stats.next_offset.to_string().yellow());
            println!("  Consumers: {}", stats.tracked_consumers.to_string().yellow());
            println!("  {}  {} bytes", EVENTS_FILE, size(EVENTS_FILE));
            println!("  {}  {} bytes", PROGRESS_FILE, size(PROGRESS_FILE));
        }
    }
    Ok(())
}

fn cmd_serve(ctx: &Session, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig {
            data_dir: Some(ctx.data_dir.to_path_buf()),
            ..ServerConfig::default()
        },
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(sync) = args.sync {
        config.sync_mode = sync.into();
    }
    if let Some(max) = args.max_read_batch {
        config.max_read_batch = max;
    }
    if args.memory {
        config.data_dir = None;
    }

    let server = ClogServer::open(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}
