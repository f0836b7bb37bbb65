use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use media_bus::annexb::AnnexBFilter;
use media_bus::error::Severity;
use media_bus::live::{LiveDecoder, LiveQueue, OverflowPolicy};
use media_bus::stream::MediaKind;
use media_bus::{
    ContainerSession, Direction, FfmpegEngine, LiveSettings, MediaError, TranscodeSettings,
};
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "media-pipe", version, about = "Remux and transcode media files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print format and stream details of an input.
    Probe {
        input: String,
        #[arg(long)]
        json: bool,
    },
    /// Copy the primary audio and video streams into another container.
    Remux { input: String, output: String },
    /// Re-encode, writing packets as they are produced.
    Transcode(TranscodeArgs),
    /// Re-encode through the re-timing buffer.
    TranscodeBuffered(TranscodeArgs),
    /// Replay the video packets of an input through a live ingestion queue.
    Live(LiveArgs),
}

#[derive(Args)]
struct TranscodeArgs {
    input: String,
    output: String,
    /// JSON file with transcode settings; flags override it.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    video_codec: Option<String>,
    #[arg(long)]
    audio_codec: Option<String>,
    #[arg(long, requires = "height")]
    width: Option<u32>,
    #[arg(long, requires = "width")]
    height: Option<u32>,
    #[arg(long)]
    pixel_format: Option<String>,
    #[arg(long)]
    bit_rate: Option<i64>,
    #[arg(long)]
    audio_sample_rate: Option<u32>,
    #[arg(long)]
    audio_channels: Option<u16>,
    #[arg(long)]
    audio_bit_rate: Option<i64>,
}

impl TranscodeArgs {
    fn settings(&self) -> anyhow::Result<TranscodeSettings> {
        let mut settings = match &self.settings {
            Some(path) => TranscodeSettings::load(path)?,
            None => TranscodeSettings::default(),
        };
        if let Some(codec) = &self.video_codec {
            settings.video_codec = codec.clone();
        }
        if let Some(codec) = &self.audio_codec {
            settings.audio_codec = codec.clone();
        }
        if self.width.is_some() {
            settings.width = self.width;
            settings.height = self.height;
        }
        if self.pixel_format.is_some() {
            settings.pixel_format = self.pixel_format.clone();
        }
        if let Some(rate) = self.bit_rate {
            settings.bit_rate = rate;
        }
        if self.audio_sample_rate.is_some() {
            settings.audio_sample_rate = self.audio_sample_rate;
        }
        if self.audio_channels.is_some() {
            settings.audio_channels = self.audio_channels;
        }
        if let Some(rate) = self.audio_bit_rate {
            settings.audio_bit_rate = rate;
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Args)]
struct LiveArgs {
    input: String,
    /// JSON file with live settings; flags override it. Without one the
    /// queue is unbounded so that no packet of the file is lost.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Decoder to use; defaults to the codec of the input's video stream.
    #[arg(long)]
    codec: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    queue_capacity: Option<usize>,
}

impl LiveArgs {
    fn settings(&self) -> anyhow::Result<LiveSettings> {
        let mut settings = match &self.settings {
            Some(path) => LiveSettings::load(path)?,
            None => LiveSettings {
                overflow: OverflowPolicy::Unbounded,
                ..LiveSettings::default()
            },
        };
        if let Some(codec) = &self.codec {
            settings.codec = codec.clone();
        }
        if let Some(width) = self.width {
            settings.width = width;
        }
        if let Some(height) = self.height {
            settings.height = height;
        }
        if let Some(capacity) = self.queue_capacity {
            settings.queue_capacity = capacity;
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_next", log::LevelFilter::Warn)
        .filter_module("media_bus", log::LevelFilter::Info)
        .init();
}

fn probe(input: &str, json: bool) -> anyhow::Result<()> {
    let mut session = ContainerSession::open(FfmpegEngine::new(), Direction::Input, input)?;
    if let Err(e) = session.discover_streams() {
        log::warn!("{input}: {e}");
    }
    let info = media_bus::metadata::describe(&session);
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{info}");
    }
    Ok(())
}

fn remux(input: &str, output: &str, cancel: &CancellationToken) -> anyhow::Result<()> {
    let stats = media_bus::remux::remux_file(FfmpegEngine::new(), input, output, cancel)
        .with_context(|| format!("remux {input} -> {output}"))?;
    log::info!(
        "{output}: {} video, {} audio packets",
        stats.video_packets,
        stats.audio_packets
    );
    Ok(())
}

fn transcode(args: &TranscodeArgs, buffered: bool, cancel: &CancellationToken) -> anyhow::Result<()> {
    let settings = args.settings()?;
    let run = if buffered {
        media_bus::transcode::transcode_buffered_file::<FfmpegEngine>
    } else {
        media_bus::transcode::transcode_file::<FfmpegEngine>
    };
    let stats = run(FfmpegEngine::new(), &args.input, &args.output, &settings, cancel)
        .with_context(|| format!("transcode {} -> {}", args.input, args.output))?;
    log::info!(
        "{}: video {} frames / {} packets, audio {} frames / {} packets",
        args.output,
        stats.video.frames,
        stats.video.packets,
        stats.audio.frames,
        stats.audio.packets
    );
    Ok(())
}

/// Runs a pipeline on the blocking pool; its sessions live on that thread.
async fn blocking<F>(cancel: CancellationToken, job: F) -> anyhow::Result<()>
where
    F: FnOnce(&CancellationToken) -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&cancel)).await?
}

/// Producer half of `live`: tells the consumer what it is about to decode,
/// then replays the input's video payloads into `queue` as Annex B.
fn produce(
    args: &LiveArgs,
    mut settings: LiveSettings,
    queue: &LiveQueue,
    announce: oneshot::Sender<LiveSettings>,
    ready: &Notify,
    cancel: &CancellationToken,
) -> anyhow::Result<u64> {
    let mut session = ContainerSession::open(FfmpegEngine::new(), Direction::Input, &args.input)?;
    session.discover_streams()?;
    let stream = session
        .primary(MediaKind::Video)
        .context("input has no video stream")?;
    let video = stream.index;
    let filter = AnnexBFilter::for_stream(&stream.params.codec, &stream.extradata)?;
    if args.codec.is_none() {
        settings.codec = stream.params.codec.clone();
    }
    if let Some(params) = stream.params.video() {
        settings.width = args.width.unwrap_or(params.width);
        settings.height = args.height.unwrap_or(params.height);
    }
    if announce.send(settings).is_err() {
        anyhow::bail!("live consumer stopped before the replay started");
    }

    let mut sent = 0;
    while let Some(packet) = session.read_packet()? {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled.into());
        }
        if packet.index() != video {
            continue;
        }
        let data = match &filter {
            Some(filter) => filter.filter(packet.data(), packet.is_key()),
            None => packet.data().clone(),
        };
        queue.submit(data);
        ready.notify_one();
        sent += 1;
    }
    Ok(sent)
}

/// Consumer half of `live`: decodes packets as they arrive and drains the
/// decoder once the producer closed the queue.
fn consume(
    decoder: &mut LiveDecoder<FfmpegEngine>,
    runtime: &Handle,
    ready: &Notify,
    cancel: &CancellationToken,
) -> anyhow::Result<u64> {
    let mut frames = 0;
    loop {
        match decoder.decode_next(cancel)? {
            Some(_) => frames += 1,
            None if decoder.queue().is_closed() => {
                frames += decoder.finish(cancel)?.len() as u64;
                return Ok(frames);
            }
            None => runtime.block_on(ready.notified()),
        }
    }
}

async fn live(args: LiveArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let settings = args.settings()?;
    let queue = LiveQueue::from_settings(&settings);
    let ready = Arc::new(Notify::new());
    let (announce, announced) = oneshot::channel();

    let consumer = tokio::task::spawn_blocking({
        let queue = queue.clone();
        let ready = ready.clone();
        let cancel = cancel.clone();
        let runtime = Handle::current();
        move || -> anyhow::Result<u64> {
            // the producer reports its own failure
            let Ok(settings) = announced.blocking_recv() else {
                return Ok(0);
            };
            let mut decoder = LiveDecoder::open(&FfmpegEngine::new(), queue, &settings)?;
            let outcome = consume(&mut decoder, &runtime, &ready, &cancel);
            decoder.close();
            outcome
        }
    });
    let producer = tokio::task::spawn_blocking({
        let queue = queue.clone();
        move || {
            let outcome = produce(&args, settings, &queue, announce, &ready, &cancel);
            queue.close();
            ready.notify_one();
            outcome
        }
    });

    let sent = producer.await??;
    let frames = consumer.await??;
    log::info!(
        "live: {sent} packets submitted, {} dropped, {frames} frames decoded",
        queue.dropped()
    );
    Ok(())
}

fn report(e: &anyhow::Error) {
    match e.downcast_ref::<MediaError>().map(MediaError::severity) {
        Some(Severity::Warning) => log::warn!("{e:#}"),
        _ => log::error!("{e:#}"),
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = media_bus::init() {
        log::error!("{e}");
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping");
            watcher.cancel();
        }
    });

    let outcome = match cli.command {
        Command::Probe { input, json } => blocking(cancel, move |_| probe(&input, json)).await,
        Command::Remux { input, output } => {
            blocking(cancel, move |c| remux(&input, &output, c)).await
        }
        Command::Transcode(args) => blocking(cancel, move |c| transcode(&args, false, c)).await,
        Command::TranscodeBuffered(args) => {
            blocking(cancel, move |c| transcode(&args, true, c)).await
        }
        Command::Live(args) => live(args, cancel).await,
    };

    if let Err(e) = outcome {
        report(&e);
        std::process::exit(1);
    }
    std::process::exit(0);
}
