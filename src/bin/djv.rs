use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use djv::{
    FileInfo, FileKind, FrameRequest, IoInfo, IoSystem, Logger, Proxy, Settings, list_directory,
};

#[derive(Parser, Debug)]
#[command(name = "djv", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered I/O plugins.
    Plugins,
    /// Print the header information of files and sequences.
    Info(InfoArgs),
    /// List a directory, grouping numbered files into sequences.
    Ls(LsArgs),
    /// Convert a file or sequence to another format.
    Convert(ConvertArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Files to inspect (`a.0001.dpx` expands to its whole sequence).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct LsArgs {
    /// Directory to list.
    #[arg(default_value = ".")]
    dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input file or sequence.
    input: PathBuf,

    /// Output file; a numbered name writes one file per frame.
    output: PathBuf,

    /// Decode at 1/2^N resolution (0-3).
    #[arg(long, default_value_t = 0)]
    proxy: u32,

    /// Convert only this frame.
    #[arg(long)]
    frame: Option<i64>,

    /// Settings file holding plugin options.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Plugin flags, e.g. `-tiff_compression lzw -dpx_endian msb`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    plugin_args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "djv=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Plugins => cmd_plugins(),
        Command::Info(args) => cmd_info(args),
        Command::Ls(args) => cmd_ls(args),
        Command::Convert(args) => cmd_convert(args),
    }
}

fn cmd_plugins() -> anyhow::Result<()> {
    let io = IoSystem::new(Logger::default());
    for p in io.plugins() {
        println!(
            "{:<8} {:<28} {:<9} {}",
            p.name(),
            p.extensions().join(" "),
            if p.can_sequence() { "sequence" } else { "movie" },
            p.description()
        );
        println!("         options: {}", p.options_json());
    }
    Ok(())
}

/// Expand a numbered file to every frame of its sequence found next to it.
///
/// Names of existing files are taken literally; others may be ranges or `#` patterns.
fn resolve_input(io: &IoSystem, path: &Path) -> anyhow::Result<FileInfo> {
    let info = if path.exists() {
        FileInfo::new(path)
    } else {
        FileInfo::pattern(path)?
    };
    if info.kind() == FileKind::Sequence || !info.is_numbered() {
        return Ok(info);
    }
    let dir = match info.dir() {
        d if d.as_os_str().is_empty() => Path::new("."),
        d => d,
    };
    let seq_exts = io.sequence_extensions();
    if !seq_exts.contains(&info.extension_lower()) {
        return Ok(info);
    }
    let found = list_directory(dir, &seq_exts)?.into_iter().find(|e| {
        e.base() == info.base()
            && e.extension() == info.extension()
            && e.sequence().frames.iter().any(|f| info.sequence().frames.contains(f))
    });
    Ok(found.unwrap_or(info))
}

fn print_info(file: &FileInfo, info: &IoInfo) {
    println!("{file}");
    for (i, layer) in info.layers.iter().enumerate() {
        let name = if layer.name.is_empty() {
            String::new()
        } else {
            format!(" \"{}\"", layer.name)
        };
        println!(
            "  layer {i}{name}: {}x{} {}",
            layer.size.w, layer.size.h, layer.pixel
        );
    }
    println!(
        "  frames: {} ({}) @ {}/{} fps",
        if info.sequence.is_empty() {
            "-".to_string()
        } else {
            info.sequence.to_string()
        },
        info.frame_count(),
        info.speed.num,
        info.speed.den
    );
    if let Some(audio) = &info.audio {
        println!(
            "  audio: {} ch {} Hz {}",
            audio.channels, audio.sample_rate, audio.sample_type
        );
    }
    for (k, v) in info.tags.iter() {
        println!("  {k}: {v}");
    }
}

fn cmd_info(args: InfoArgs) -> anyhow::Result<()> {
    let io = IoSystem::new(Logger::default());
    let mut all = Vec::new();
    for path in &args.inputs {
        let file = resolve_input(&io, path)?;
        let mut reader = io.read(&file)?;
        let info = reader.info().clone();
        reader.close();
        if args.json {
            all.push(serde_json::json!({ "file": file.to_string(), "info": info }));
        } else {
            print_info(&file, &info);
        }
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&all)?);
    }
    Ok(())
}

fn cmd_ls(args: LsArgs) -> anyhow::Result<()> {
    let io = IoSystem::new(Logger::default());
    for entry in list_directory(&args.dir, &io.sequence_extensions())? {
        match entry.kind() {
            FileKind::Directory => println!("{}/", entry.file_name()),
            _ => println!("{}", entry.file_name()),
        }
    }
    Ok(())
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let mut io = IoSystem::new(Logger::default());
    if let Some(path) = &args.settings {
        let settings = Settings::load(path)?;
        io.load_settings(&settings.io)
            .with_context(|| format!("apply settings '{}'", path.display()))?;
    }
    let leftover = io.command_line(args.plugin_args)?;
    if !leftover.is_empty() {
        anyhow::bail!("unrecognized arguments: {}", leftover.join(" "));
    }
    let proxy = Proxy::from_level(args.proxy)?;

    let input = resolve_input(&io, &args.input)?;
    let mut reader = io.read(&input)?;
    let info = reader.info().clone();
    let frames: Vec<Option<i64>> = match args.frame {
        Some(f) => vec![Some(f)],
        None if info.sequence.is_empty() => vec![None],
        None => info.sequence.frames.iter().copied().map(Some).collect(),
    };

    let mut out_info = info.clone();
    for layer in &mut out_info.layers {
        layer.size = proxy.scale_size(layer.size);
    }
    let output = FileInfo::new(&args.output);
    let mut writer = io.write(&output, &out_info)?;

    for frame in frames {
        let request = FrameRequest {
            frame,
            proxy,
            ..FrameRequest::default()
        };
        let image = reader.read(&request)?;
        let out_frame = frame.or_else(|| output.sequence().first()).unwrap_or(0);
        writer.write(&image, out_frame)?;
        tracing::info!(input = %input, frame = ?frame, output = %output.path_for(out_frame).display(), "converted");
    }
    writer.close()?;
    reader.close();
    Ok(())
}
