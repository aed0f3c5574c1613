use clap::{Parser, Subcommand};
use rpxtool::codec::CompressOptions;
use rpxtool::{read_rpx, write_rpx, Rpx};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rpxtool", about = "Inspect, relink and (de)compress Wii U RPX executables", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inflate every zlib-compressed section
    Decompress {
        input: PathBuf,
        /// Defaults to `<input>.d.rpx`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Deflate every eligible section where it saves space
    Compress {
        input: PathBuf,
        /// Defaults to `<input>.c.rpx`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// zlib level 0-9
        #[arg(short, long, default_value = "6")]
        level: u32,
    },
    /// Recompute section offsets and the CRC table without recompressing
    Relink {
        input: PathBuf,
        /// Defaults to `<input>.r.rpx`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show header fields and the section table
    Info {
        input: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check the CRC table against section contents
    Verify {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output } => {
            let mut rpx = open_rpx(&input)?;
            rpxtool::decompress(&mut rpx)?;
            let output = output.unwrap_or_else(|| sibling(&input, "d"));
            save_rpx(&rpx, &output)?;
            println!("Decompressed: {}", output.display());
        }

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, level } => {
            let mut rpx = open_rpx(&input)?;
            rpxtool::compress_with(&mut rpx, &CompressOptions { level })?;
            let output = output.unwrap_or_else(|| sibling(&input, "c"));
            save_rpx(&rpx, &output)?;
            println!("Compressed: {}", output.display());
        }

        // ── Relink ───────────────────────────────────────────────────────────
        Commands::Relink { input, output } => {
            let mut rpx = open_rpx(&input)?;
            rpx.relink()?;
            let output = output.unwrap_or_else(|| sibling(&input, "r"));
            save_rpx(&rpx, &output)?;
            println!("Relinked: {}", output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let rpx = open_rpx(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rpx.summary())?);
                return Ok(());
            }
            let h = &rpx.ehdr;
            println!("── RPX ──────────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Ident          {}", hex::encode(h.ident));
            println!("  Machine        {}", h.machine);
            println!("  Entry          {:#010x}", h.entry);
            println!("  Section table  {:#x} ({} x {} B)", h.shoff, h.shnum, h.shentsize);
            println!("  String table   #{}", h.shstrndx);
            println!("  Written size   {} B", rpx.written_size());
            println!("{:>4} {:<13} {:>10} {:>10} {:>10} {:>10} {:>8}  Zlib",
                     "Idx", "Type", "Flags", "Addr", "Offset", "Size", "CRC");
            for s in rpx.summary().sections {
                println!("{:>4} {:<13} {:#010x} {:#010x} {:#010x} {:#010x} {:08x}  {}",
                    s.id.0, s.kind, s.flags, s.addr, s.offset, s.size, s.crc,
                    if s.compressed { "yes" } else { "" });
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input } => {
            let rpx = open_rpx(&input)?;
            let mismatches = rpxtool::verify_crcs(&rpx)?;
            if mismatches.is_empty() {
                println!("CRC table OK ({} sections)", rpx.sections.len());
            } else {
                for m in &mismatches {
                    println!("  section {}  stored {:08x}  computed {:08x}",
                        m.section, m.stored, m.computed);
                }
                eprintln!("{} CRC mismatch(es)", mismatches.len());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_rpx(path: &Path) -> Result<Rpx, Box<dyn std::error::Error>> {
    tracing::info!("Reading {}", path.display());
    Ok(read_rpx(BufReader::new(File::open(path)?))?)
}

fn save_rpx(rpx: &Rpx, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Writing {} ({} B)", path.display(), rpx.written_size());
    write_rpx(rpx, BufWriter::new(File::create(path)?))?;
    Ok(())
}

/// `game.rpx` → `game.<tag>.rpx`
fn sibling(input: &Path, tag: &str) -> PathBuf {
    input.with_extension(format!("{tag}.rpx"))
}
