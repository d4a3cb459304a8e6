use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Menu JSON to import.
    menu: PathBuf,

    /// Catalog seed to write.
    #[arg(short, long, default_value = "../catalog.bin")]
    out: PathBuf,

    /// Merge into the existing catalog instead of replacing it.
    #[arg(short, long)]
    merge: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    process::load_menu(&args.menu, &args.out, args.merge)
}
