use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use soprano_dataset::{combine, DEFAULT_FILES, DEFAULT_OUTPUT};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "combine-datasets")]
#[command(about = "Combine instruction/response JSONL files into one training set")]
#[command(version)]
struct Cli {
    /// Directory holding the source files
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Output file (relative paths resolve against --data-dir)
    #[arg(long, short, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Source files in order; defaults to the standard six
    files: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let files: Vec<String> = if cli.files.is_empty() {
        DEFAULT_FILES.iter().map(|f| f.to_string()).collect()
    } else {
        cli.files
    };
    let output = if cli.output.is_absolute() {
        cli.output
    } else {
        cli.data_dir.join(&cli.output)
    };

    println!("{}", "Combining datasets...".bold());
    println!("{}", "-".repeat(50));

    let report = combine(&cli.data_dir, &files, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    for warning in &report.warnings {
        eprintln!("{} {}", "Warning:".yellow(), warning);
    }

    for (name, count) in &report.file_counts {
        println!("  {}: {} entries", name.cyan(), count);
    }

    println!("{}", "-".repeat(50));
    println!(
        "{} {}",
        "Total entries written:".green(),
        report.total.to_string().bold()
    );
    println!("Output file: {}", report.output.display());

    Ok(())
}
