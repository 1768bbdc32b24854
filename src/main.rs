use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use epub_pdf::PageGeometry;

#[derive(Parser)]
#[command(name = "epub-pdf")]
#[command(version, about = "Convert an EPUB book into a paginated PDF", long_about = None)]
struct Cli {
    /// Input EPUB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output PDF file (defaults to INPUT with a .pdf extension)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Page margin in points
    #[arg(long, value_name = "PT")]
    margin: Option<f32>,

    /// Body text size in points
    #[arg(long, value_name = "PT")]
    font_size: Option<f32>,

    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("pdf"));

    let mut geometry = PageGeometry::default();
    if let Some(margin) = cli.margin {
        geometry.margin = margin;
    }
    if let Some(font_size) = cli.font_size {
        geometry.font_size = font_size;
        geometry.line_height = geometry.line_height.max(font_size * 1.45);
    }

    let result = std::fs::read(&cli.input)
        .map_err(epub_pdf::Error::from)
        .and_then(|bytes| epub_pdf::convert_epub_bytes_with(&bytes, &geometry))
        .and_then(|result| {
            std::fs::write(&output, &result.document)?;
            Ok(result)
        });

    match result {
        Ok(result) => {
            println!(
                "{} -> {} ({} pages)",
                cli.input.display(),
                output.display(),
                result.page_count
            );
            ExitCode::SUCCESS
        }
        Err(e) if e.is_fatal_read() => {
            eprintln!("could not read {}: {e}", cli.input.display());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
