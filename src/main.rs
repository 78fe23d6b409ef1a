use clap::{Parser, ValueEnum};
use cutlist_ocr::{draw_overlay, CutlistOcr, OverlayConfig, PipelineConfig, TesseractEngine};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cutlist-ocr")]
#[command(about = "Extracts cut-list measurements from photos of part lists", long_about = None)]
struct Cli {
    /// Input image path
    image: PathBuf,

    /// Recognition language hint passed to the OCR engine
    #[arg(long, default_value = "eng+spa")]
    lang: String,

    /// Path to the tesseract binary (defaults to TESSERACT_CMD or PATH lookup)
    #[arg(long)]
    tesseract: Option<PathBuf>,

    /// Per-region recognition timeout in seconds
    #[arg(long, default_value_t = 12)]
    line_timeout: u64,

    /// Whole-image fallback timeout in seconds
    #[arg(long, default_value_t = 30)]
    global_timeout: u64,

    /// Write a review overlay image (detected boxes + recognized text) here
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// TTF/OTF font used for overlay labels
    #[arg(long)]
    font: Option<PathBuf>,

    /// Also write the JSON result to this path
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON with pieces, regions and image dimensions
    Json,
    /// Plain text, one `quantity lengthxwidth` line per piece
    Text,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::default();
    config.language = cli.lang.clone();
    config.recognition.line_timeout = Duration::from_secs(cli.line_timeout);
    config.recognition.global_timeout = Duration::from_secs(cli.global_timeout);

    let engine = match &cli.tesseract {
        Some(program) => TesseractEngine::with_program(program),
        None => TesseractEngine::new(),
    };
    let ocr = CutlistOcr::with_engine(Box::new(engine), config);

    // Decode once so the overlay can be painted on the same image.
    let image = image::open(&cli.image)?;
    let result = ocr.analyze_image(&image);

    if let Some(overlay_path) = &cli.overlay {
        let overlay_config = match &cli.font {
            Some(font_path) => OverlayConfig::with_font_bytes(std::fs::read(font_path)?)
                .ok_or("failed to load overlay font")?,
            None => OverlayConfig::default(),
        };
        draw_overlay(&image, &result, &overlay_config).save(overlay_path)?;
    }

    if let Some(json_path) = &cli.json_out {
        std::fs::write(json_path, serde_json::to_string_pretty(&result)?)?;
    }

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            for piece in &result.pieces {
                println!("{} {}x{}", piece.quantity, piece.length, piece.width);
            }
        }
    }

    Ok(())
}
