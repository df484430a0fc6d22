use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use region_annotator::config::{AppConfig, DEFAULT_CONFIG_FILE};
use region_annotator::{batch, crop, paste, pdf, preview, Comparison, FilterSettings, RegionManifest};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "region-annotator", version, about = "Crop, paste back and filter image regions")]
struct Cli {
    /// Settings file (created by `filter --save`)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the block threshold filter over every image in a directory
    Filter {
        input_dir: PathBuf,
        output_dir: PathBuf,
        #[command(flatten)]
        params: FilterArgs,
        /// Remember these parameters in the settings file
        #[arg(long)]
        save: bool,
    },
    /// Crop the regions of a manifest out of an image
    Crop {
        image: PathBuf,
        manifest: PathBuf,
        /// Defaults to the configured crops directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Paste edited crops back into the original image
    Paste {
        manifest: PathBuf,
        image: PathBuf,
        edited_dir: PathBuf,
        /// Defaults to `<image>_pasted.png`
        output: Option<PathBuf>,
    },
    /// Convert a PNG into a one-page PDF named `<NAME>.pdf`
    Pdf { png: PathBuf, name: String },
    /// Draw the regions of a manifest over an image
    Preview {
        image: PathBuf,
        manifest: PathBuf,
        output: PathBuf,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Window side length (e.g. 2 for 2x2)
    #[arg(short, long)]
    kernel_size: Option<u32>,
    /// Percentage of qualifying pixels a window needs (e.g. 75)
    #[arg(short, long)]
    percentage: Option<f64>,
    /// Value pixels are compared against (e.g. 150)
    #[arg(short = 'v', long)]
    compare_value: Option<u8>,
    #[arg(short, long, value_enum)]
    comparison: Option<ComparisonArg>,
    /// Value written over matching windows
    #[arg(short, long)]
    fill_value: Option<u8>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ComparisonArg {
    AtLeast,
    AtMost,
}

impl From<ComparisonArg> for Comparison {
    fn from(arg: ComparisonArg) -> Self {
        match arg {
            ComparisonArg::AtLeast => Comparison::AtLeast,
            ComparisonArg::AtMost => Comparison::AtMost,
        }
    }
}

impl FilterArgs {
    fn apply_to(&self, mut settings: FilterSettings) -> FilterSettings {
        if let Some(k) = self.kernel_size {
            settings.kernel_size = k;
        }
        if let Some(p) = self.percentage {
            settings.percentage = p;
        }
        if let Some(v) = self.compare_value {
            settings.compare_value = v;
        }
        if let Some(c) = self.comparison {
            settings.comparison = c.into();
        }
        if let Some(f) = self.fill_value {
            settings.fill_value = f;
        }
        settings
    }
}

fn main() -> anyhow::Result<()> {
    region_annotator::logging::init_tracing()?;
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(&cli.config);

    match cli.command {
        Command::Filter {
            input_dir,
            output_dir,
            params,
            save,
        } => {
            let settings = params.apply_to(config.filter.clone());
            let report = batch::process_directory_with_progress(
                &input_dir,
                &output_dir,
                &settings,
                |p| eprintln!("[{}/{}] {}", p.completed, p.total, p.file_name),
            )
            .context("batch filter failed")?;

            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(path) => println!("ok    {} -> {}", outcome.file_name, path.display()),
                    Err(e) => println!("error {}: {}", outcome.file_name, e),
                }
            }

            if save {
                config.filter = settings;
                config.last_input_dir = Some(input_dir);
                config.last_output_dir = Some(output_dir);
                config.save(&cli.config)?;
            }

            let failed = report.failed().count();
            if failed > 0 {
                bail!("{} of {} files failed", failed, report.outcomes.len());
            }
        }
        Command::Crop {
            image,
            manifest,
            output_dir,
        } => {
            let output_dir = output_dir.unwrap_or(config.crops_dir);
            let report = crop::crop_image_by_manifest(&image, &manifest, &output_dir)?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(path) => println!("saved {} -> {}", outcome.region, path.display()),
                    Err(e) => println!("skipped {}: {}", outcome.region, e),
                }
            }
            println!("manifest: {}", report.manifest_path.display());
        }
        Command::Paste {
            manifest,
            image,
            edited_dir,
            output,
        } => {
            let output = output.unwrap_or_else(|| paste::default_output_path(&image));
            let report = paste::paste_files(&manifest, &image, &edited_dir, &output)?;
            for warning in report.warnings() {
                if let Err(e) = &warning.result {
                    println!("warning {}: {}", warning.region, e);
                }
            }
            println!("saved {}", output.display());
        }
        Command::Pdf { png, name } => {
            let pdf_path = pdf::pdf_path_for_name(&name);
            pdf::png_to_pdf(&png, &pdf_path)?;
            println!("PDF saved as {}", pdf_path.display());
        }
        Command::Preview {
            image,
            manifest,
            output,
        } => {
            let img = region_annotator::open_image(&image)?;
            let manifest = RegionManifest::load(&manifest)?;
            preview::render_manifest(&img, &manifest)
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
        }
    }

    Ok(())
}
