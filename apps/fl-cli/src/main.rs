use clap::{Parser, Subcommand};
use fl_core::Scale;
use fl_factory::interpolate::{self, EncoderSettings, DEFAULT_MODEL_DIR, DEFAULT_QUEUE_CAPACITY};
use std::{path::PathBuf, process};

#[derive(Parser)]
#[command(name = "framelift")]
#[command(version = "0.1")]
#[command(about = "Raise a video's frame rate with learned frame interpolation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interpolate a video and re-mux it with the original audio/subtitles
    Interpolate {
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Defaults to <input>_<N>X_<fps>fps.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding model.json
        #[arg(short, long, default_value = DEFAULT_MODEL_DIR)]
        model: PathBuf,

        /// Half-precision inference on cards with Tensor Cores
        #[arg(long, default_value_t = false)]
        fp16: bool,

        /// 4K source: run the model at half scale
        #[arg(short = 'U', long, default_value_t = false)]
        uhd: bool,

        /// Model scale: 0.25, 0.5, 1.0, 2.0 or 4.0
        #[arg(short, long, default_value = "1.0")]
        scale: Scale,

        /// Frame rate multiplier (2 = double)
        #[arg(short = 'x', long)]
        multi: Option<u32>,

        /// Frames buffered ahead of the encoder
        #[arg(long = "wbs", default_value_t = DEFAULT_QUEUE_CAPACITY)]
        queue_capacity: usize,

        #[arg(long, default_value = "libx265")]
        codec: String,

        #[arg(long, default_value = "medium")]
        preset: String,

        #[arg(long, default_value_t = 23)]
        crf: u8,
    },

    /// Show what the pipeline would do with a video
    Probe {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short = 'x', long, default_value_t = 2)]
        multi: u32,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Interpolate {
            input,
            output,
            model,
            fp16,
            uhd,
            scale,
            multi,
            queue_capacity,
            codec,
            preset,
            crf,
        } => {
            let args = interpolate::InterpolateArgs {
                input,
                output,
                model_dir: model,
                fp16,
                uhd,
                scale,
                multiplier: multi,
                queue_capacity,
                encoder: EncoderSettings {
                    codec,
                    preset,
                    crf,
                    ..EncoderSettings::default()
                },
            };
            if let Err(e) = interpolate::run_cli(args) {
                eprintln!("❌ Interpolation Error: {:#}", e);
                process::exit(1);
            }
        }

        Commands::Probe { input, multi } => {
            if let Err(e) = interpolate::run_probe(&input, multi) {
                eprintln!("❌ Probe Error: {:#}", e);
                process::exit(1);
            }
        }
    }
}
