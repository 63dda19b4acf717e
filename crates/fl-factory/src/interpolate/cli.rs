use super::core::process_interpolation;
use super::types::*;
use super::utils::{find_videos, probe_video, total_output_frames};
use anyhow::{bail, Result};
use dialoguer::{theme::ColorfulTheme, Select};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::{env, path::Path};

const MULTIPLIER_CHOICES: [u32; 4] = [2, 3, 4, 8];

pub fn run_cli(args: InterpolateArgs) -> Result<()> {
    // 1. Select Input
    let input_path = match args.input {
        Some(path) => path,
        None => {
            let cwd = env::current_dir()?;
            let videos = find_videos(&cwd)?;
            if videos.is_empty() {
                bail!("No video files found in {}.", cwd.display());
            }
            let names: Vec<String> = videos
                .iter()
                .map(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect();
            let idx = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select Video")
                .items(&names)
                .default(0)
                .interact()?;
            videos[idx].clone()
        }
    };

    // 2. Select Multiplier
    let multiplier = match args.multiplier {
        Some(m) => m,
        None => {
            let options: Vec<String> = MULTIPLIER_CHOICES.iter().map(|m| format!("{}x", m)).collect();
            let idx = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select Frame Rate Multiplier")
                .items(&options)
                .default(0)
                .interact()?;
            MULTIPLIER_CHOICES[idx]
        }
    };

    let job = InterpolateJob {
        input_path,
        output_path: args.output,
        model_dir: args.model_dir,
        fp16: args.fp16,
        uhd: args.uhd,
        scale: args.scale,
        multiplier,
        queue_capacity: args.queue_capacity,
        encoder: args.encoder,
    };
    job.pipeline_config()?;

    println!(
        "\n--- Interpolating {} ({}x) ---",
        display_name(&job.input_path),
        job.multiplier
    );

    // SETUP CLI PROGRESS BARS
    let style = ProgressStyle::with_template(
        "{prefix:>9} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {eta} {msg}",
    )?
    .progress_chars("#>-");
    let bars = MultiProgress::new();
    let interp_bar = bars.add(ProgressBar::new(0).with_style(style.clone()).with_prefix("interpol"));
    let encode_bar = bars.add(ProgressBar::new(0).with_style(style).with_prefix("encoding"));

    // RUN LOGIC with CLI Callback
    let (ib, eb) = (interp_bar.clone(), encode_bar.clone());
    let output = process_interpolation(job, move |status| match status {
        InterpolateStatus::Starting => ib.set_message("Starting..."),
        InterpolateStatus::Probing => ib.set_message("Probing..."),
        InterpolateStatus::LoadingModel => ib.set_message("Loading model..."),
        InterpolateStatus::Interpolating {
            current_frame,
            total_frames,
        } => {
            ib.set_message("");
            ib.set_length(total_frames);
            ib.set_position(current_frame);
        }
        InterpolateStatus::Encoding {
            current_frame,
            total_frames,
        } => {
            eb.set_length(total_frames);
            eb.set_position(current_frame);
        }
        InterpolateStatus::Finished(_) => {
            ib.finish_with_message("Done!");
            eb.finish_with_message("Done!");
        }
        InterpolateStatus::Error(e) => {
            ib.abandon_with_message(format!("Error: {}", e));
            eb.abandon();
        }
    })?;

    println!("\n--- Saved {} ---", output.display());
    Ok(())
}

/// Prints what the pipeline would see for `input`.
pub fn run_probe(input: &Path, multiplier: u32) -> Result<()> {
    let info = probe_video(input)?;
    println!("File:       {}", input.display());
    println!("Resolution: {}", info.geometry);
    println!("Frame rate: {:.3} fps", info.fps);
    println!("Frames:     {}", info.total_frames);
    println!(
        "At {}x:      {:.3} fps, {} frames",
        multiplier,
        info.fps * multiplier as f64,
        total_output_frames(info.total_frames, multiplier)
    );
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
