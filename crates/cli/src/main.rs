use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use homekit::HapConfig;
use homekit::camera::negotiate::{audio_to_media, video_to_media};
use homekit::camera::{
    SupportedAudioStreamConfig, SupportedVideoStreamConfig,
    TYPE_SUPPORTED_AUDIO_STREAM_CONFIGURATION, TYPE_SUPPORTED_VIDEO_STREAM_CONFIGURATION,
};
use homekit::hap::AccessoryList;

#[derive(Parser)]
#[command(
    name = "homekit-probe",
    about = "Inspect HomeKit camera connection URLs and capability dumps"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a homekit:// URL and print its canonical form
    Url { url: String },
    /// Print the medias advertised by an /accessories JSON dump
    Medias { path: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let result = match args.command {
        Command::Url { url } => show_url(&url),
        Command::Medias { path } => show_medias(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn show_url(raw: &str) -> homekit::Result<()> {
    let config = HapConfig::from_url(raw)?;
    println!("address:   {}", config.device_address);
    println!("device_id: {}", config.device_id);
    println!("client_id: {}", config.client_id);
    println!("canonical: {}", config.url());
    Ok(())
}

fn show_medias(path: &Path) -> homekit::Result<()> {
    let body = std::fs::read(path)?;
    let accessory = AccessoryList::from_json(&body)?.into_first()?;

    let mut medias = Vec::new();
    if let Some(c) = accessory.get_character(TYPE_SUPPORTED_VIDEO_STREAM_CONFIGURATION) {
        let video: SupportedVideoStreamConfig = c.read_tlv8()?;
        medias.push(video_to_media(&video.codecs));
    }
    if let Some(c) = accessory.get_character(TYPE_SUPPORTED_AUDIO_STREAM_CONFIGURATION) {
        let audio: SupportedAudioStreamConfig = c.read_tlv8()?;
        medias.push(audio_to_media(&audio.codecs));
    }
    tracing::debug!(aid = accessory.aid, medias = medias.len(), "capabilities decoded");

    println!("{}", serde_json::to_string_pretty(&medias)?);
    Ok(())
}
