use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use frame_sender::{
    client::{save_annotated, summarize, DetectClient, Endpoint},
    frames::FrameSource,
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the detection server to connect to
    #[clap(long, default_value = "127.0.0.1:8000")]
    address: String,

    /// Endpoint receiving the frames
    #[clap(long, value_enum, default_value_t = Endpoint::Upload)]
    endpoint: Endpoint,

    /// Pause between two frames in milliseconds
    #[clap(long, default_value_t = 0)]
    interval_ms: u64,

    /// Start over after the last image, like a webcam feed
    #[clap(long)]
    repeat: bool,

    /// Directory to write the annotated frames to
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// Image files to send
    #[clap(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let client = DetectClient::new(&args.address);
    log::info!(
        "Sending {} images to {}",
        args.images.len(),
        client.url(args.endpoint)
    );

    let mut frames = FrameSource::new(args.images.clone(), args.repeat);
    while let Some(frame) = frames.next_frame() {
        let frame = frame?;

        match client.send(args.endpoint, &frame.name, frame.data).await {
            Ok(response) => {
                log::info!("{}: {}", frame.name, summarize(&response.detections));
                if let Some(dir) = &args.output_dir {
                    save_annotated(&response, dir, &frame.name)?;
                }
            }
            Err(err) => log::error!("{}: {:#}", frame.name, err),
        }

        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    Ok(())
}
