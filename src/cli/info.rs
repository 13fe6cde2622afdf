use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use wiredec::engine::capture::Capture;

pub fn cmd_info(args: &InfoArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing capture: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;

    let pb = multi.map(|multi| {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {bytes} read")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    });

    let samples = input_reader.read_samples(|read| {
        if let Some(ref pb) = pb {
            pb.set_position(read);
        }
    })?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    let capture = Capture::new(samples, args.samplerate);

    if capture.is_empty() {
        println!("Capture is empty.");
        return Ok(());
    }

    display_capture_info(&capture);
    display_channel_activity(&capture);

    Ok(())
}

fn display_capture_info(capture: &Capture) {
    println!();
    println!("Capture Information");
    println!("===================");
    println!();
    println!("  Samples                   {}", capture.len());

    let size_mb = capture.len() as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB");

    if let Some(samplerate) = capture.samplerate() {
        println!("  Samplerate                {samplerate} Hz");

        let duration_secs = capture.len() as f64 / samplerate;
        println!("  Duration                  {}", time_str(duration_secs));
    } else {
        println!("  Samplerate                unknown");
    }
    println!();
}

#[derive(Default)]
struct ChannelStats {
    rising: u64,
    falling: u64,
    high_samples: u64,
    first_edge: Option<u64>,
}

fn display_channel_activity(capture: &Capture) {
    let mut stats: [ChannelStats; 8] = Default::default();

    let mut prev = capture.sample(0);
    for pos in 0..capture.len() {
        let sample = capture.sample(pos);
        let changed = sample ^ prev;

        for (channel, stat) in stats.iter_mut().enumerate() {
            let mask = 1 << channel;
            if sample & mask != 0 {
                stat.high_samples += 1;
            }
            if changed & mask != 0 {
                if sample & mask != 0 {
                    stat.rising += 1;
                } else {
                    stat.falling += 1;
                }
                stat.first_edge.get_or_insert(pos);
            }
        }

        prev = sample;
    }

    println!("Channel Activity");
    for (channel, stat) in stats.iter().enumerate() {
        let edges = stat.rising + stat.falling;
        if edges == 0 {
            let level = if stat.high_samples > 0 { "high" } else { "low" };
            println!("  Channel {channel}                 static {level}");
            continue;
        }

        let duty = 100.0 * stat.high_samples as f64 / capture.len() as f64;
        println!(
            "  Channel {channel}                 {edges} edges ({} rising, {} falling), {duty:.1}% high, first edge at {}",
            stat.rising,
            stat.falling,
            stat.first_edge.unwrap_or(0),
        );
    }
    println!();
}

fn time_str(duration_secs: f64) -> String {
    let total_millis = (duration_secs * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let seconds = (total_millis / 1000) % 60;
    let minutes = (total_millis / 60_000) % 60;
    let hours = total_millis / 3_600_000;

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}
