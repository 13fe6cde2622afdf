use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::decode::cmd_decode;
use cli::info::cmd_info;

mod cli;
mod input;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    let mut logger = build_logger(&cli);

    // With progress bars active the logger must draw through them or
    // the bars get torn apart by interleaved log lines.
    let progress = if cli.progress {
        LogWrapper::new(multi.clone(), logger.build()).try_init()?;
        Some(&multi)
    } else {
        logger.try_init()?;
        None
    };

    match cli.command {
        Commands::Decode(ref args) => cmd_decode(args, &cli, progress),
        Commands::Info(ref args) => cmd_info(args, &cli, progress),
    }
}

fn build_logger(cli: &Cli) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":{},\"lvl\":\"{}\",\"msg\":\"{}\"}}",
                    buf.timestamp(),
                    record.level(),
                    record.args()
                )
            });
        }
    }

    builder
}
