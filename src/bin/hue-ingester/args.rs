use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Queries Hue bridge sensors and stores their readings")]
pub struct Args {
    /// Number of times to iterate, -1 loops forever
    #[arg(
        short,
        long,
        default_value_t = -1,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub iterations: i64,

    /// Seconds to sleep between iterations, -1 uses the shortest configured interval
    #[arg(
        short,
        long,
        default_value_t = -1,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-1..)
    )]
    pub sleep: i64,

    /// Configuration file
    #[arg(short, long, env = "HUESTATS_CONFIG", default_value = "cfg/homestatsconfig.yaml")]
    pub config: PathBuf,
}
