use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path of the YAML config file, `config.yaml` next to the executable by default
    #[arg(short, long, env = "RKIDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address of the lifecycle HTTP endpoint
    #[arg(short, long, env = "RKIDE_LISTEN", default_value = "0.0.0.0:9000")]
    pub listen: String,
}
