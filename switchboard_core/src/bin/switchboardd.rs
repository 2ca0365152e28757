use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab")]
struct Opts {
    /// Config file location; built-in defaults apply when omitted
    #[structopt(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();

    switchboard_core::run::run_bouncer(opts.config.as_deref())
}
