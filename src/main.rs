mod args;
mod census;

use clap::Parser;
use log::info;
use snafu::ErrorCompat;

fn main() {
    let args = args::Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("args: {:?}", args);

    let overrides = census::RunOverrides {
        input: args.input.clone(),
        out: args.out.clone(),
        clear: args.clear,
    };

    let res = census::run_pipeline(&args.config, &overrides, args.reference.clone());

    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("{}", bt);
        }
        std::process::exit(1);
    }
}
