//! vidbatch - batch video downloader driven by yt-dlp.

use vidbatch::cli::{CliCommand, parse_args, print_usage, run};

#[tokio::main]
async fn main() -> vidbatch::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(CliCommand::Run(args)) if !args.inputs.is_empty() => args,
        Ok(CliCommand::Run(_) | CliCommand::Help) => {
            print_usage();
            std::process::exit(0);
        }
        Err(message) => {
            eprintln!("error: {message}\n");
            print_usage();
            std::process::exit(2);
        }
    };

    if !run(args).await? {
        std::process::exit(1);
    }
    Ok(())
}
